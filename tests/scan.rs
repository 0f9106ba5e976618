//! End-to-end scans against loopback mock servers.

use bleedscan::output::{create_sink, OutputFormat};
use bleedscan::scanner::{run_scan, ScanConfig};
use bleedscan::tls::{read_record, ContentType, RawHeartbeatTls, Record};
use bleedscan::{ScanError, ScanSummary};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

const VERSION: u16 = 0x0302;

#[derive(Clone, Copy)]
enum Server {
    /// Answers the heartbeat with 16 KiB it was never sent.
    Bleeding,
    /// Answers with a zero-length echo.
    Patched,
    /// Never offers the heartbeat extension.
    NoHeartbeat,
    /// Completes the handshake, then ignores the heartbeat.
    Mute,
}

#[derive(Clone, Default)]
struct Output(Arc<Mutex<Vec<u8>>>);

impl Output {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn server_hello(heartbeat: bool) -> Vec<u8> {
    let mut body = VERSION.to_be_bytes().to_vec();
    body.extend_from_slice(&[0x42; 32]);
    body.push(0);
    body.extend_from_slice(&[0x00, 0x2f]);
    body.push(0);
    if heartbeat {
        body.extend_from_slice(&[0x00, 0x05, 0x00, 0x0f, 0x00, 0x01, 0x01]);
    }
    let len = body.len() as u32;
    let mut msg = vec![2];
    msg.extend_from_slice(&len.to_be_bytes()[1..]);
    msg.extend_from_slice(&body);
    msg.extend_from_slice(&[14, 0, 0, 0]);
    Record::new(ContentType::Handshake, VERSION, msg).encode()
}

fn heartbeat_response(declared: u16, bytes: usize) -> Vec<u8> {
    let mut payload = vec![2];
    payload.extend_from_slice(&declared.to_be_bytes());
    payload.extend(std::iter::repeat(0xa5).take(bytes));
    Record::new(ContentType::Heartbeat, VERSION, payload).encode()
}

async fn speak_tls<S>(socket: &mut S, server: Server)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let hello = read_record(socket).await.unwrap();
    assert_eq!(hello.content_type, ContentType::Handshake);

    let heartbeat = !matches!(server, Server::NoHeartbeat);
    socket.write_all(&server_hello(heartbeat)).await.unwrap();

    if heartbeat {
        let request = read_record(socket).await.unwrap();
        assert_eq!(request.content_type, ContentType::Heartbeat);
        match server {
            Server::Bleeding => {
                let response = heartbeat_response(0x4000, 0x4000 + 16);
                socket.write_all(&response).await.unwrap();
            }
            Server::Patched => socket.write_all(&heartbeat_response(0, 16)).await.unwrap(),
            _ => {}
        }
    }

    let mut rest = Vec::new();
    let _ = socket.read_to_end(&mut rest).await;
}

async fn tls_server(server: Server) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move { speak_tls(&mut socket, server).await });
        }
    });
    addr
}

async fn smtp_server(server: Server) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut socket = BufReader::new(socket);
        socket.write_all(b"220 mx.test ESMTP\r\n").await.unwrap();
        let mut line = String::new();
        socket.read_line(&mut line).await.unwrap();
        assert_eq!(line, "STARTTLS\r\n");
        socket.write_all(b"220 2.0.0 Ready to start TLS\r\n").await.unwrap();
        speak_tls(&mut socket, server).await;
    });
    addr
}

fn config(timeout: Duration, idle: Option<Duration>) -> ScanConfig {
    ScanConfig {
        workers: 8,
        timeout,
        queue_capacity: 16,
        idle_timeout: idle,
    }
}

async fn scan(input: String, config: ScanConfig) -> (Result<ScanSummary, ScanError>, String) {
    let output = Output::default();
    let sink = create_sink(OutputFormat::Csv, false, output.clone()).unwrap();
    let result = run_scan(
        &config,
        vec![input.as_bytes()],
        Arc::new(RawHeartbeatTls::new()),
        sink,
    )
    .await;
    (result, output.text())
}

#[tokio::test]
async fn test_bleeding_server_is_vulnerable() {
    let addr = tls_server(Server::Bleeding).await;
    let (summary, out) = scan(
        format!("tls,127.0.0.1,{}\n", addr.port()),
        config(Duration::from_secs(1), None),
    )
    .await;

    assert_eq!(summary.unwrap().vulnerable, 1);
    assert_eq!(out, format!("Y,tls,127.0.0.1,{},heartbeat vulnerable\n", addr.port()));
}

#[tokio::test]
async fn test_outcomes_per_server() {
    let cases = [
        (Server::Patched, "N", "heartbeat not vulnerable"),
        (Server::NoHeartbeat, "N", "heartbeat disabled"),
        (Server::Mute, "N", "heartbeat timed out"),
    ];
    for (server, verdict, reason) in cases {
        let addr = tls_server(server).await;
        let (summary, out) = scan(
            format!("https,127.0.0.1,{}\n", addr.port()),
            config(Duration::from_millis(300), None),
        )
        .await;
        assert_eq!(summary.unwrap().completed, 1);
        assert_eq!(out, format!("{verdict},tls,127.0.0.1,{},{reason}\n", addr.port()));
    }
}

#[tokio::test]
async fn test_smtp_starttls_then_bleed() {
    let addr = smtp_server(Server::Bleeding).await;
    let (summary, out) = scan(
        format!("smtp,127.0.0.1,{}\n", addr.port()),
        config(Duration::from_secs(1), None),
    )
    .await;

    assert_eq!(summary.unwrap().vulnerable, 1);
    assert!(out.starts_with("Y,smtp,127.0.0.1,"));
}

#[tokio::test]
async fn test_mixed_batch_records_every_target() {
    let bleeding = tls_server(Server::Bleeding).await;
    let patched = tls_server(Server::Patched).await;
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let mut input = String::from("# batch\n");
    for _ in 0..10 {
        input.push_str(&format!("tls,127.0.0.1,{}\n", bleeding.port()));
        input.push_str(&format!("tls,127.0.0.1,{}\n", patched.port()));
        input.push_str(&format!("tls,127.0.0.1,{}\n", closed.port()));
    }
    input.push_str("gopher,127.0.0.1,70\n");

    let (summary, out) = scan(input, config(Duration::from_millis(500), None)).await;
    let summary = summary.unwrap();
    assert_eq!(summary.enqueued, 30);
    assert_eq!(summary.completed, 30);
    assert_eq!(summary.vulnerable, 10);
    assert_eq!(summary.not_vulnerable, 20);
    assert_eq!(summary.skipped, 1);

    let refused = out
        .lines()
        .filter(|l| l.ends_with("tcp connection failed"))
        .count();
    assert_eq!(refused, 10);
}

#[tokio::test]
async fn test_idle_timeout_aborts_run() {
    // The probe never times out within the idle window, so the run stalls.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let (result, out) = scan(
        format!("tls,127.0.0.1,{}\n", addr.port()),
        config(Duration::from_secs(10), Some(Duration::from_millis(200))),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, ScanError::IdleTimeout { outstanding: 1, .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_unreachable_host_is_not_fatal() {
    let (summary, out) = scan(
        "tls,127.0.0.1,1\n".to_string(),
        config(Duration::from_millis(200), Some(Duration::from_secs(5))),
    )
    .await;
    assert_eq!(summary.unwrap().completed, 1);
    assert!(out.starts_with("N,tls,127.0.0.1,1,"));
}
