//! In-band STARTTLS upgrade dialogues.
//!
//! Each plaintext protocol follows the same shape: wait for the server's
//! greeting, send the upgrade request, and check the acknowledgement. All
//! three patterns are literal line prefixes.

use crate::scanner::Reason;
use crate::types::Mode;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout_at, Instant};

/// Longest line read from the server before it is treated as complete.
const MAX_LINE_LEN: u64 = 8192;

/// Upgrade dialogue for one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTls {
    /// Prefix of the line that ends the greeting.
    pub greeting: &'static str,
    /// Upgrade command, CRLF-terminated.
    pub request: &'static str,
    /// Prefix the acknowledgement line must carry.
    pub ack: &'static str,
}

const FTP: StartTls = StartTls {
    greeting: "220 ",
    request: "AUTH TLS\r\n",
    ack: "234 ",
};

const IMAP: StartTls = StartTls {
    greeting: "* ",
    request: "a001 STARTTLS\r\n",
    ack: "a001 OK ",
};

const POP3: StartTls = StartTls {
    greeting: "+OK ",
    request: "STLS\r\n",
    ack: "+OK ",
};

const SMTP: StartTls = StartTls {
    greeting: "220 ",
    request: "STARTTLS\r\n",
    ack: "220 ",
};

impl StartTls {
    /// The dialogue for `mode`, or `None` when TLS starts right away.
    pub const fn for_mode(mode: Mode) -> Option<&'static StartTls> {
        match mode {
            Mode::Tls => None,
            Mode::Ftp => Some(&FTP),
            Mode::Imap => Some(&IMAP),
            Mode::Pop3 => Some(&POP3),
            Mode::Smtp => Some(&SMTP),
        }
    }
}

/// How an upgrade failed.
#[derive(Debug, thiserror::Error)]
pub enum StartTlsError {
    #[error("no greeting: {0}")]
    Greeting(io::Error),
    #[error("request not sent: {0}")]
    Request(io::Error),
    #[error("no acknowledgement: {0}")]
    Response(io::Error),
    #[error("acknowledgement rejected: {0:?}")]
    Rejected(String),
}

impl StartTlsError {
    pub fn reason(&self) -> Reason {
        match self {
            Self::Greeting(_) => Reason::StarttlsGreetingFailed,
            Self::Request(_) => Reason::StarttlsRequestFailed,
            Self::Response(_) | Self::Rejected(_) => Reason::StarttlsResponseFailed,
        }
    }
}

/// Run the upgrade dialogue on `stream`. Every step is bounded by `deadline`.
///
/// There is no limit on how many greeting lines are skipped; only the
/// deadline stops a chatty server.
pub async fn upgrade<S>(
    stream: &mut S,
    starttls: &StartTls,
    deadline: Instant,
) -> Result<(), StartTlsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = BufReader::new(stream);

    loop {
        let line = bounded(deadline, read_line(&mut conn))
            .await
            .map_err(StartTlsError::Greeting)?;
        if line.starts_with(starttls.greeting.as_bytes()) {
            break;
        }
    }

    bounded(deadline, async {
        conn.write_all(starttls.request.as_bytes()).await?;
        conn.flush().await
    })
    .await
    .map_err(StartTlsError::Request)?;

    let line = bounded(deadline, read_line(&mut conn))
        .await
        .map_err(StartTlsError::Response)?;
    if !line.starts_with(starttls.ack.as_bytes()) {
        return Err(StartTlsError::Rejected(
            String::from_utf8_lossy(&line).trim_end().to_string(),
        ));
    }

    Ok(())
}

/// Read one line, failing on EOF.
async fn read_line<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader
        .take(MAX_LINE_LEN)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(line)
}

async fn bounded<T, F>(deadline: Instant, fut: F) -> io::Result<T>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    timeout_at(deadline, fut)
        .await
        .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into()))
}
