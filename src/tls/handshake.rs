//! ClientHello construction and server flight parsing.
//!
//! The scanner only needs the handshake to get as far as `ServerHelloDone`:
//! at that point a heartbeat-capable server has told us whether it accepts
//! heartbeats, and a vulnerable one will answer a heartbeat request before
//! any keys exist.

use crate::error::{TlsError, TlsResult};
use crate::tls::record::{read_record, ContentType, Record};
use rand::RngCore;
use std::net::IpAddr;
use tokio::io::AsyncRead;

/// Version used in the ClientHello record header.
pub const RECORD_VERSION: u16 = 0x0301;
/// Highest version offered in the ClientHello body.
pub const CLIENT_VERSION: u16 = 0x0303;

const CLIENT_HELLO: u8 = 1;
const SERVER_HELLO: u8 = 2;
const SERVER_HELLO_DONE: u8 = 14;

const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
const EXT_EC_POINT_FORMATS: u16 = 0x000b;
const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;
const EXT_HEARTBEAT: u16 = 0x000f;
const EXT_RENEGOTIATION_INFO: u16 = 0xff01;

/// RFC 6520 HeartbeatMode `peer_allowed_to_send`.
const HEARTBEAT_PEER_ALLOWED: u8 = 1;

/// Suites old OpenSSL builds will pick from.
const CIPHER_SUITES: &[u16] = &[
    0xc02f, 0xc030, 0xc02b, 0xc02c, // ECDHE GCM
    0xc013, 0xc014, 0xc009, 0xc00a, // ECDHE CBC
    0x009c, 0x009d, // RSA GCM
    0x002f, 0x0035, 0x000a, // RSA CBC / 3DES
    0x0033, 0x0039, // DHE CBC
];

const SUPPORTED_GROUPS: &[u16] = &[0x0017, 0x0018, 0x0019];

const SIGNATURE_ALGORITHMS: &[u16] = &[
    0x0401, 0x0501, 0x0601, 0x0201, 0x0403, 0x0503, 0x0603, 0x0203,
];

/// What the server told us before `ServerHelloDone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerFlight {
    /// Version chosen in the ServerHello.
    pub version: u16,
    /// Whether the ServerHello accepted heartbeat requests from us.
    pub heartbeat: bool,
}

/// Build a ClientHello record advertising the heartbeat extension.
///
/// SNI is only sent for DNS names; IP literals are not valid server names.
pub fn client_hello(server_name: &str) -> Vec<u8> {
    let mut random = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random);

    let mut body = Vec::with_capacity(256);
    put_u16(&mut body, CLIENT_VERSION);
    body.extend_from_slice(&random);
    body.push(0); // empty session id

    with_u16_len(&mut body, |b| {
        for suite in CIPHER_SUITES {
            put_u16(b, *suite);
        }
    });

    body.push(1); // one compression method
    body.push(0); // null

    with_u16_len(&mut body, |b| {
        if server_name.parse::<IpAddr>().is_err() && !server_name.is_empty() {
            extension(b, EXT_SERVER_NAME, |b| {
                with_u16_len(b, |b| {
                    b.push(0); // host_name
                    with_u16_len(b, |b| b.extend_from_slice(server_name.as_bytes()));
                });
            });
        }
        extension(b, EXT_SUPPORTED_GROUPS, |b| {
            with_u16_len(b, |b| {
                for group in SUPPORTED_GROUPS {
                    put_u16(b, *group);
                }
            });
        });
        extension(b, EXT_EC_POINT_FORMATS, |b| {
            b.push(1);
            b.push(0); // uncompressed
        });
        extension(b, EXT_SIGNATURE_ALGORITHMS, |b| {
            with_u16_len(b, |b| {
                for alg in SIGNATURE_ALGORITHMS {
                    put_u16(b, *alg);
                }
            });
        });
        extension(b, EXT_HEARTBEAT, |b| b.push(HEARTBEAT_PEER_ALLOWED));
        extension(b, EXT_RENEGOTIATION_INFO, |b| b.push(0));
    });

    let mut handshake = Vec::with_capacity(body.len() + 4);
    handshake.push(CLIENT_HELLO);
    put_u24(&mut handshake, body.len());
    handshake.extend_from_slice(&body);

    Record::new(ContentType::Handshake, RECORD_VERSION, handshake).encode()
}

/// Read handshake records until `ServerHelloDone`.
pub async fn read_server_flight<R>(reader: &mut R) -> TlsResult<ServerFlight>
where
    R: AsyncRead + Unpin,
{
    let mut pending: Vec<u8> = Vec::new();
    let mut flight: Option<ServerFlight> = None;

    loop {
        let record = read_record(reader).await?;
        match record.content_type {
            ContentType::Handshake => pending.extend_from_slice(&record.payload),
            ContentType::Alert => return Err(record.into_alert_error()),
            other => {
                return Err(TlsError::UnexpectedMessage(format!(
                    "{:?} record during handshake",
                    other
                )))
            }
        }

        // Handshake messages may span records or share one.
        while pending.len() >= 4 {
            let len = u24(&pending[1..4]);
            if pending.len() < 4 + len {
                break;
            }
            let msg_type = pending[0];
            let message: Vec<u8> = pending.drain(..4 + len).skip(4).collect();

            match msg_type {
                SERVER_HELLO => flight = Some(parse_server_hello(&message)?),
                SERVER_HELLO_DONE => {
                    return flight.ok_or_else(|| {
                        TlsError::UnexpectedMessage("ServerHelloDone before ServerHello".into())
                    })
                }
                _ => {}
            }
        }
    }
}

/// Extract the chosen version and the heartbeat extension from a ServerHello body.
pub fn parse_server_hello(body: &[u8]) -> TlsResult<ServerFlight> {
    let mut cursor = Cursor::new(body);
    let version = cursor.u16()?;
    cursor.skip(32)?; // random
    let session_id_len = cursor.u8()? as usize;
    cursor.skip(session_id_len)?;
    cursor.skip(2)?; // cipher suite
    cursor.skip(1)?; // compression method

    let mut heartbeat = false;
    if !cursor.is_empty() {
        let ext_len = cursor.u16()? as usize;
        let mut exts = Cursor::new(cursor.take(ext_len)?);
        while !exts.is_empty() {
            let ext_type = exts.u16()?;
            let len = exts.u16()? as usize;
            let data = exts.take(len)?;
            if ext_type == EXT_HEARTBEAT {
                heartbeat = data.first() == Some(&HEARTBEAT_PEER_ALLOWED);
            }
        }
    }

    Ok(ServerFlight { version, heartbeat })
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_u24(buf: &mut Vec<u8>, value: usize) {
    buf.extend_from_slice(&(value as u32).to_be_bytes()[1..]);
}

fn u24(bytes: &[u8]) -> usize {
    (bytes[0] as usize) << 16 | (bytes[1] as usize) << 8 | bytes[2] as usize
}

/// Append a 2-byte length prefix covering whatever `fill` writes.
fn with_u16_len(buf: &mut Vec<u8>, fill: impl FnOnce(&mut Vec<u8>)) {
    let at = buf.len();
    buf.extend_from_slice(&[0, 0]);
    fill(buf);
    let len = (buf.len() - at - 2) as u16;
    buf[at..at + 2].copy_from_slice(&len.to_be_bytes());
}

fn extension(buf: &mut Vec<u8>, ext_type: u16, fill: impl FnOnce(&mut Vec<u8>)) {
    put_u16(buf, ext_type);
    with_u16_len(buf, fill);
}

/// Bounds-checked reader over a handshake message.
struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn take(&mut self, n: usize) -> TlsResult<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(TlsError::MalformedRecord("truncated ServerHello".to_string()));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn skip(&mut self, n: usize) -> TlsResult<()> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> TlsResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> TlsResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}
