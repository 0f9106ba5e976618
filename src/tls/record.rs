//! TLS record layer framing.
//!
//! Record header (5 bytes):
//! - Content type (1 byte)
//! - Protocol version (2 bytes)
//! - Length (2 bytes)
//!
//! Lengths up to 65535 are accepted on read because vulnerable heartbeat
//! implementations happily emit records larger than the 2^14 limit.

use crate::error::{TlsError, TlsResult};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of a record header.
pub const HEADER_LEN: usize = 5;

/// Record content types the scanner cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
    Heartbeat = 24,
}

impl TryFrom<u8> for ContentType {
    type Error = TlsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            20 => Ok(Self::ChangeCipherSpec),
            21 => Ok(Self::Alert),
            22 => Ok(Self::Handshake),
            23 => Ok(Self::ApplicationData),
            24 => Ok(Self::Heartbeat),
            other => Err(TlsError::MalformedRecord(format!(
                "unknown content type {}",
                other
            ))),
        }
    }
}

/// A single plaintext record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub content_type: ContentType,
    pub version: u16,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(content_type: ContentType, version: u16, payload: Vec<u8>) -> Self {
        Self {
            content_type,
            version,
            payload,
        }
    }

    /// Serialize header and payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.content_type as u8);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Turn an alert record into the matching error.
    pub fn into_alert_error(self) -> TlsError {
        match self.payload.as_slice() {
            [level, description, ..] => TlsError::Alert {
                level: *level,
                description: *description,
            },
            _ => TlsError::MalformedRecord("short alert".to_string()),
        }
    }
}

/// Read one record. A clean EOF before the header maps to [`TlsError::Closed`].
pub async fn read_record<R>(reader: &mut R) -> TlsResult<Record>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.map_err(eof_as_closed)?;

    let content_type = ContentType::try_from(header[0])?;
    if header[1] != 3 {
        return Err(TlsError::MalformedRecord(format!(
            "unsupported record version {:#04x}{:02x}",
            header[1], header[2]
        )));
    }
    let version = u16::from_be_bytes([header[1], header[2]]);
    let len = u16::from_be_bytes([header[3], header[4]]) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;

    Ok(Record::new(content_type, version, payload))
}

fn eof_as_closed(e: io::Error) -> TlsError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        TlsError::Closed
    } else {
        TlsError::Io(e)
    }
}
