//! Scan data model and the TLS heartbeat capability seam.
//!
//! The engine never speaks TLS itself. It drives an implementation of
//! [`HeartbeatTls`], which makes the negotiator testable against mock
//! capabilities and keeps the record-layer code in [`crate::tls`].

use crate::error::TlsResult;
use crate::types::Target;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Outcome class of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The server leaked memory in a heartbeat response.
    Vulnerable,
    /// No leak observed, or no probe was possible.
    NotVulnerable,
    /// The probe itself could not be delivered.
    Error,
}

impl Status {
    /// Single-letter code used in CSV records.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Vulnerable => "Y",
            Self::NotVulnerable => "N",
            Self::Error => "E",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vulnerable => write!(f, "vulnerable"),
            Self::NotVulnerable => write!(f, "not vulnerable"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where a negotiation ended. Each reason maps to exactly one [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    TcpConnectionFailed,
    StarttlsGreetingFailed,
    StarttlsRequestFailed,
    StarttlsResponseFailed,
    TlsHandshakeFailed,
    HeartbeatDisabled,
    ErrorInjectingPayload,
    HeartbeatVulnerable,
    HeartbeatNotVulnerable,
    HeartbeatTimedOut,
}

impl Reason {
    /// Human-readable reason written to the sink.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TcpConnectionFailed => "tcp connection failed",
            Self::StarttlsGreetingFailed => "starttls greeting failed",
            Self::StarttlsRequestFailed => "starttls request failed",
            Self::StarttlsResponseFailed => "starttls response failed",
            Self::TlsHandshakeFailed => "tls handshake failed",
            Self::HeartbeatDisabled => "heartbeat disabled",
            Self::ErrorInjectingPayload => "error injecting payload",
            Self::HeartbeatVulnerable => "heartbeat vulnerable",
            Self::HeartbeatNotVulnerable => "heartbeat not vulnerable",
            Self::HeartbeatTimedOut => "heartbeat timed out",
        }
    }

    pub const fn status(self) -> Status {
        match self {
            Self::HeartbeatVulnerable => Status::Vulnerable,
            Self::ErrorInjectingPayload => Status::Error,
            _ => Status::NotVulnerable,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the reason that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Verdict {
    pub status: Status,
    pub reason: Reason,
}

impl From<Reason> for Verdict {
    fn from(reason: Reason) -> Self {
        Self {
            status: reason.status(),
            reason,
        }
    }
}

/// One unit of work: probe `target`, bounding each step by `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub target: Target,
    pub timeout: Duration,
}

impl Command {
    pub fn new(target: Target, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Deadline applied to the whole conversation once the socket is up.
    pub fn connection_deadline(&self) -> Duration {
        self.timeout * 2
    }
}

/// The verdict for one command, labelled with its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResult {
    pub target: Target,
    pub verdict: Verdict,
}

impl TargetResult {
    pub fn new(target: Target, reason: Reason) -> Self {
        Self {
            target,
            verdict: Verdict::from(reason),
        }
    }
}

/// A heartbeat response that carried bytes the client never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReply {
    /// Payload length declared by the server.
    pub declared_len: usize,
    /// Bytes actually received after the heartbeat header.
    pub received_len: usize,
}

/// Establishes TLS sessions able to send heartbeat probes.
#[async_trait]
pub trait HeartbeatTls: Send + Sync + 'static {
    type Session: HeartbeatSession;

    /// Run the client handshake over an already connected (and possibly
    /// STARTTLS-upgraded) stream. Certificates are not verified;
    /// `server_name` is only used for SNI.
    async fn handshake(
        &self,
        stream: TcpStream,
        server_name: &str,
        deadline: Instant,
    ) -> TlsResult<Self::Session>;
}

/// A handshaken session.
#[async_trait]
pub trait HeartbeatSession: Send + Sized + 'static {
    /// Send the heartbeat probe. Returns
    /// [`TlsError::HeartbeatUnsupported`](crate::error::TlsError::HeartbeatUnsupported)
    /// when the peer never negotiated the extension.
    async fn write_heartbeat(&mut self) -> TlsResult<()>;

    /// Block until a heartbeat response arrives or the connection fails.
    ///
    /// There is no way to cancel this from the outside; callers that need a
    /// bound must race it (see [`crate::scanner::probe`]).
    async fn read_heartbeat(self) -> TlsResult<HeartbeatReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_status_mapping() {
        assert_eq!(Reason::HeartbeatVulnerable.status(), Status::Vulnerable);
        assert_eq!(Reason::ErrorInjectingPayload.status(), Status::Error);
        for reason in [
            Reason::TcpConnectionFailed,
            Reason::StarttlsGreetingFailed,
            Reason::StarttlsRequestFailed,
            Reason::StarttlsResponseFailed,
            Reason::TlsHandshakeFailed,
            Reason::HeartbeatDisabled,
            Reason::HeartbeatNotVulnerable,
            Reason::HeartbeatTimedOut,
        ] {
            assert_eq!(reason.status(), Status::NotVulnerable, "{reason}");
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Vulnerable.code(), "Y");
        assert_eq!(Status::NotVulnerable.code(), "N");
        assert_eq!(Status::Error.code(), "E");
    }

    #[test]
    fn test_connection_deadline_is_double_timeout() {
        let target = Target::new(
            crate::types::Mode::Tls,
            "127.0.0.1",
            crate::types::Port::new(443).unwrap(),
        );
        let command = Command::new(target, Duration::from_millis(750));
        assert_eq!(command.connection_deadline(), Duration::from_millis(1500));
    }
}
