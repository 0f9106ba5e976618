//! Raw TLS heartbeat client.
//!
//! Mainstream TLS stacks refuse to send heartbeat requests, so this module
//! speaks just enough of the record and handshake protocol to get a server to
//! `ServerHelloDone` and then inject a heartbeat in the clear. No keys are
//! ever derived and no certificate is looked at.

mod handshake;
mod heartbeat;
mod record;

pub use handshake::{client_hello, parse_server_hello, read_server_flight, ServerFlight};
pub use heartbeat::{
    classify_response, heartbeat_request, read_heartbeat_response, CLAIMED_PAYLOAD_LEN,
};
pub use record::{read_record, ContentType, Record};

use crate::error::{TlsError, TlsResult};
use crate::scanner::{HeartbeatReply, HeartbeatSession, HeartbeatTls};
use async_trait::async_trait;
use std::future::Future;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

/// The built-in heartbeat capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawHeartbeatTls;

impl RawHeartbeatTls {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HeartbeatTls for RawHeartbeatTls {
    type Session = RawSession;

    async fn handshake(
        &self,
        mut stream: TcpStream,
        server_name: &str,
        deadline: Instant,
    ) -> TlsResult<RawSession> {
        let hello = client_hello(server_name);
        within(deadline, async { stream.write_all(&hello).await.map_err(TlsError::from) }).await?;

        let flight = within(deadline, read_server_flight(&mut stream)).await?;
        trace!(
            server_name,
            version = flight.version,
            heartbeat = flight.heartbeat,
            "server hello done"
        );

        Ok(RawSession {
            stream,
            flight,
            deadline,
        })
    }
}

/// A connection that has reached `ServerHelloDone`.
#[derive(Debug)]
pub struct RawSession {
    stream: TcpStream,
    flight: ServerFlight,
    deadline: Instant,
}

impl RawSession {
    /// Whether the server accepted heartbeats from us.
    pub fn heartbeat_negotiated(&self) -> bool {
        self.flight.heartbeat
    }
}

#[async_trait]
impl HeartbeatSession for RawSession {
    async fn write_heartbeat(&mut self) -> TlsResult<()> {
        if !self.flight.heartbeat {
            return Err(TlsError::HeartbeatUnsupported);
        }
        let request = heartbeat_request(self.flight.version);
        let stream = &mut self.stream;
        within(self.deadline, async {
            stream.write_all(&request).await?;
            stream.flush().await.map_err(TlsError::from)
        })
        .await
    }

    async fn read_heartbeat(mut self) -> TlsResult<HeartbeatReply> {
        // The connection deadline still applies, so a read abandoned by the
        // prober ends on its own and drops the socket here.
        within(self.deadline, read_heartbeat_response(&mut self.stream)).await
    }
}

async fn within<T, F>(deadline: Instant, fut: F) -> TlsResult<T>
where
    F: Future<Output = TlsResult<T>>,
{
    timeout_at(deadline, fut)
        .await
        .unwrap_or(Err(TlsError::Timeout))
}
