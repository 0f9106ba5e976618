//! Per-target negotiation.
//!
//! Drives one connection through
//! `Dialing -> [Greeting -> SendStartTLS -> AwaitStartTLSAck] -> Handshaking
//! -> ProbeSent -> AwaitProbeResult` and stops at the first failed step.
//! Nothing is retried; every path ends in exactly one [`TargetResult`].

use crate::error::TlsError;
use crate::scanner::probe::{await_heartbeat, ProbeOutcome};
use crate::scanner::starttls::{upgrade, StartTls};
use crate::scanner::{Command, HeartbeatSession, HeartbeatTls, Reason, TargetResult};
use std::fmt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

/// Negotiation stages, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dialing,
    StartTls,
    Handshaking,
    ProbeSent,
    AwaitProbeResult,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dialing => write!(f, "dialing"),
            Self::StartTls => write!(f, "starttls"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::ProbeSent => write!(f, "probe sent"),
            Self::AwaitProbeResult => write!(f, "awaiting probe result"),
        }
    }
}

/// Run the full negotiation for `command` and report its verdict.
pub async fn negotiate<T>(tls: &T, command: &Command) -> TargetResult
where
    T: HeartbeatTls,
{
    let reason = drive(tls, command).await;
    trace!(endpoint = %command.target, %reason, "negotiation finished");
    TargetResult::new(command.target.clone(), reason)
}

async fn drive<T>(tls: &T, command: &Command) -> Reason
where
    T: HeartbeatTls,
{
    let target = &command.target;

    trace!(endpoint = %target, stage = %Stage::Dialing, "entering stage");
    let mut stream = match timeout(command.timeout, TcpStream::connect(target.authority())).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return failed(command, Stage::Dialing, Reason::TcpConnectionFailed, &e),
        Err(e) => return failed(command, Stage::Dialing, Reason::TcpConnectionFailed, &e),
    };
    let deadline = Instant::now() + command.connection_deadline();

    if let Some(starttls) = StartTls::for_mode(target.mode) {
        trace!(endpoint = %target, stage = %Stage::StartTls, "entering stage");
        if let Err(e) = upgrade(&mut stream, starttls, deadline).await {
            return failed(command, Stage::StartTls, e.reason(), &e);
        }
    }

    trace!(endpoint = %target, stage = %Stage::Handshaking, "entering stage");
    let mut session = match tls.handshake(stream, &target.host, deadline).await {
        Ok(session) => session,
        Err(e) => return failed(command, Stage::Handshaking, Reason::TlsHandshakeFailed, &e),
    };

    trace!(endpoint = %target, stage = %Stage::ProbeSent, "entering stage");
    match session.write_heartbeat().await {
        Ok(()) => {}
        Err(TlsError::HeartbeatUnsupported) => return Reason::HeartbeatDisabled,
        Err(e) => return failed(command, Stage::ProbeSent, Reason::ErrorInjectingPayload, &e),
    }

    trace!(endpoint = %target, stage = %Stage::AwaitProbeResult, "entering stage");
    let outcome = await_heartbeat(session, command.timeout).await;
    match &outcome {
        ProbeOutcome::Replied(reply) => debug!(
            endpoint = %target,
            declared = reply.declared_len,
            received = reply.received_len,
            "heartbeat leaked memory"
        ),
        ProbeOutcome::Rejected(e) => debug!(endpoint = %target, error = %e, "heartbeat rejected"),
        ProbeOutcome::TimedOut => debug!(endpoint = %target, "heartbeat timed out"),
    }
    outcome.reason()
}

fn failed(command: &Command, stage: Stage, reason: Reason, error: &dyn fmt::Display) -> Reason {
    debug!(endpoint = %command.target, %stage, %reason, error = %error, "negotiation failed");
    reason
}
