//! Timeout-bounded heartbeat reads.
//!
//! `HeartbeatSession::read_heartbeat` cannot be cancelled, so the read runs
//! on its own task and reports back over a oneshot channel. When the timer
//! wins, the task is left running. It still owns the session and the socket,
//! and ends when the session's connection deadline fires; nobody closes the
//! socket underneath it.

use crate::error::TlsError;
use crate::scanner::{HeartbeatReply, HeartbeatSession, Reason};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::trace;

/// What happened to a heartbeat read.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The server answered with bytes it was never sent.
    Replied(HeartbeatReply),
    /// The read failed or the answer was not a leak.
    Rejected(TlsError),
    /// Nothing came back within the wait.
    TimedOut,
}

impl ProbeOutcome {
    pub fn reason(&self) -> Reason {
        match self {
            Self::Replied(_) => Reason::HeartbeatVulnerable,
            Self::Rejected(_) => Reason::HeartbeatNotVulnerable,
            Self::TimedOut => Reason::HeartbeatTimedOut,
        }
    }
}

/// Wait up to `wait` for the heartbeat response on `session`.
pub async fn await_heartbeat<S>(session: S, wait: Duration) -> ProbeOutcome
where
    S: HeartbeatSession,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = session.read_heartbeat().await;
        if tx.send(result).is_err() {
            trace!("heartbeat read finished after the prober gave up");
        }
    });

    match timeout(wait, rx).await {
        Ok(Ok(Ok(reply))) => ProbeOutcome::Replied(reply),
        Ok(Ok(Err(e))) => ProbeOutcome::Rejected(e),
        // the read task died without reporting
        Ok(Err(_)) => ProbeOutcome::Rejected(TlsError::Closed),
        Err(_) => ProbeOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TlsResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    enum Script {
        Reply,
        Fail,
        Hang,
        Slow(Duration),
    }

    struct ScriptedSession {
        script: Script,
        finished: Arc<AtomicBool>,
    }

    impl ScriptedSession {
        fn new(script: Script) -> Self {
            Self {
                script,
                finished: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl HeartbeatSession for ScriptedSession {
        async fn write_heartbeat(&mut self) -> TlsResult<()> {
            Ok(())
        }

        async fn read_heartbeat(self) -> TlsResult<HeartbeatReply> {
            let result = match self.script {
                Script::Reply => Ok(HeartbeatReply {
                    declared_len: 0x4000,
                    received_len: 0x4010,
                }),
                Script::Fail => Err(TlsError::HeartbeatEchoed),
                Script::Hang => std::future::pending().await,
                Script::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(TlsError::Closed)
                }
            };
            self.finished.store(true, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test]
    async fn test_reply_is_vulnerable() {
        let outcome = await_heartbeat(ScriptedSession::new(Script::Reply), Duration::from_secs(1)).await;
        assert!(matches!(outcome, ProbeOutcome::Replied(_)));
        assert_eq!(outcome.reason(), Reason::HeartbeatVulnerable);
    }

    #[tokio::test]
    async fn test_error_is_not_vulnerable() {
        let outcome = await_heartbeat(ScriptedSession::new(Script::Fail), Duration::from_secs(1)).await;
        assert!(matches!(outcome, ProbeOutcome::Rejected(TlsError::HeartbeatEchoed)));
        assert_eq!(outcome.reason(), Reason::HeartbeatNotVulnerable);
    }

    #[tokio::test]
    async fn test_hanging_read_times_out_on_schedule() {
        let wait = Duration::from_millis(500);
        let start = Instant::now();
        let outcome = await_heartbeat(ScriptedSession::new(Script::Hang), wait).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome.reason(), Reason::HeartbeatTimedOut);
        assert!(elapsed >= wait, "returned early: {:?}", elapsed);
        assert!(elapsed < wait + Duration::from_millis(250), "returned late: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_abandoned_read_keeps_running() {
        let session = ScriptedSession::new(Script::Slow(Duration::from_millis(150)));
        let finished = Arc::clone(&session.finished);

        let outcome = await_heartbeat(session, Duration::from_millis(20)).await;
        assert!(matches!(outcome, ProbeOutcome::TimedOut));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
