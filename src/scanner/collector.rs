//! Result collection.
//!
//! The collector is the only writer of the output sink. It records results
//! in arrival order and enforces the run's idle timeout: if no result turns
//! up for the whole window while commands are still outstanding, the run
//! is considered stalled and aborts.

use crate::error::{ScanError, ScanResult};
use crate::output::BoxedSink;
use crate::scanner::pool::InFlight;
use crate::scanner::{Status, TargetResult};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, trace};

/// Per-status counts of recorded results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub completed: usize,
    pub vulnerable: usize,
    pub not_vulnerable: usize,
    pub errors: usize,
}

impl Tally {
    fn record(&mut self, result: &TargetResult) {
        self.completed += 1;
        match result.verdict.status {
            Status::Vulnerable => self.vulnerable += 1,
            Status::NotVulnerable => self.not_vulnerable += 1,
            Status::Error => self.errors += 1,
        }
    }
}

/// Drains worker results into the sink.
pub struct ResultCollector {
    results: mpsc::Receiver<TargetResult>,
    sink: BoxedSink,
    in_flight: InFlight,
    idle_timeout: Option<Duration>,
}

impl ResultCollector {
    pub fn new(
        results: mpsc::Receiver<TargetResult>,
        sink: BoxedSink,
        in_flight: InFlight,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            results,
            sink,
            in_flight,
            idle_timeout,
        }
    }

    /// Record results until every worker has hung up.
    ///
    /// Returns the tally and the flushed sink.
    pub async fn run(mut self) -> ScanResult<(Tally, BoxedSink)> {
        let mut tally = Tally::default();

        loop {
            let next = match self.idle_timeout {
                Some(idle) => match timeout(idle, self.results.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let outstanding = self.in_flight.outstanding();
                        if outstanding > 0 {
                            error!(outstanding, ?idle, "no result within idle timeout");
                            self.sink.flush()?;
                            return Err(ScanError::IdleTimeout { outstanding, idle });
                        }
                        // Nothing enqueued yet, the enumerator is waiting on input.
                        continue;
                    }
                },
                None => self.results.recv().await,
            };

            let Some(result) = next else { break };

            self.sink.write_result(&result)?;
            tally.record(&result);
            self.in_flight.finish();
            trace!(endpoint = %result.target, verdict = %result.verdict.status, "recorded");

            if self.results.is_empty() {
                self.sink.flush()?;
            }
        }

        self.sink.flush()?;
        Ok((tally, self.sink))
    }
}
