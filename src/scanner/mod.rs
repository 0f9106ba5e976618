//! Scanner module - coordinates the heartbeat scan.
//!
//! [`run_scan`] is the supervisor. It enumerates input lines into commands,
//! feeds them through a bounded queue to a fixed pool of workers, and waits
//! for the collector to record one result per enqueued command. Closing the
//! queue after the last command is the end-of-stream signal: workers drain
//! what is left and exit, which in turn closes the result channel.

pub mod collector;
pub mod negotiator;
pub mod pool;
pub mod probe;
pub mod starttls;
mod traits;

pub use traits::{
    Command, HeartbeatReply, HeartbeatSession, HeartbeatTls, Reason, Status, TargetResult,
    Verdict,
};

use crate::error::{ScanError, ScanResult};
use crate::output::BoxedSink;
use crate::types::{ScanId, TargetError, TargetLine};
use collector::{ResultCollector, Tally};
use pool::{command_queue, InFlight, QueueSender, WorkerPool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 512;

/// Default per-step timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Input lines longer than this are skipped.
const MAX_LINE_LEN: u64 = 8192;

/// Default collector idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine parameters for one run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Number of workers, which bounds concurrent connections.
    pub workers: usize,
    /// Per-step timeout handed to every command.
    pub timeout: Duration,
    /// Capacity of the command queue.
    pub queue_capacity: usize,
    /// Abort when no result arrives for this long with work outstanding.
    pub idle_timeout: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            queue_capacity: DEFAULT_WORKERS * 2,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub id: ScanId,
    pub enqueued: usize,
    pub completed: usize,
    pub vulnerable: usize,
    pub not_vulnerable: usize,
    pub errors: usize,
    pub skipped: usize,
    pub elapsed_ms: u64,
}

impl ScanSummary {
    fn new(id: ScanId, enumerated: Enumerated, tally: Tally, elapsed: Duration) -> Self {
        Self {
            id,
            enqueued: enumerated.enqueued,
            completed: tally.completed,
            vulnerable: tally.vulnerable,
            not_vulnerable: tally.not_vulnerable,
            errors: tally.errors,
            skipped: enumerated.skipped,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Counts kept by the enumerator.
#[derive(Debug, Clone, Copy, Default)]
struct Enumerated {
    enqueued: usize,
    skipped: usize,
}

/// Scan every target named by `inputs`, writing one record per target to
/// `sink`.
///
/// Inputs are read in order. Per-target failures end up in the sink; only
/// unreadable input, sink failures, and the idle timeout fail the run.
pub async fn run_scan<T, R>(
    config: &ScanConfig,
    inputs: Vec<R>,
    tls: Arc<T>,
    sink: BoxedSink,
) -> ScanResult<ScanSummary>
where
    T: HeartbeatTls,
    R: AsyncBufRead + Unpin + Send,
{
    let id = ScanId::new();
    let span = info_span!("scan", id = %id.short());
    supervise(id, config, inputs, tls, sink).instrument(span).await
}

async fn supervise<T, R>(
    id: ScanId,
    config: &ScanConfig,
    inputs: Vec<R>,
    tls: Arc<T>,
    sink: BoxedSink,
) -> ScanResult<ScanSummary>
where
    T: HeartbeatTls,
    R: AsyncBufRead + Unpin + Send,
{
    let started = Instant::now();
    let capacity = config.queue_capacity.max(1);

    let (queue, commands) = command_queue(capacity);
    let (results_tx, results_rx) = mpsc::channel(capacity);
    let in_flight = InFlight::default();

    let pool = WorkerPool::spawn(config.workers, commands, tls, results_tx);
    info!(workers = pool.workers(), capacity, timeout = ?config.timeout, "scan started");

    let mut collector = tokio::spawn(
        ResultCollector::new(results_rx, sink, in_flight.clone(), config.idle_timeout)
            .run()
            .in_current_span(),
    );

    let enumerated = tokio::select! {
        enumerated = enumerate(inputs, &queue, &in_flight, config.timeout) => match enumerated {
            Ok(enumerated) => enumerated,
            Err(e) => {
                pool.abort();
                collector.abort();
                return Err(e);
            }
        },
        // The collector only finishes early when the run has failed.
        finished = &mut collector => {
            pool.abort();
            return Err(match finished {
                Ok(Err(e)) => e,
                Err(e) => e.into(),
                Ok(Ok((tally, _))) => ScanError::ResultCountMismatch {
                    enqueued: tally.completed + in_flight.outstanding(),
                    collected: tally.completed,
                },
            });
        }
    };

    queue.close();
    info!(
        enqueued = enumerated.enqueued,
        skipped = enumerated.skipped,
        "enumeration finished"
    );

    let (tally, _sink) = match collector.await {
        Ok(Ok(collected)) => collected,
        Ok(Err(e)) => {
            pool.abort();
            return Err(e);
        }
        Err(e) => {
            pool.abort();
            return Err(e.into());
        }
    };
    pool.join().await;

    if tally.completed != enumerated.enqueued {
        return Err(ScanError::ResultCountMismatch {
            enqueued: enumerated.enqueued,
            collected: tally.completed,
        });
    }

    let summary = ScanSummary::new(id, enumerated, tally, started.elapsed());
    info!(
        enqueued = summary.enqueued,
        completed = summary.completed,
        vulnerable = summary.vulnerable,
        not_vulnerable = summary.not_vulnerable,
        errors = summary.errors,
        skipped = summary.skipped,
        elapsed_ms = summary.elapsed_ms,
        "scan complete"
    );
    Ok(summary)
}

/// Turn input lines into commands, in order, until the inputs run dry.
async fn enumerate<R>(
    inputs: Vec<R>,
    queue: &QueueSender,
    in_flight: &InFlight,
    timeout: Duration,
) -> ScanResult<Enumerated>
where
    R: AsyncBufRead + Unpin,
{
    let mut counts = Enumerated::default();
    let mut buf = Vec::new();

    for mut input in inputs {
        loop {
            buf.clear();
            let n = (&mut input).take(MAX_LINE_LEN).read_until(b'\n', &mut buf).await?;
            if n == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') && n as u64 == MAX_LINE_LEN {
                skip_rest_of_line(&mut input, &mut buf).await?;
                info!(len = n, reason = %TargetError::DoesNotParse, "skipping over-long line");
                counts.skipped += 1;
                continue;
            }
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parsed = match TargetLine::parse(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    info!(line, reason = %e, "skipping");
                    counts.skipped += 1;
                    continue;
                }
            };
            if parsed.is_range() {
                info!(
                    range = %parsed.address,
                    hosts = u64::try_from(parsed.address.host_count()).unwrap_or(u64::MAX),
                    "expanding range"
                );
            }

            for target in parsed.targets() {
                info!(endpoint = %target, "scanning");
                in_flight.start();
                if queue.enqueue(Command::new(target, timeout)).await.is_err() {
                    in_flight.finish();
                    warn!("worker pool stopped, abandoning enumeration");
                    return Ok(counts);
                }
                counts.enqueued += 1;
            }
        }
    }

    Ok(counts)
}

/// Consume input up to and including the next newline, in bounded chunks.
async fn skip_rest_of_line<R>(input: &mut R, buf: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        buf.clear();
        let n = (&mut *input).take(MAX_LINE_LEN).read_until(b'\n', buf).await?;
        if n == 0 || buf.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}
