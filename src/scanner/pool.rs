//! Command queue, in-flight accounting, and the worker pool.
//!
//! The queue is a bounded tokio channel whose receiving half is shared by
//! every worker behind a mutex. A full queue parks the enumerator, so a /8
//! is expanded no faster than workers consume it.

use crate::scanner::negotiator::negotiate;
use crate::scanner::{Command, HeartbeatTls, TargetResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

/// Create a command queue holding at most `capacity` pending commands.
pub fn command_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half. Dropping it closes the queue; workers drain what is left.
#[derive(Debug)]
pub struct QueueSender {
    tx: mpsc::Sender<Command>,
}

impl QueueSender {
    /// Enqueue a command, waiting while the queue is full.
    ///
    /// Fails only if every worker has gone away.
    pub async fn enqueue(&self, command: Command) -> Result<(), Command> {
        self.tx.send(command).await.map_err(|e| e.0)
    }

    /// Close the queue. Workers drain what is left, then see end-of-stream.
    pub fn close(self) {
        drop(self.tx);
    }
}

/// Consumer half, shared between workers.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Command>>>,
}

impl QueueReceiver {
    /// Next command, or `None` once the queue is closed and empty.
    pub async fn next(&self) -> Option<Command> {
        self.rx.lock().await.recv().await
    }
}

/// Count of commands enqueued but not yet recorded.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    /// Call before enqueueing.
    pub fn start(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Call once the command's result has been recorded, or the command was
    /// never enqueued after all.
    pub fn finish(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn outstanding(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fixed set of workers pulling from one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers. Each result goes to `results`; the pool
    /// holds no other sender, so `results` closes when the last worker exits.
    pub fn spawn<T>(
        workers: usize,
        queue: QueueReceiver,
        tls: Arc<T>,
        results: mpsc::Sender<TargetResult>,
    ) -> Self
    where
        T: HeartbeatTls,
    {
        let handles = (0..workers.max(1))
            .map(|id| {
                let queue = queue.clone();
                let tls = Arc::clone(&tls);
                let results = results.clone();
                tokio::spawn(
                    async move {
                        let mut handled = 0usize;
                        while let Some(command) = queue.next().await {
                            let result = negotiate(tls.as_ref(), &command).await;
                            handled += 1;
                            if results.send(result).await.is_err() {
                                debug!("collector gone, stopping");
                                break;
                            }
                        }
                        debug!(handled, "worker done");
                    }
                    .instrument(tracing::debug_span!("worker", id)),
                )
            })
            .collect();

        Self { handles }
    }

    /// Number of workers spawned.
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                debug!(error = %e, "worker task failed");
            }
        }
    }

    /// Stop all workers without waiting for in-flight negotiations.
    pub fn abort(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}
