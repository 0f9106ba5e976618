//! Error types for bleedscan.
//!
//! Uses `thiserror` for ergonomic error definitions. Per-target failures
//! never surface here: they are folded into a result record by the
//! negotiator. Only run-level failures become a `ScanError`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the TLS heartbeat capability.
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("connection deadline exceeded")]
    Timeout,

    #[error("connection closed by peer")]
    Closed,

    #[error("received alert: level {level}, description {description}")]
    Alert { level: u8, description: u8 },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("server did not negotiate the heartbeat extension")]
    HeartbeatUnsupported,

    #[error("heartbeat response echoed only the bytes sent")]
    HeartbeatEchoed,

    #[error("heartbeat response truncated: declared {declared} bytes, got {actual}")]
    HeartbeatTruncated { declared: usize, actual: usize },
}

/// Result type alias for capability operations.
pub type TlsResult<T> = Result<T, TlsError>;

/// Run-level errors: anything that stops the whole scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("no result produced for {idle:?} with {outstanding} command(s) outstanding")]
    IdleTimeout { outstanding: usize, idle: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("output error: {0}")]
    Output(#[from] csv::Error),

    #[error("scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("enqueued {enqueued} command(s) but collected {collected} result(s)")]
    ResultCountMismatch { enqueued: usize, collected: usize },
}

impl ScanError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::IdleTimeout { .. } => 2,
            _ => 1,
        }
    }
}

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid settings file format: {0}")]
    InvalidFormat(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
