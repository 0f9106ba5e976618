//! Command-line interface definitions for bleedscan.
//!
//! Uses `clap` derive macros for declarative argument parsing. Every tunable
//! can also come from a `BLEEDSCAN_*` environment variable.

use crate::config::SettingsOverrides;
use crate::output::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// Scan TLS and STARTTLS services for the Heartbleed vulnerability.
#[derive(Parser, Debug)]
#[command(name = "bleedscan")]
#[command(version)]
#[command(
    about = "Concurrent Heartbleed scanner for TLS and STARTTLS services",
    long_about = "Reads target lines of the form <mode>,<address>,<port> and writes one \
                  record per target. Modes: tls (or https), ftp, imap, pop3, smtp. The \
                  address may be a hostname, an IP address, or a CIDR block."
)]
pub struct Args {
    /// Files with one target line each; stdin when none are given
    #[arg(value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long, env = "BLEEDSCAN_WORKERS")]
    pub workers: Option<usize>,

    /// Per-step timeout in milliseconds
    #[arg(short, long = "timeout", value_name = "MS", env = "BLEEDSCAN_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Command queue capacity as a multiple of the worker count
    #[arg(long, env = "BLEEDSCAN_QUEUE_FACTOR")]
    pub queue_factor: Option<usize>,

    /// Abort when no result arrives for this many seconds (0 disables)
    #[arg(long = "idle-timeout", value_name = "SECS", env = "BLEEDSCAN_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Output format for results
    #[arg(short, long, value_enum, env = "BLEEDSCAN_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write a header row before CSV records
    #[arg(long, env = "BLEEDSCAN_HEADER")]
    pub header: bool,

    /// Log skipped lines, range expansions, and scan progress to stderr
    #[arg(short, long, env = "BLEEDSCAN_VERBOSE")]
    pub verbose: bool,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH", env = "BLEEDSCAN_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// The command-line layer of the settings.
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            workers: self.workers,
            timeout_ms: self.timeout_ms,
            queue_factor: self.queue_factor,
            idle_timeout_secs: self.idle_timeout_secs,
            verbose: self.verbose,
            format: self.format,
            header: self.header,
        }
    }
}
