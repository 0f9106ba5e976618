//! # bleedscan - A Concurrent Heartbleed Scanner
//!
//! bleedscan probes TLS services, including those reached through an
//! in-band STARTTLS upgrade, for the TLS heartbeat over-read known as
//! Heartbleed (CVE-2014-0160).
//!
//! ## Features
//!
//! - **Protocols**: direct TLS plus STARTTLS for FTP, IMAP, POP3, and SMTP
//! - **Ranges**: CIDR blocks expand lazily, paced by the command queue
//! - **Bounded concurrency**: a fixed worker pool caps open connections
//! - **Output**: CSV, JSON lines, or plain text, one record per target
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use bleedscan::output::{create_sink, OutputFormat};
//! use bleedscan::scanner::{run_scan, ScanConfig};
//! use bleedscan::tls::RawHeartbeatTls;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let input: &[u8] = b"tls,192.168.1.0/28,443\nsmtp,mail.example.com,25\n";
//!     let sink = create_sink(OutputFormat::Csv, true, std::io::stdout()).unwrap();
//!     let summary = run_scan(&ScanConfig::default(), vec![input], Arc::new(RawHeartbeatTls::new()), sink)
//!         .await
//!         .unwrap();
//!     eprintln!("{} vulnerable", summary.vulnerable);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Target lines, modes, ports, and CIDR expansion
//! - [`scanner`] - Supervisor, worker pool, negotiator, and heartbeat probe
//! - [`tls`] - Minimal TLS client able to send heartbeat requests
//! - [`output`] - Record sinks
//! - [`config`] - Layered settings
//! - [`error`] - Error types

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod scanner;
pub mod tls;
pub mod types;

// Re-export commonly used types
pub use error::{ConfigError, ScanError, TlsError};
pub use scanner::{run_scan, Reason, ScanConfig, ScanSummary, Status, TargetResult};
pub use types::{Mode, Port, ScanId, Target, TargetLine};
