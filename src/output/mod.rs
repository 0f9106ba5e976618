//! Output sinks.
//!
//! Every result becomes one record `{verdict, mode, host, port, reason}`.
//! Sinks are written by the collector alone, one whole record at a time.

mod csv_format;
mod json_format;
mod plain;

pub use csv_format::CsvSink;
pub use json_format::JsonSink;
pub use plain::{print_error, PlainSink};

use crate::error::ScanResult;
use crate::scanner::{Status, TargetResult};
use crate::types::{Mode, Port};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CSV records, verdict as Y/N/E
    #[default]
    Csv,
    /// One JSON object per line
    Json,
    /// Human-readable coloured lines
    Plain,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

/// The fixed record shape shared by every format.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord<'a> {
    pub verdict: Status,
    pub mode: Mode,
    pub host: &'a str,
    pub port: Port,
    pub reason: &'static str,
}

impl<'a> From<&'a TargetResult> for OutputRecord<'a> {
    fn from(result: &'a TargetResult) -> Self {
        Self {
            verdict: result.verdict.status,
            mode: result.target.mode,
            host: &result.target.host,
            port: result.target.port,
            reason: result.verdict.reason.as_str(),
        }
    }
}

/// Ordered record writer.
pub trait RecordSink: Send {
    /// Write one complete record.
    fn write_result(&mut self, result: &TargetResult) -> ScanResult<()>;

    /// Push buffered records to the underlying writer.
    fn flush(&mut self) -> ScanResult<()>;
}

/// A boxed sink for dynamic dispatch.
pub type BoxedSink = Box<dyn RecordSink>;

/// Build a sink for `format` on top of `out`.
pub fn create_sink<W>(format: OutputFormat, header: bool, out: W) -> ScanResult<BoxedSink>
where
    W: Write + Send + 'static,
{
    Ok(match format {
        OutputFormat::Csv => Box::new(CsvSink::new(out, header)?),
        OutputFormat::Json => Box::new(JsonSink::new(out)),
        OutputFormat::Plain => Box::new(PlainSink::new(out)),
    })
}
