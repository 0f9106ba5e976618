//! Plain text output formatting.
//!
//! One aligned, coloured line per target. Colours are dropped
//! automatically when the terminal does not support them.

use crate::error::ScanResult;
use crate::output::{OutputRecord, RecordSink};
use crate::scanner::{Status, TargetResult};
use console::{style, Style};
use std::io::{BufWriter, Write};

/// Writes human-readable result lines.
pub struct PlainSink<W: Write> {
    out: BufWriter<W>,
}

impl<W: Write> PlainSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }
}

impl<W: Write + Send> RecordSink for PlainSink<W> {
    fn write_result(&mut self, result: &TargetResult) -> ScanResult<()> {
        let record = OutputRecord::from(result);
        let verdict_style = match record.verdict {
            Status::Vulnerable => Style::new().red().bold(),
            Status::NotVulnerable => Style::new().green(),
            Status::Error => Style::new().yellow(),
        };

        writeln!(
            self.out,
            "{:<16} {:<5} {:<40} {}",
            verdict_style.apply_to(record.verdict.to_string()),
            record.mode,
            result.target.authority(),
            style(record.reason).dim()
        )?;
        Ok(())
    }

    fn flush(&mut self) -> ScanResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}
