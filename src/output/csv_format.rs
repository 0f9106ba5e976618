//! CSV output formatting.

use crate::error::ScanResult;
use crate::output::{OutputRecord, RecordSink};
use crate::scanner::TargetResult;
use std::io::Write;

/// Column names for the optional header row.
pub const HEADER: [&str; 5] = ["verdict", "mode", "host", "port", "reason"];

/// Writes records as CSV rows.
pub struct CsvSink<W: Write> {
    wtr: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W, header: bool) -> ScanResult<Self> {
        let mut wtr = csv::Writer::from_writer(out);
        if header {
            wtr.write_record(HEADER)?;
        }
        Ok(Self { wtr })
    }
}

impl<W: Write + Send> RecordSink for CsvSink<W> {
    fn write_result(&mut self, result: &TargetResult) -> ScanResult<()> {
        let record = OutputRecord::from(result);
        let port = record.port.to_string();
        self.wtr.write_record([
            record.verdict.code(),
            record.mode.as_str(),
            record.host,
            port.as_str(),
            record.reason,
        ])?;
        Ok(())
    }

    fn flush(&mut self) -> ScanResult<()> {
        self.wtr.flush()?;
        Ok(())
    }
}
