//! JSON lines output formatting.

use crate::error::ScanResult;
use crate::output::{OutputRecord, RecordSink};
use crate::scanner::TargetResult;
use std::io::{self, BufWriter, Write};

/// Writes one JSON object per line.
pub struct JsonSink<W: Write> {
    out: BufWriter<W>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }
}

impl<W: Write + Send> RecordSink for JsonSink<W> {
    fn write_result(&mut self, result: &TargetResult) -> ScanResult<()> {
        serde_json::to_writer(&mut self.out, &OutputRecord::from(result)).map_err(io::Error::from)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> ScanResult<()> {
        self.out.flush()?;
        Ok(())
    }
}
