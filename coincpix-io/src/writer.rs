//! CSV export of coincidence records.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use coincpix_core::CoincidenceEvents;

use crate::{Error, Result};

/// Column names of the export.
pub const EVENT_CSV_HEADER: [&str; 7] = ["xi", "yi", "ti", "xs", "ys", "ts", "dt"];

/// Writes one CSV row per coincidence: idler hit, signal hit, `ts - ti`.
///
/// The header is written before the first batch.
pub struct EventCsvWriter<W: Write = File> {
    writer: csv::Writer<W>,
    header_written: bool,
    rows: usize,
}

impl EventCsvWriter<File> {
    /// Creates a writer for a new file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(csv::Writer::from_path(path)?))
    }
}

impl<W: Write> EventCsvWriter<W> {
    fn new(writer: csv::Writer<W>) -> Self {
        Self {
            writer,
            header_written: false,
            rows: 0,
        }
    }

    /// Wraps any byte sink.
    pub fn from_writer(writer: W) -> Self {
        Self::new(csv::Writer::from_writer(writer))
    }

    /// Appends every record of `events`; returns the number written.
    ///
    /// # Errors
    /// Returns an error if a row cannot be written.
    pub fn write_events(&mut self, events: &CoincidenceEvents) -> Result<usize> {
        if !self.header_written {
            self.writer.write_record(EVENT_CSV_HEADER)?;
            self.header_written = true;
        }
        for rec in events.records() {
            let (i, s) = (rec.idler, rec.signal);
            let row = [i.x, i.y, i.t, s.x, s.y, s.t, rec.dt()];
            self.writer.write_record(row.iter().map(i64::to_string))?;
        }
        self.rows += events.len();
        Ok(events.len())
    }

    /// Rows written so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes buffered rows.
    ///
    /// # Errors
    /// Returns an error if the sink fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the sink.
    ///
    /// # Errors
    /// Returns an error if the final flush fails.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}
