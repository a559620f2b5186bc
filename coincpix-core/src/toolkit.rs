//! Interface to the detector toolkit.
//!
//! Raw capture parsing, calibration and coincidence building live in an
//! external toolkit. This module only describes what coincpix needs from it.

use std::path::{Path, PathBuf};

use crate::{Beam, CoincidenceEvents, Error, ProcessingSettings, Result, SessionConfig};

/// A TDC (trigger) record from a raw capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TdcRecord {
    /// Trigger timestamp.
    pub timestamp: i64,
    /// Trigger type as reported by the chip.
    pub kind: u8,
}

/// A single pixel hit from a raw capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelHit {
    /// Pixel column.
    pub x: u16,
    /// Pixel row.
    pub y: u16,
    /// Time of arrival.
    pub toa: i64,
    /// Time over threshold.
    pub tot: u16,
}

/// Parsed contents of a raw capture, used for the beam selection preview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCapture {
    /// Trigger records.
    pub tdc: Vec<TdcRecord>,
    /// Pixel hits.
    pub hits: Vec<PixelHit>,
}

impl RawCapture {
    /// Counts the hits falling inside a beam.
    #[must_use]
    pub fn hits_in(&self, beam: &Beam) -> usize {
        self.hits
            .iter()
            .filter(|h| beam.contains(i64::from(h.x), i64::from(h.y)))
            .count()
    }
}

/// Arguments of a coincidence building run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    /// Raw capture to process.
    pub raw_path: PathBuf,
    /// Detector calibration.
    pub calibration_path: PathBuf,
    /// Beams on the signal channel.
    pub signal_beams: Vec<Beam>,
    /// Beams on the idler channel.
    pub idler_beams: Vec<Beam>,
    /// Clustering and coincidence windows.
    pub settings: ProcessingSettings,
}

impl ProcessRequest {
    /// Builds a request from a session configuration.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] when the input file, the calibration file
    /// or the beams of either channel are missing.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let raw_path = config
            .source
            .file
            .clone()
            .ok_or_else(|| Error::ConfigError("no input file selected".into()))?;
        let calibration_path = config
            .source
            .calibration_file
            .clone()
            .ok_or_else(|| Error::ConfigError("no calibration file selected".into()))?;
        if !config.beams.is_complete() {
            return Err(Error::ConfigError(
                "both idler and signal beams must be selected".into(),
            ));
        }
        Ok(Self {
            raw_path,
            calibration_path,
            signal_beams: config.beams.signal.clone(),
            idler_beams: config.beams.idler.clone(),
            settings: config.processing,
        })
    }
}

/// Capabilities consumed from the detector toolkit.
pub trait DetectorToolkit: Send + Sync {
    /// Parses a raw capture into trigger records and pixel hits.
    ///
    /// # Errors
    /// Returns [`Error::Toolkit`] if the file cannot be parsed.
    fn parse_raw_file(&self, path: &Path) -> Result<RawCapture>;

    /// Builds the `(2, 3, N)` coincidence tensor from a raw capture.
    ///
    /// # Errors
    /// Returns [`Error::Toolkit`] on any processing failure.
    fn process_coincidences(&self, request: &ProcessRequest) -> Result<CoincidenceEvents>;

    /// Splits an oversized capture into files of at most `chunk_size_mb`.
    ///
    /// # Errors
    /// Returns [`Error::Toolkit`] if the file cannot be split.
    fn chop_large_file(&self, path: &Path, chunk_size_mb: usize) -> Result<()>;
}
