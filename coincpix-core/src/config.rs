//! Versioned session configuration.
//!
//! [`SessionConfig`] replaces the flat key-value recall record of earlier
//! releases with named, typed fields. Version 3 records are upgraded through
//! [`SessionConfig::migrate_legacy`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Beam, BeamSelection, Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Current configuration layout version.
pub const CONFIG_VERSION: u32 = 4;

/// Layout version of the flat recall record.
pub const LEGACY_RECALL_VERSION: u32 = 3;

/// Inclusive window on `t_signal - t_idler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeWindow {
    /// Lowest accepted time difference.
    pub min: i64,
    /// Highest accepted time difference.
    pub max: i64,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            min: -200,
            max: 200,
        }
    }
}

impl TimeWindow {
    /// Creates a window, rejecting `min > max`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimeWindow`] for inverted bounds.
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidTimeWindow { min, max });
        }
        Ok(Self { min, max })
    }

    /// Checks a time difference against both bounds, inclusive.
    #[inline]
    #[must_use]
    pub fn contains(&self, dt: i64) -> bool {
        self.min <= dt && dt <= self.max
    }

    /// `max - min`, `None` when it does not fit in `i64`.
    #[must_use]
    pub fn width(&self) -> Option<i64> {
        self.max.checked_sub(self.min)
    }
}

/// Input files of a session.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SourceFiles {
    /// Last directory browsed.
    pub dir: Option<PathBuf>,
    /// Raw detector capture.
    pub file: Option<PathBuf>,
    /// Detector calibration file.
    pub calibration_file: Option<PathBuf>,
}

/// Coincidence building parameters handed to the detector toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProcessingSettings {
    /// Spatial clustering window (pixels).
    pub space_window: u32,
    /// Temporal clustering window (clock units).
    pub time_window: u32,
    /// Coincidence window (clock units).
    pub coincidence_window: u32,
    /// Maximum cluster extent.
    pub cluster_range: u32,
    /// Number of scans used by the toolkit.
    pub num_scans: u32,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            space_window: 20,
            time_window: 250,
            coincidence_window: 1000,
            cluster_range: 30,
            num_scans: 20,
        }
    }
}

/// Preparation parameters of the reference image.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReferenceParams {
    /// Stored 2D reference array.
    pub file: Option<PathBuf>,
    /// Magnification of the ghost template.
    pub scale: f64,
    /// Rotation of the ghost template in degrees.
    pub angle: f64,
    /// Occupancy threshold as a fraction of each template's maximum.
    pub thresh: f64,
    /// First row kept by the crop.
    pub lower: usize,
    /// One past the last row kept by the crop.
    pub upper: usize,
    /// Bin factor applied to both templates.
    pub binning: usize,
}

impl Default for ReferenceParams {
    fn default() -> Self {
        Self {
            file: None,
            scale: 1.085,
            angle: -3.5,
            thresh: 0.4,
            lower: 25,
            upper: 150,
            binning: 3,
        }
    }
}

impl ReferenceParams {
    /// Checks parameter ranges.
    ///
    /// # Errors
    /// Returns an error for a non-positive or non-finite scale, a threshold
    /// outside (0, 1], an empty crop or a zero bin factor.
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::ConfigError(format!(
                "reference scale must be positive, got {}",
                self.scale
            )));
        }
        if !self.angle.is_finite() {
            return Err(Error::ConfigError("reference angle must be finite".into()));
        }
        if !(self.thresh > 0.0 && self.thresh <= 1.0) {
            return Err(Error::InvalidThreshold(self.thresh));
        }
        if self.lower >= self.upper {
            return Err(Error::ConfigError(format!(
                "reference crop [{}, {}) is empty",
                self.lower, self.upper
            )));
        }
        if self.binning == 0 {
            return Err(Error::InvalidBinSize { axis: 'x', value: 0 });
        }
        Ok(())
    }
}

/// Everything needed to restore a session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Layout version, [`CONFIG_VERSION`] for configs written by this release.
    pub version: u32,
    /// Input files.
    pub source: SourceFiles,
    /// Coincidence building parameters.
    pub processing: ProcessingSettings,
    /// Beam regions per channel.
    pub beams: BeamSelection,
    /// Last confirmed time filter window.
    pub time_filter: TimeWindow,
    /// Reference image preparation.
    pub reference: ReferenceParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            source: SourceFiles::default(),
            processing: ProcessingSettings::default(),
            beams: BeamSelection::default(),
            time_filter: TimeWindow::default(),
            reference: ReferenceParams::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time filter window.
    #[must_use]
    pub fn with_time_filter(mut self, window: TimeWindow) -> Self {
        self.time_filter = window;
        self
    }

    /// Sets the reference parameters.
    #[must_use]
    pub fn with_reference(mut self, reference: ReferenceParams) -> Self {
        self.reference = reference;
        self
    }

    /// Checks version and value ranges.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for an unknown version or invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(Error::ConfigError(format!(
                "unsupported config version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }
        TimeWindow::new(self.time_filter.min, self.time_filter.max)?;
        self.reference.validate()
    }

    /// Upgrades a version 3 recall record.
    ///
    /// Missing keys keep their defaults. Beams that cannot be parsed or that
    /// are unset are skipped.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the version is missing or unsupported,
    /// or if a numeric value cannot be parsed.
    pub fn migrate_legacy(legacy: &LegacyRecall) -> Result<Self> {
        let version: u32 = legacy
            .parse("version")?
            .ok_or_else(|| Error::ConfigError("legacy recall has no version".into()))?;
        if version != LEGACY_RECALL_VERSION {
            return Err(Error::ConfigError(format!(
                "cannot migrate recall version {version}"
            )));
        }

        let defaults = Self::default();
        let p = &defaults.processing;
        let r = &defaults.reference;

        let config = Self {
            version: CONFIG_VERSION,
            source: SourceFiles {
                dir: legacy.path("dir"),
                file: legacy.path("file"),
                calibration_file: legacy.path("calib_file"),
            },
            processing: ProcessingSettings {
                space_window: legacy.parse_or("spaceWindow", p.space_window)?,
                time_window: legacy.parse_or("timeWindow", p.time_window)?,
                coincidence_window: legacy.parse_or("coincWindow", p.coincidence_window)?,
                cluster_range: legacy.parse_or("clusterRange", p.cluster_range)?,
                num_scans: legacy.parse_or("numScans", p.num_scans)?,
            },
            // Version 3 only ever stored the first beam of each channel.
            beams: BeamSelection {
                idler: legacy.beam("beamI").into_iter().collect(),
                signal: legacy.beam("beamS").into_iter().collect(),
            },
            time_filter: TimeWindow::new(
                legacy.parse_or("fmin", defaults.time_filter.min)?,
                legacy.parse_or("fmax", defaults.time_filter.max)?,
            )?,
            reference: ReferenceParams {
                file: legacy.path("ref_file"),
                scale: legacy.parse_or("ref_scale", r.scale)?,
                angle: legacy.parse_or("ref_angle", r.angle)?,
                thresh: legacy.parse_or("ref_thresh", r.thresh)?,
                lower: legacy.parse_or("ref_lower", r.lower)?,
                upper: legacy.parse_or("ref_upper", r.upper)?,
                binning: legacy.parse_or("ref_binning", r.binning)?,
            },
        };

        Ok(config)
    }
}

/// The flat, string-valued recall record of layout version 3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyRecall {
    entries: BTreeMap<String, String>,
}

impl LegacyRecall {
    /// Builds a record from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).map(str::trim) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                Error::ConfigError(format!("invalid value '{raw}' for recall key '{key}'"))
            }),
        }
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.parse(key)?.unwrap_or_else(|| {
            log::warn!("recall key '{key}' missing, using default");
            default
        }))
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn beam(&self, key: &str) -> Option<Beam> {
        let raw = self.get(key)?;
        match raw.parse::<Beam>() {
            Ok(beam) if !beam.is_unset() => Some(beam),
            Ok(_) => None,
            Err(e) => {
                log::warn!("skipping recall beam '{key}': {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn legacy_defaults() -> Vec<(&'static str, &'static str)> {
        vec![
            ("version", "3"),
            ("dir", ""),
            ("file", "/data/run7.tpx3"),
            ("calib_file", ""),
            ("spaceWindow", "20"),
            ("timeWindow", "250"),
            ("coincWindow", "1000"),
            ("clusterRange", "30"),
            ("numScans", "20"),
            ("beamI", "0,0,0,0"),
            ("beamS", "(140, 60, 200, 120)"),
            ("fmin", "-150"),
            ("fmax", "175"),
            ("ref_file", "ref.npy"),
            ("ref_scale", "1.085"),
            ("ref_angle", "-3.5"),
            ("ref_thresh", "0.4"),
            ("ref_lower", "25"),
            ("ref_upper", "150"),
            ("ref_binning", "3"),
        ]
    }

    #[test]
    fn test_time_window() {
        let w = TimeWindow::new(-100, 100).unwrap();
        assert!(w.contains(-100));
        assert!(w.contains(100));
        assert!(!w.contains(101));
        assert_eq!(w.width(), Some(200));
        assert_eq!(TimeWindow::new(i64::MIN, i64::MAX).unwrap().width(), None);
        assert!(TimeWindow::new(5, 4).is_err());
        assert!(TimeWindow::new(4, 4).is_ok());
    }

    #[test]
    fn test_defaults_validate() {
        let config = SessionConfig::new();
        assert_eq!(config.version, CONFIG_VERSION);
        config.validate().unwrap();
        assert_eq!(config.time_filter, TimeWindow { min: -200, max: 200 });
        assert_eq!(config.reference.binning, 3);
    }

    #[test]
    fn test_validate_rejects_bad_reference() {
        let mut config = SessionConfig::new();
        config.reference.lower = 150;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::new();
        config.reference.thresh = 0.0;
        assert!(matches!(config.validate(), Err(Error::InvalidThreshold(_))));

        let mut config = SessionConfig::new();
        config.version = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_migrate_legacy() {
        let legacy = LegacyRecall::from_pairs(legacy_defaults());
        let config = SessionConfig::migrate_legacy(&legacy).unwrap();

        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.source.file, Some(PathBuf::from("/data/run7.tpx3")));
        assert_eq!(config.source.dir, None);
        assert_eq!(config.processing.coincidence_window, 1000);
        assert!(config.beams.idler.is_empty());
        assert_eq!(config.beams.signal, vec![Beam::new(140, 60, 200, 120)]);
        assert_eq!(config.time_filter, TimeWindow { min: -150, max: 175 });
        assert_relative_eq!(config.reference.scale, 1.085);
        assert_eq!(config.reference.file, Some(PathBuf::from("ref.npy")));
        config.validate().unwrap();
    }

    #[test]
    fn test_migrate_missing_keys_use_defaults() {
        let legacy = LegacyRecall::from_pairs([("version", "3"), ("fmin", "-10")]);
        let config = SessionConfig::migrate_legacy(&legacy).unwrap();
        assert_eq!(config.time_filter, TimeWindow { min: -10, max: 200 });
        assert_eq!(config.processing, ProcessingSettings::default());
    }

    #[test]
    fn test_migrate_rejects_bad_input() {
        let wrong_version = LegacyRecall::from_pairs([("version", "2")]);
        assert!(SessionConfig::migrate_legacy(&wrong_version).is_err());

        let no_version = LegacyRecall::from_pairs([("fmin", "1")]);
        assert!(SessionConfig::migrate_legacy(&no_version).is_err());

        let bad_number = LegacyRecall::from_pairs([("version", "3"), ("numScans", "many")]);
        assert!(matches!(
            SessionConfig::migrate_legacy(&bad_number),
            Err(Error::ConfigError(_))
        ));

        let inverted = LegacyRecall::from_pairs([("version", "3"), ("fmin", "5"), ("fmax", "1")]);
        assert!(SessionConfig::migrate_legacy(&inverted).is_err());
    }
}
