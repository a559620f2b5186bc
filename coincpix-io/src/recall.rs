//! Session configuration persistence.
//!
//! Current configurations are JSON. Version 3 recall files are a two-line
//! CSV (header row, value row) and are migrated on load.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use coincpix_core::{LegacyRecall, SessionConfig};

use crate::{Error, Result};

/// Default file name of a saved configuration.
pub const DEFAULT_CONFIG_FILE: &str = "coincpix.json";

/// File name of the version 3 recall record.
pub const LEGACY_RECALL_FILE: &str = "recall.t3w";

/// Writes a configuration as pretty-printed JSON.
///
/// # Errors
/// Returns an error if the configuration does not validate or the file
/// cannot be written.
pub fn save_config<P: AsRef<Path>>(path: P, config: &SessionConfig) -> Result<()> {
    config.validate()?;
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, config)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    log::debug!("saved config to {}", path.as_ref().display());
    Ok(())
}

/// Parses a version 3 recall record from CSV.
///
/// # Errors
/// Returns an error for malformed CSV or a missing value row.
pub fn parse_legacy_recall<R: Read>(reader: R) -> Result<LegacyRecall> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = csv.headers()?.clone();
    let values = csv
        .records()
        .next()
        .ok_or_else(|| Error::InvalidFormat("recall file has no value row".into()))??;
    Ok(LegacyRecall::from_pairs(headers.iter().zip(values.iter())))
}

/// Reads a version 3 recall file.
///
/// # Errors
/// See [`parse_legacy_recall`].
pub fn read_legacy_recall<P: AsRef<Path>>(path: P) -> Result<LegacyRecall> {
    parse_legacy_recall(File::open(path)?)
}

/// Loads a configuration, migrating a version 3 recall file if needed.
///
/// # Errors
/// Returns an error for unreadable or invalid files, unsupported versions
/// and values that fail validation.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SessionConfig> {
    let text = std::fs::read_to_string(&path)?;
    if text.trim_start().starts_with('{') {
        let config: SessionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        return Ok(config);
    }
    let legacy = parse_legacy_recall(text.as_bytes())?;
    let config = SessionConfig::migrate_legacy(&legacy)?;
    config.validate()?;
    log::warn!(
        "migrated recall file {} to config version {}",
        path.as_ref().display(),
        config.version
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coincpix_core::{Beam, TimeWindow, CONFIG_VERSION};
    use std::path::PathBuf;
    use tempfile::tempdir;

    const RECALL: &str = "\
version,dir,file,calib_file,spaceWindow,timeWindow,coincWindow,clusterRange,numScans,beamI,beamS,fmin,fmax,ref_file,ref_scale,ref_angle,ref_thresh,ref_lower,ref_upper,ref_binning
3,/data,/data/run1.tpx3,/data/calib.txt,25,300,1200,30,10,\"10,20,110,120\",\"150,20,250,120\",-150,175,,1.1,-2.0,0.35,20,140,2
";

    #[test]
    fn test_legacy_recall_migrates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEGACY_RECALL_FILE);
        std::fs::write(&path, RECALL).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.source.file, Some(PathBuf::from("/data/run1.tpx3")));
        assert_eq!(config.processing.space_window, 25);
        assert_eq!(config.processing.num_scans, 10);
        assert_eq!(config.beams.idler, vec![Beam::new(10, 20, 110, 120)]);
        assert_eq!(config.beams.signal, vec![Beam::new(150, 20, 250, 120)]);
        assert_eq!(config.time_filter, TimeWindow { min: -150, max: 175 });
        assert_eq!(config.reference.file, None);
        assert_eq!(config.reference.binning, 2);
        assert_eq!(config.reference.upper, 140);
    }

    #[test]
    fn test_legacy_recall_with_blank_line() {
        let text = RECALL.replacen('\n', "\n\n", 1);
        let legacy = parse_legacy_recall(text.as_bytes()).unwrap();
        assert_eq!(legacy.get("fmin"), Some("-150"));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut config = SessionConfig::new().with_time_filter(TimeWindow { min: -40, max: 60 });
        config.beams.idler.push(Beam::new(1, 2, 3, 4));
        config.reference.angle = 12.5;
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_unknown_versions() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old.t3w");
        std::fs::write(&old, RECALL.replacen("\n3,", "\n2,", 1)).unwrap();
        assert!(matches!(load_config(&old), Err(Error::CoreError(_))));

        let future = dir.path().join("future.json");
        std::fs::write(&future, "{\"version\": 9}").unwrap();
        assert!(matches!(load_config(&future), Err(Error::CoreError(_))));

        let empty = dir.path().join("empty.t3w");
        std::fs::write(&empty, "version,fmin\n").unwrap();
        assert!(matches!(load_config(&empty), Err(Error::InvalidFormat(_))));
    }
}
