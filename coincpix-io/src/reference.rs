//! Reference image loading.

use std::path::Path;

use coincpix_algorithms::ReferenceImage;
use coincpix_core::{ReferenceParams, SessionConfig};

use crate::dataset::{events_from, image_from};
use crate::npy::NpyFile;
use crate::{Error, Result};

/// Loads and prepares a reference from a stored array.
///
/// A 2D array is used as the occupancy image directly. A `(2, 3, N)`
/// coincidence tensor is histogrammed over its idler hits first.
///
/// # Errors
/// Returns an error for unreadable files, other shapes or invalid
/// parameters.
pub fn load_reference<P: AsRef<Path>>(path: P, params: &ReferenceParams) -> Result<ReferenceImage> {
    let file = NpyFile::open(&path)?;
    let reference = match file.shape() {
        [_, _] => ReferenceImage::prepare(image_from(&file)?.view(), params)?,
        [2, 3, _] => ReferenceImage::from_events(&events_from(&file)?, params)?,
        other => {
            return Err(Error::InvalidFormat(format!(
                "{}: reference must be (H, W) or (2, 3, N), got {other:?}",
                path.as_ref().display()
            )))
        }
    };
    log::info!(
        "prepared reference {} (direct {:?}, ghost {:?})",
        path.as_ref().display(),
        reference.direct().dim(),
        reference.ghost().dim()
    );
    Ok(reference)
}

/// Loads the reference named by a session configuration, if any.
///
/// # Errors
/// See [`load_reference`].
pub fn load_session_reference(config: &SessionConfig) -> Result<Option<ReferenceImage>> {
    config
        .reference
        .file
        .as_ref()
        .map(|file| load_reference(file, &config.reference))
        .transpose()
}
