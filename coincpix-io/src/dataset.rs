//! Coincidence tensors and images stored as `.npy` files.

use std::path::Path;

use coincpix_core::CoincidenceEvents;
use ndarray::{Array2, ArrayView2, Ix2, Ix3};

use crate::npy::{write_npy, NpyFile};
use crate::{Error, Result};

pub(crate) fn events_from(file: &NpyFile) -> Result<CoincidenceEvents> {
    let array = file
        .to_i64()?
        .into_dimensionality::<Ix3>()
        .map_err(|_| coincpix_core::Error::InvalidShape {
            expected: "(2, 3, N)",
            got: file.shape().to_vec(),
        })?;
    Ok(CoincidenceEvents::new(array.as_standard_layout().into_owned())?)
}

pub(crate) fn image_from(file: &NpyFile) -> Result<Array2<f64>> {
    file.to_f64()?
        .into_dimensionality::<Ix2>()
        .map_err(|_| {
            Error::InvalidFormat(format!(
                "{}: expected a 2D image, got shape {:?}",
                file.path().display(),
                file.shape()
            ))
        })
}

/// Reads a `(2, 3, N)` coincidence tensor.
///
/// Float files are accepted when every value is integral.
///
/// # Errors
/// Returns an error for a missing or malformed file, a shape other than
/// `(2, 3, N)` or non-integral values.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<CoincidenceEvents> {
    let file = NpyFile::open(&path)?;
    let events = events_from(&file)?;
    log::info!(
        "read {} coincidences from {}",
        events.len(),
        path.as_ref().display()
    );
    Ok(events)
}

/// Reads a 2D image as `f64`.
///
/// # Errors
/// Returns an error for a missing or malformed file or a non-2D array.
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let file = NpyFile::open(&path)?;
    image_from(&file)
}

/// Writes a coincidence tensor as `<i8`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_events<P: AsRef<Path>>(path: P, events: &CoincidenceEvents) -> Result<()> {
    write_npy(&path, events.as_array())?;
    log::debug!(
        "wrote {} coincidences to {}",
        events.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Writes an image as `<f8`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_image<P: AsRef<Path>>(path: P, image: ArrayView2<'_, f64>) -> Result<()> {
    write_npy(path, &image)
}
