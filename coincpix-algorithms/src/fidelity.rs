//! Reference fidelity scoring.
//!
//! A stored occupancy image is prepared into two binary templates:
//!
//! 1. ghost = rotate(zoom(image, scale), angle), negatives clamped to 0
//! 2. both binarised at `thresh * own_max`
//! 3. both cropped to rows `[lower, upper)`
//! 4. both binned by `binning`
//!
//! Fidelity compares the direct template with the idler image and the ghost
//! template with the x-mirrored signal image.

use coincpix_core::{Channel, CoincidenceEvents, Error, ReferenceParams, Result};
use ndarray::{s, Array2, ArrayView2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::correlation::fidelity;
use crate::geometry::{clamp_negative, rotate, zoom};
use crate::histogram::spatial_histogram;
use crate::rebin::bin_image;

/// Direct and ghost fidelity, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fidelities {
    /// Direct template against the idler image.
    pub direct: f64,
    /// Ghost template against the mirrored signal image.
    pub ghost: f64,
}

impl Fidelities {
    /// Both scores as percentages.
    #[must_use]
    pub fn as_percent(&self) -> (f64, f64) {
        (self.direct * 100.0, self.ghost * 100.0)
    }
}

/// Sets pixels above `thresh * max` to 1 and the rest to 0.
#[must_use]
pub fn binarize(image: ArrayView2<'_, f64>, thresh: f64) -> Array2<f64> {
    let max = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let cut = thresh * max;
    image.mapv(|v| if v > cut { 1.0 } else { 0.0 })
}

/// Keeps rows `[lower, upper)`, with `upper` clamped to the image.
///
/// # Errors
/// Returns [`Error::InvalidCrop`] if no row remains.
pub fn crop_rows(image: ArrayView2<'_, f64>, lower: usize, upper: usize) -> Result<Array2<f64>> {
    let rows = image.nrows();
    let end = upper.min(rows);
    if lower >= end {
        return Err(Error::InvalidCrop { lower, upper, rows });
    }
    Ok(image.slice(s![lower..end, ..]).to_owned())
}

/// Prepared direct and ghost templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    direct: Array2<f64>,
    ghost: Array2<f64>,
    params: ReferenceParams,
}

impl ReferenceImage {
    /// Prepares both templates from a stored occupancy image.
    ///
    /// # Errors
    /// Returns an error for invalid parameters or a crop outside the image.
    pub fn prepare(occupancy: ArrayView2<'_, f64>, params: &ReferenceParams) -> Result<Self> {
        params.validate()?;
        if occupancy.is_empty() {
            return Err(Error::EmptyTemplate);
        }
        let bin = i64::try_from(params.binning).map_err(|_| {
            Error::ConfigError(format!(
                "reference binning {} is out of range",
                params.binning
            ))
        })?;

        let mut ghost = rotate(zoom(occupancy, params.scale)?.view(), params.angle);
        clamp_negative(&mut ghost);

        let finish = |image: ArrayView2<'_, f64>| -> Result<Array2<f64>> {
            let binary = binarize(image, params.thresh);
            let cropped = crop_rows(binary.view(), params.lower, params.upper)?;
            bin_image(cropped.view(), bin, bin)
        };
        let direct = finish(occupancy)?;
        let ghost = finish(ghost.view())?;
        log::debug!(
            "reference prepared: direct {:?}, ghost {:?}",
            direct.dim(),
            ghost.dim()
        );
        Ok(Self {
            direct,
            ghost,
            params: params.clone(),
        })
    }

    /// Prepares the templates from the idler image of a reference dataset.
    ///
    /// # Errors
    /// See [`ReferenceImage::prepare`].
    pub fn from_events(events: &CoincidenceEvents, params: &ReferenceParams) -> Result<Self> {
        let occupancy = spatial_histogram(events, Channel::Idler)?.to_f64();
        Self::prepare(occupancy.view(), params)
    }

    /// Direct template.
    #[must_use]
    pub fn direct(&self) -> &Array2<f64> {
        &self.direct
    }

    /// Ghost template.
    #[must_use]
    pub fn ghost(&self) -> &Array2<f64> {
        &self.ghost
    }

    /// Parameters the templates were prepared with.
    #[must_use]
    pub fn params(&self) -> &ReferenceParams {
        &self.params
    }

    /// Scores a coincidence dataset against both templates.
    ///
    /// Failures are logged and scored as 0.
    #[must_use]
    pub fn fidelities(&self, events: &CoincidenceEvents) -> Fidelities {
        let observed = spatial_histogram(events, Channel::Idler).and_then(|direct| {
            spatial_histogram(events, Channel::Signal).map(|ghost| (direct.to_f64(), ghost.to_f64()))
        });
        match observed {
            Ok((direct, ghost)) => calc_fidelities(
                self.direct.view(),
                self.ghost.view(),
                direct.view(),
                ghost.view(),
            ),
            Err(e) => {
                log::warn!("fidelity scoring failed: {e}");
                Fidelities::default()
            }
        }
    }
}

/// Scores both template/image pairs, propagating failures.
///
/// # Errors
/// Returns the first correlation error.
pub fn try_calc_fidelities(
    reference_direct: ArrayView2<'_, f64>,
    reference_ghost: ArrayView2<'_, f64>,
    observed_direct: ArrayView2<'_, f64>,
    observed_ghost: ArrayView2<'_, f64>,
) -> Result<Fidelities> {
    Ok(Fidelities {
        direct: fidelity(reference_direct, observed_direct, false)?,
        ghost: fidelity(reference_ghost, observed_ghost, true)?,
    })
}

/// Scores both template/image pairs. Any failure is logged and both scores
/// are reported as 0.
#[must_use]
pub fn calc_fidelities(
    reference_direct: ArrayView2<'_, f64>,
    reference_ghost: ArrayView2<'_, f64>,
    observed_direct: ArrayView2<'_, f64>,
    observed_ghost: ArrayView2<'_, f64>,
) -> Fidelities {
    try_calc_fidelities(reference_direct, reference_ghost, observed_direct, observed_ghost)
        .unwrap_or_else(|e| {
            log::warn!("fidelity scoring failed: {e}");
            Fidelities::default()
        })
}
