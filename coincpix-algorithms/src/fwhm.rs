//! Full-width-half-maximum estimators.

use std::fmt;
use std::str::FromStr;

use coincpix_core::{Error, Result};
use ndarray::{ArrayView1, ArrayView2, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Half-maximum thresholds at or below this count are treated as background.
pub const BACKGROUND_FLOOR: f64 = 5.0;

/// Direction of the per-slice half-maximum test in [`fwhm_avg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Orientation {
    /// One width per column.
    #[default]
    X,
    /// One width per row.
    Y,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::X => f.write_str("x"),
            Orientation::Y => f.write_str("y"),
        }
    }
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "x" | "X" => Ok(Orientation::X),
            "y" | "Y" => Ok(Orientation::Y),
            other => Err(Error::Computation(format!("unknown orientation '{other}'"))),
        }
    }
}

/// Width statistics returned by [`fwhm_avg`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FwhmSummary {
    /// Narrowest surviving width.
    pub min: usize,
    /// Widest surviving width.
    pub max: usize,
    /// Mean of the surviving widths.
    pub mean: f64,
}

/// Peak position and widths of a 2D spatial histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BeamQuality {
    /// `(row, col)` of the maximum bin.
    pub peak: (usize, usize),
    /// Width of the row through the peak.
    pub fwhm_x: usize,
    /// Width of the column through the peak.
    pub fwhm_y: usize,
}

/// Span from the first to the last index with `v >= threshold`.
fn width_above<'a, I>(values: I, threshold: f64) -> Option<usize>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut first = None;
    let mut last = 0;
    for (i, &v) in values.into_iter().enumerate() {
        if v >= threshold {
            if first.is_none() {
                first = Some(i);
            }
            last = i;
        }
    }
    first.map(|f| last + 1 - f)
}

fn max_of<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    values.into_iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))
}

/// Width of a single peak: `last + 1 - first` over the samples at or above
/// half of the maximum.
///
/// Assumes one contiguous peak. Gaps between the first and last qualifying
/// sample are counted.
///
/// # Errors
/// Returns [`Error::EmptyDataset`] for an empty view and
/// [`Error::Computation`] if no sample reaches half maximum (all NaN).
pub fn fwhm_single(view: ArrayView1<'_, f64>) -> Result<usize> {
    if view.is_empty() {
        return Err(Error::EmptyDataset("fwhm"));
    }
    let halfmax = max_of(&view) / 2.0;
    width_above(&view, halfmax)
        .ok_or_else(|| Error::Computation("no sample reaches half maximum".into()))
}

/// Drops widths whose distance from the mean is `2 sigma` or more.
///
/// Population statistics, one pass. A list without spread is returned as is.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reject_outliers(widths: &[usize]) -> Vec<usize> {
    if widths.is_empty() {
        return Vec::new();
    }
    let n = widths.len() as f64;
    let mean = widths.iter().map(|&w| w as f64).sum::<f64>() / n;
    let var = widths
        .iter()
        .map(|&w| (w as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let sigma = var.sqrt();
    if sigma <= 0.0 {
        return widths.to_vec();
    }
    widths
        .iter()
        .copied()
        .filter(|&w| (w as f64 - mean).abs() < 2.0 * sigma)
        .collect()
}

/// Per-slice widths of a 2D count window.
///
/// Each column (`X`) or row (`Y`) gets the half of its own maximum as
/// threshold. Slices whose threshold does not exceed [`BACKGROUND_FLOOR`]
/// are excluded, as are slices with no sample at or above threshold.
#[must_use]
pub fn slice_widths(view: ArrayView2<'_, f64>, orientation: Orientation) -> Vec<usize> {
    let axis = match orientation {
        Orientation::X => Axis(1),
        Orientation::Y => Axis(0),
    };
    view.axis_iter(axis)
        .filter_map(|slice| {
            let halfmax = max_of(&slice) / 2.0;
            if halfmax <= BACKGROUND_FLOOR {
                return None;
            }
            width_above(&slice, halfmax)
        })
        .collect()
}

/// Averaged FWHM over the slices of a trace window, with outlier rejection.
///
/// # Errors
/// Returns [`Error::Computation`] when no width survives background
/// exclusion and outlier rejection.
#[allow(clippy::cast_precision_loss)]
pub fn fwhm_avg(view: ArrayView2<'_, f64>, orientation: Orientation) -> Result<FwhmSummary> {
    let widths = slice_widths(view, orientation);
    let kept = reject_outliers(&widths);
    let (Some(&min), Some(&max)) = (kept.iter().min(), kept.iter().max()) else {
        return Err(Error::Computation(format!(
            "no {orientation} slice above background in {:?} window",
            view.dim()
        )));
    };
    let mean = kept.iter().sum::<usize>() as f64 / kept.len() as f64;
    log::debug!(
        "fwhm_avg ({orientation}): {} slices, {} kept, mean {mean:.2}",
        widths.len(),
        kept.len()
    );
    Ok(FwhmSummary { min, max, mean })
}

/// Peak location and single-peak widths through it.
///
/// Ties for the maximum resolve to the first bin in row-major order.
///
/// # Errors
/// Returns [`Error::EmptyDataset`] for an empty view.
pub fn beam_quality(view: ArrayView2<'_, f64>) -> Result<BeamQuality> {
    let mut peak = None;
    for ((r, c), &v) in view.indexed_iter() {
        match peak {
            Some((_, best)) if v <= best => {}
            _ => peak = Some(((r, c), v)),
        }
    }
    let Some(((row, col), _)) = peak else {
        return Err(Error::EmptyDataset("beam quality"));
    };
    Ok(BeamQuality {
        peak: (row, col),
        fwhm_x: fwhm_single(view.row(row))?,
        fwhm_y: fwhm_single(view.column(col))?,
    })
}
