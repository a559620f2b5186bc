//! Spatial-correlation filter.
//!
//! Correlated photon pairs concentrate along a ridge in the (idler, signal)
//! coordinate histograms of both axes. For each axis the filter builds the
//! correlation histogram (rows = signal, columns = idler) and marks a bin hot
//! when its count exceeds `threshold` times
//!
//! * the maximum of its column (signal-direction test), and
//! * the maximum of its row (idler-direction test).
//!
//! A record survives only if its bin is hot in all four tests: signal and
//! idler direction on the X histogram, signal and idler direction on the Y
//! histogram.

use coincpix_core::{Channel, CoincidenceEvents, Error, Result, SpatialAxis};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

use crate::histogram::{correlation_histogram, Histogram2D};

/// Hot-bin masks of one correlation histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotBins {
    /// Bins above `threshold` times their column maximum.
    pub signal: Array2<bool>,
    /// Bins above `threshold` times their row maximum.
    pub idler: Array2<bool>,
}

impl HotBins {
    /// Evaluates both directional tests on a histogram.
    #[must_use]
    pub fn from_histogram(hist: &Histogram2D, threshold: f64) -> Self {
        let counts = hist.to_f64();
        let col_max: Array1<f64> = counts.fold_axis(Axis(0), 0.0, |&a, &b| a.max(b));
        let row_max: Array1<f64> = counts.fold_axis(Axis(1), 0.0, |&a, &b| a.max(b));
        let dim = counts.dim();
        Self {
            signal: Array2::from_shape_fn(dim, |(r, c)| counts[[r, c]] > threshold * col_max[c]),
            idler: Array2::from_shape_fn(dim, |(r, c)| counts[[r, c]] > threshold * row_max[r]),
        }
    }

    /// True when both tests pass at a bin.
    #[inline]
    #[must_use]
    pub fn is_hot(&self, bin: (usize, usize)) -> bool {
        self.signal[bin] && self.idler[bin]
    }
}

/// Histograms and masks behind a spatial filter run.
#[derive(Debug, Clone)]
pub struct SpaceFilterDiagnostics {
    /// X correlation histogram of the input.
    pub x_correlation: Histogram2D,
    /// Y correlation histogram of the input.
    pub y_correlation: Histogram2D,
    /// Hot bins of the X histogram.
    pub x_hot: HotBins,
    /// Hot bins of the Y histogram.
    pub y_hot: HotBins,
    /// Number of input records.
    pub records_in: usize,
    /// Number of surviving records.
    pub records_out: usize,
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidThreshold(threshold))
    }
}

fn evaluate(
    events: &CoincidenceEvents,
    threshold: f64,
) -> Result<(Vec<bool>, SpaceFilterDiagnostics)> {
    validate_threshold(threshold)?;

    let x_correlation = correlation_histogram(events, SpatialAxis::X)?;
    let y_correlation = correlation_histogram(events, SpatialAxis::Y)?;
    let x_hot = HotBins::from_histogram(&x_correlation, threshold);
    let y_hot = HotBins::from_histogram(&y_correlation, threshold);

    let x = SpatialAxis::X.field();
    let y = SpatialAxis::Y.field();
    let xi = events.field(Channel::Idler, x);
    let xs = events.field(Channel::Signal, x);
    let yi = events.field(Channel::Idler, y);
    let ys = events.field(Channel::Signal, y);

    let mask: Vec<bool> = (0..events.len())
        .into_par_iter()
        .map(|i| {
            let x_ok = x_correlation
                .bin_of(xs[i], xi[i])
                .is_some_and(|bin| x_hot.is_hot(bin));
            let y_ok = y_correlation
                .bin_of(ys[i], yi[i])
                .is_some_and(|bin| y_hot.is_hot(bin));
            x_ok && y_ok
        })
        .collect();

    let records_out = mask.iter().filter(|&&k| k).count();
    let diagnostics = SpaceFilterDiagnostics {
        x_correlation,
        y_correlation,
        x_hot,
        y_hot,
        records_in: events.len(),
        records_out,
    };
    Ok((mask, diagnostics))
}

/// Per-record keep mask of the spatial-correlation filter.
///
/// # Errors
/// Returns [`Error::InvalidThreshold`] unless `0 < threshold <= 1`.
pub fn space_mask(events: &CoincidenceEvents, threshold: f64) -> Result<Vec<bool>> {
    evaluate(events, threshold).map(|(mask, _)| mask)
}

/// Keeps the records that fall into hot bins of both correlation histograms.
///
/// # Errors
/// Returns [`Error::InvalidThreshold`] unless `0 < threshold <= 1`.
pub fn space_filter(events: &CoincidenceEvents, threshold: f64) -> Result<CoincidenceEvents> {
    space_filter_alt(events, threshold).map(|(filtered, _)| filtered)
}

/// Same selection as [`space_filter`], also returning the histograms and
/// masks used, for display.
///
/// # Errors
/// Returns [`Error::InvalidThreshold`] unless `0 < threshold <= 1`.
pub fn space_filter_alt(
    events: &CoincidenceEvents,
    threshold: f64,
) -> Result<(CoincidenceEvents, SpaceFilterDiagnostics)> {
    let (mask, diagnostics) = evaluate(events, threshold)?;
    let filtered = events.select(&mask)?;
    log::debug!(
        "space filter (threshold {threshold}): {} -> {} records, histograms {:?} / {:?}",
        diagnostics.records_in,
        diagnostics.records_out,
        diagnostics.x_correlation.shape(),
        diagnostics.y_correlation.shape()
    );
    Ok((filtered, diagnostics))
}
