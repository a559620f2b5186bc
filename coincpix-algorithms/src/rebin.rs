//! Spatial rebinning.
//!
//! Coordinates are quantised with `v -> ceil(v / k)`. The same mapping is
//! used for event coordinates and for image pixels, so histogramming rebinned
//! events agrees with rebinning the histogram.
//!
//! Rebinning is not idempotent: binning twice by `k` divides twice. Use
//! [`RebinStage`] to always bin from an unbinned baseline.

use coincpix_core::{Channel, CoincidenceEvents, Error, Field, Result};
use ndarray::{Array2, ArrayView2};

/// `ceil(value / divisor)` for a positive divisor, exact for negative values.
#[inline]
#[must_use]
pub fn ceil_div(value: i64, divisor: i64) -> i64 {
    let q = value / divisor;
    if value % divisor != 0 && value > 0 {
        q + 1
    } else {
        q
    }
}

fn check_bin_size(axis: char, value: i64) -> Result<()> {
    if value <= 0 {
        return Err(Error::InvalidBinSize { axis, value });
    }
    Ok(())
}

/// Quantises x by `xbinsize` and y by `ybinsize` on both hits.
///
/// The record count is unchanged.
///
/// # Errors
/// Returns [`Error::InvalidBinSize`] for a non-positive bin size.
pub fn bin(mut events: CoincidenceEvents, xbinsize: i64, ybinsize: i64) -> Result<CoincidenceEvents> {
    bin_in_place(&mut events, xbinsize, ybinsize)?;
    Ok(events)
}

/// In-place form of [`bin`].
///
/// # Errors
/// Returns [`Error::InvalidBinSize`] for a non-positive bin size. The events
/// are left untouched on error.
pub fn bin_in_place(events: &mut CoincidenceEvents, xbinsize: i64, ybinsize: i64) -> Result<()> {
    check_bin_size('x', xbinsize)?;
    check_bin_size('y', ybinsize)?;
    for channel in Channel::ALL {
        events
            .field_mut(channel, Field::X)
            .mapv_inplace(|v| ceil_div(v, xbinsize));
        events
            .field_mut(channel, Field::Y)
            .mapv_inplace(|v| ceil_div(v, ybinsize));
    }
    log::debug!(
        "rebinned {} records by ({xbinsize}, {ybinsize})",
        events.len()
    );
    Ok(())
}

fn binned_len(len: usize, k: usize) -> usize {
    if len == 0 {
        0
    } else {
        (len - 1).div_ceil(k) + 1
    }
}

/// Sums image pixels into ceil-quantised bins.
///
/// Row `r` lands in output row `ceil(r / ybin)` and column `c` in output
/// column `ceil(c / xbin)`.
///
/// # Errors
/// Returns [`Error::InvalidBinSize`] for a non-positive bin size.
pub fn bin_image(image: ArrayView2<'_, f64>, xbin: i64, ybin: i64) -> Result<Array2<f64>> {
    check_bin_size('x', xbin)?;
    check_bin_size('y', ybin)?;
    let kx = usize::try_from(xbin).map_err(|_| Error::InvalidBinSize { axis: 'x', value: xbin })?;
    let ky = usize::try_from(ybin).map_err(|_| Error::InvalidBinSize { axis: 'y', value: ybin })?;

    let (rows, cols) = image.dim();
    let mut out = Array2::zeros((binned_len(rows, ky), binned_len(cols, kx)));
    for ((r, c), &v) in image.indexed_iter() {
        out[[r.div_ceil(ky), c.div_ceil(kx)]] += v;
    }
    Ok(out)
}

/// Current event bin factor plus the unbinned dataset it applies to.
#[derive(Debug, Clone)]
pub struct RebinStage {
    factor: (i64, i64),
    baseline: CoincidenceEvents,
}

impl Default for RebinStage {
    fn default() -> Self {
        Self {
            factor: (1, 1),
            baseline: CoincidenceEvents::empty(),
        }
    }
}

impl RebinStage {
    /// Creates a stage with factor `(1, 1)`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `(x, y)` factor.
    #[must_use]
    pub fn factor(&self) -> (i64, i64) {
        self.factor
    }

    /// The unbinned dataset.
    #[must_use]
    pub fn baseline(&self) -> &CoincidenceEvents {
        &self.baseline
    }

    /// Replaces the baseline and returns it binned by the current factor.
    ///
    /// # Errors
    /// Propagates errors from [`bin`].
    pub fn rebase(&mut self, baseline: CoincidenceEvents) -> Result<CoincidenceEvents> {
        self.baseline = baseline;
        self.output()
    }

    /// Changes the factor and returns the baseline binned by it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinSize`] for a non-positive factor; the
    /// current factor is kept.
    pub fn set_factor(&mut self, xbinsize: i64, ybinsize: i64) -> Result<CoincidenceEvents> {
        check_bin_size('x', xbinsize)?;
        check_bin_size('y', ybinsize)?;
        self.factor = (xbinsize, ybinsize);
        self.output()
    }

    /// Baseline binned by the current factor.
    ///
    /// # Errors
    /// Propagates errors from [`bin`].
    pub fn output(&self) -> Result<CoincidenceEvents> {
        match self.factor {
            (1, 1) => Ok(self.baseline.clone()),
            (x, y) => bin(self.baseline.clone(), x, y),
        }
    }
}
