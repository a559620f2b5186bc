//! Two-dimensional count histograms over integer coordinates.
//!
//! Bins are one unit wide. Each axis starts at the smallest observed value,
//! so bin `(r, c)` counts the pairs with `row == row_origin + r` and
//! `col == col_origin + c`.

use coincpix_core::{Channel, CoincidenceEvents, Error, Field, Result, SpatialAxis};
use ndarray::{Array2, ArrayView1};

/// Upper bound on the number of bins a histogram may allocate.
pub(crate) const MAX_BINS: usize = 1 << 28;

/// A dense 2D histogram with integer bin origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram2D {
    counts: Array2<u64>,
    row_origin: i64,
    col_origin: i64,
}

impl Histogram2D {
    /// Creates an empty histogram of the given extent.
    #[must_use]
    pub fn new(rows: usize, cols: usize, row_origin: i64, col_origin: i64) -> Self {
        Self {
            counts: Array2::zeros((rows, cols)),
            row_origin,
            col_origin,
        }
    }

    /// Histograms `(rows[i], cols[i])` pairs.
    ///
    /// # Errors
    /// Returns an error if the inputs differ in length or the observed
    /// extent is too large to allocate.
    pub fn from_pairs(rows: ArrayView1<'_, i64>, cols: ArrayView1<'_, i64>) -> Result<Self> {
        if rows.len() != cols.len() {
            return Err(Error::MaskLength {
                mask: cols.len(),
                records: rows.len(),
            });
        }
        let (Some((r_lo, r_hi)), Some((c_lo, c_hi))) = (extent(rows), extent(cols)) else {
            return Ok(Self::new(0, 0, 0, 0));
        };

        let n_rows = span(r_lo, r_hi)?;
        let n_cols = span(c_lo, c_hi)?;
        if n_rows.saturating_mul(n_cols) > MAX_BINS {
            return Err(Error::Computation(format!(
                "histogram of {n_rows}x{n_cols} bins is too large"
            )));
        }

        let mut hist = Self::new(n_rows, n_cols, r_lo, c_lo);
        for (&r, &c) in rows.iter().zip(cols.iter()) {
            hist.increment(r, c);
        }
        Ok(hist)
    }

    /// Bin indices of a coordinate pair, if inside the histogram.
    #[inline]
    #[must_use]
    pub fn bin_of(&self, row: i64, col: i64) -> Option<(usize, usize)> {
        let r = usize::try_from(row.checked_sub(self.row_origin)?).ok()?;
        let c = usize::try_from(col.checked_sub(self.col_origin)?).ok()?;
        (r < self.counts.nrows() && c < self.counts.ncols()).then_some((r, c))
    }

    /// Count at a coordinate pair.
    #[inline]
    #[must_use]
    pub fn get(&self, row: i64, col: i64) -> Option<u64> {
        self.bin_of(row, col).map(|idx| self.counts[idx])
    }

    /// Increments the bin of a coordinate pair; out-of-range pairs are ignored.
    #[inline]
    pub fn increment(&mut self, row: i64, col: i64) {
        if let Some(idx) = self.bin_of(row, col) {
            self.counts[idx] += 1;
        }
    }

    /// Borrow the bin counts.
    #[must_use]
    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// Counts converted to floating point.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> Array2<f64> {
        self.counts.mapv(|c| c as f64)
    }

    /// Coordinate of row bin 0.
    #[must_use]
    pub fn row_origin(&self) -> i64 {
        self.row_origin
    }

    /// Coordinate of column bin 0.
    #[must_use]
    pub fn col_origin(&self) -> i64 {
        self.col_origin
    }

    /// `(rows, cols)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.counts.dim()
    }

    /// Sum of all bins.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.sum()
    }
}

fn extent(values: ArrayView1<'_, i64>) -> Option<(i64, i64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn span(lo: i64, hi: i64) -> Result<usize> {
    hi.checked_sub(lo)
        .and_then(|d| usize::try_from(d).ok())
        .and_then(|d| d.checked_add(1))
        .ok_or_else(|| Error::Computation(format!("coordinate span {lo}..={hi} overflows")))
}

/// Correlation histogram of one spatial axis: rows are signal coordinates,
/// columns are idler coordinates.
///
/// # Errors
/// Returns an error if the coordinate extent is too large.
pub fn correlation_histogram(events: &CoincidenceEvents, axis: SpatialAxis) -> Result<Histogram2D> {
    let field = axis.field();
    Histogram2D::from_pairs(
        events.field(Channel::Signal, field),
        events.field(Channel::Idler, field),
    )
}

/// Spatial image of one channel: rows are y, columns are x.
///
/// # Errors
/// Returns an error if the coordinate extent is too large.
pub fn spatial_histogram(events: &CoincidenceEvents, channel: Channel) -> Result<Histogram2D> {
    Histogram2D::from_pairs(events.field(channel, Field::Y), events.field(channel, Field::X))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coincpix_core::{CoincidenceRecord, Hit};
    use ndarray::{array, Array1};

    #[test]
    fn test_from_pairs_offsets() {
        let rows = array![5, 6, 6, 8];
        let cols = array![-2, -2, 0, -1];
        let hist = Histogram2D::from_pairs(rows.view(), cols.view()).unwrap();
        assert_eq!(hist.shape(), (4, 3));
        assert_eq!(hist.row_origin(), 5);
        assert_eq!(hist.col_origin(), -2);
        assert_eq!(hist.get(6, -2), Some(1));
        assert_eq!(hist.get(6, 0), Some(1));
        assert_eq!(hist.get(7, -1), Some(0));
        assert_eq!(hist.get(9, 0), None);
        assert_eq!(hist.total(), 4);
    }

    #[test]
    fn test_empty_and_mismatch() {
        let none = Array1::<i64>::zeros(0);
        let empty = Histogram2D::from_pairs(none.view(), none.view()).unwrap();
        assert_eq!(empty.shape(), (0, 0));
        assert!(Histogram2D::from_pairs(array![1].view(), none.view()).is_err());
    }

    #[test]
    fn test_correlation_axes() {
        let events = CoincidenceEvents::from_records(&[
            CoincidenceRecord::new(Hit::new(10, 1, 0), Hit::new(40, 7, 0)),
            CoincidenceRecord::new(Hit::new(11, 2, 0), Hit::new(41, 7, 0)),
        ]);
        let hx = correlation_histogram(&events, SpatialAxis::X).unwrap();
        assert_eq!(hx.row_origin(), 40);
        assert_eq!(hx.col_origin(), 10);
        assert_eq!(hx.counts(), &array![[1u64, 0], [0, 1]]);

        let hy = correlation_histogram(&events, SpatialAxis::Y).unwrap();
        assert_eq!(hy.counts(), &array![[1u64, 1]]);

        let img = spatial_histogram(&events, Channel::Idler).unwrap();
        assert_eq!(img.row_origin(), 1);
        assert_eq!(img.col_origin(), 10);
        assert_eq!(img.counts(), &array![[1u64, 0], [0, 1]]);
    }
}
