//! 1D traces through the correlation histograms.
//!
//! A trace is a single column (orientation `x`) or row (orientation `y`) of a
//! correlation histogram, restricted to an index range. The same range cut of
//! the whole histogram is the window used by [`crate::fwhm::fwhm_avg`].
//! Locations and ranges are histogram bin indices, i.e. coordinates relative
//! to the observed minimum.

use coincpix_core::{Channel, CoincidenceEvents, Error, Result, SpatialAxis};
use ndarray::{s, Array1, Array2};

use crate::fwhm::{fwhm_avg, FwhmSummary, Orientation};
use crate::histogram::correlation_histogram;

/// Where to cut a correlation histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRequest {
    /// Histogram to cut.
    pub axis: SpatialAxis,
    /// Column (`X`) or row (`Y`) trace.
    pub orientation: Orientation,
    /// Index of the traced column or row.
    pub loc: usize,
    /// Inclusive index range along the trace.
    pub range: (usize, usize),
}

impl TraceRequest {
    /// Default cut: middle of the signal extent, full signal range.
    #[must_use]
    pub fn centered(events: &CoincidenceEvents, axis: SpatialAxis, orientation: Orientation) -> Self {
        let span = events
            .range(Channel::Signal, axis.field())
            .and_then(|(lo, hi)| usize::try_from(hi - lo).ok())
            .unwrap_or(0);
        Self {
            axis,
            orientation,
            loc: span / 2,
            range: (0, span),
        }
    }
}

/// A trace and the window it was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationTrace {
    /// Counts along the trace.
    pub profile: Array1<f64>,
    /// Range-restricted histogram.
    pub window: Array2<f64>,
    /// Request after clamping the range to the histogram.
    pub request: TraceRequest,
}

impl CorrelationTrace {
    /// Averaged FWHM of the window in the trace orientation.
    ///
    /// # Errors
    /// See [`fwhm_avg`].
    pub fn fwhm(&self) -> Result<FwhmSummary> {
        fwhm_avg(self.window.view(), self.request.orientation)
    }
}

/// Cuts a trace through the correlation histogram of `request.axis`.
///
/// The range end is clamped to the histogram.
///
/// # Errors
/// Returns [`Error::EmptyDataset`] for empty events and
/// [`Error::Computation`] for an inverted range or a location outside the
/// histogram.
pub fn correlation_trace(events: &CoincidenceEvents, request: TraceRequest) -> Result<CorrelationTrace> {
    if events.is_empty() {
        return Err(Error::EmptyDataset("correlation trace"));
    }
    let hist = correlation_histogram(events, request.axis)?.to_f64();
    let (rows, cols) = hist.dim();
    let (along, across) = match request.orientation {
        Orientation::X => (rows, cols),
        Orientation::Y => (cols, rows),
    };

    let (lo, hi) = request.range;
    let hi = hi.min(along - 1);
    if lo > hi {
        return Err(Error::Computation(format!(
            "trace range {lo}..={hi} is empty for {along} bins"
        )));
    }
    if request.loc >= across {
        return Err(Error::Computation(format!(
            "trace location {} outside {across} bins",
            request.loc
        )));
    }

    let (window, profile) = match request.orientation {
        Orientation::X => {
            let window = hist.slice(s![lo..=hi, ..]).to_owned();
            let profile = window.column(request.loc).to_owned();
            (window, profile)
        }
        Orientation::Y => {
            let window = hist.slice(s![.., lo..=hi]).to_owned();
            let profile = window.row(request.loc).to_owned();
            (window, profile)
        }
    };

    Ok(CorrelationTrace {
        profile,
        window,
        request: TraceRequest {
            range: (lo, hi),
            ..request
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coincpix_core::{CoincidenceRecord, Hit};
    use ndarray::array;

    fn events() -> CoincidenceEvents {
        // X pairs (idler, signal): (0,10) x2, (1,11), (2,12), (2,10)
        let pairs = [(0, 10), (0, 10), (1, 11), (2, 12), (2, 10)];
        let records: Vec<_> = pairs
            .iter()
            .map(|&(xi, xs)| CoincidenceRecord::new(Hit::new(xi, xi, 0), Hit::new(xs, xs, 0)))
            .collect();
        CoincidenceEvents::from_records(&records)
    }

    #[test]
    fn test_centered_request() {
        let req = TraceRequest::centered(&events(), SpatialAxis::X, Orientation::X);
        assert_eq!(req.loc, 1);
        assert_eq!(req.range, (0, 2));
        let empty = TraceRequest::centered(&CoincidenceEvents::empty(), SpatialAxis::Y, Orientation::Y);
        assert_eq!((empty.loc, empty.range), (0, (0, 0)));
    }

    #[test]
    fn test_column_trace() {
        // histogram rows = signal 10..=12, cols = idler 0..=2
        // [[2, 0, 1], [0, 1, 0], [0, 0, 1]]
        let req = TraceRequest {
            axis: SpatialAxis::X,
            orientation: Orientation::X,
            loc: 2,
            range: (0, 99),
        };
        let trace = correlation_trace(&events(), req).unwrap();
        assert_eq!(trace.profile, array![1.0, 0.0, 1.0]);
        assert_eq!(trace.window.dim(), (3, 3));
        assert_eq!(trace.request.range, (0, 2));
    }

    #[test]
    fn test_row_trace_restricted() {
        let req = TraceRequest {
            axis: SpatialAxis::X,
            orientation: Orientation::Y,
            loc: 0,
            range: (1, 2),
        };
        let trace = correlation_trace(&events(), req).unwrap();
        assert_eq!(trace.profile, array![0.0, 1.0]);
        assert_eq!(trace.window.dim(), (3, 2));
    }

    #[test]
    fn test_trace_errors() {
        let bad_loc = TraceRequest {
            axis: SpatialAxis::X,
            orientation: Orientation::X,
            loc: 3,
            range: (0, 2),
        };
        assert!(correlation_trace(&events(), bad_loc).is_err());
        let bad_range = TraceRequest {
            range: (5, 9),
            loc: 0,
            ..bad_loc
        };
        assert!(correlation_trace(&events(), bad_range).is_err());
        assert!(matches!(
            correlation_trace(&CoincidenceEvents::empty(), bad_loc),
            Err(Error::EmptyDataset(_))
        ));
    }
}
