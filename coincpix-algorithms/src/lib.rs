//! coincpix-algorithms: Filters and metrics for coincidence datasets.
//!
//! This crate provides the numerical pipeline:
//! - **Time filter** - inclusive window on `t_signal - t_idler`
//! - **Space filter** - four-mask AND over the X/Y correlation histograms
//! - **Rebinning** - ceil-quantised coordinates and images
//! - **FWHM** - single-peak and windowed-trace estimators
//! - **Fidelity** - normalized cross-correlation against a prepared reference
//!
//! plus the background job handle and the [`Session`] that ties the stages
//! to the observed datasets.
//!
#![warn(missing_docs)]

mod correlation;
mod fidelity;
mod fwhm;
mod geometry;
pub mod histogram;
mod job;
mod rebin;
mod session;
mod space_filter;
mod time_filter;
mod trace;

pub use correlation::{fidelity, normalized_cross_correlation};
pub use fidelity::{
    binarize, calc_fidelities, crop_rows, try_calc_fidelities, Fidelities, ReferenceImage,
};
pub use fwhm::{
    beam_quality, fwhm_avg, fwhm_single, reject_outliers, slice_widths, BeamQuality, FwhmSummary,
    Orientation, BACKGROUND_FLOOR,
};
pub use geometry::{clamp_negative, rotate, sample_bilinear, zoom};
pub use histogram::{correlation_histogram, spatial_histogram, Histogram2D};
pub use job::{JobStatus, ProcessingJob, DEFAULT_POLL_INTERVAL};
pub use rebin::{bin, bin_image, bin_in_place, ceil_div, RebinStage};
pub use session::{
    ResetSource, Session, SpaceFilterStage, TimeFilterStage, TimeWindowReset,
    DEFAULT_SPACE_THRESHOLD,
};
pub use space_filter::{space_filter, space_filter_alt, space_mask, HotBins, SpaceFilterDiagnostics};
pub use time_filter::{dt_histogram, filter_window, resolve_selection, time_filter, time_mask};
pub use trace::{correlation_trace, CorrelationTrace, TraceRequest};
