//! Time-of-arrival windowing.
//!
//! Keeps the coincidences whose `t_signal - t_idler` lies inside an inclusive
//! window. Selection is stable, so surviving records keep their order.

use coincpix_core::{CoincidenceEvents, Error, Result, TimeWindow};

use crate::histogram::MAX_BINS;

/// Evaluates the window for every record.
#[must_use]
pub fn time_mask(events: &CoincidenceEvents, window: TimeWindow) -> Vec<bool> {
    events
        .time_differences()
        .iter()
        .map(|&dt| window.contains(dt))
        .collect()
}

/// Keeps records with `t_min <= dt <= t_max`.
///
/// # Errors
/// Returns [`Error::InvalidTimeWindow`] if `t_min > t_max`.
pub fn time_filter(events: &CoincidenceEvents, t_min: i64, t_max: i64) -> Result<CoincidenceEvents> {
    filter_window(events, TimeWindow::new(t_min, t_max)?)
}

/// Keeps records whose time difference falls inside `window`.
///
/// # Errors
/// Propagates selection errors from the event model.
pub fn filter_window(events: &CoincidenceEvents, window: TimeWindow) -> Result<CoincidenceEvents> {
    let mask = time_mask(events, window);
    let filtered = events.select(&mask)?;
    log::debug!(
        "time filter [{}, {}]: {} -> {} records",
        window.min,
        window.max,
        events.len(),
        filtered.len()
    );
    Ok(filtered)
}

/// Turns two histogram clicks into a filter window.
///
/// A `(0, 0)` pair means no usable selection was made and yields
/// `last_good`. Any other pair is ordered into a window.
#[must_use]
pub fn resolve_selection(clicks: (i64, i64), last_good: TimeWindow) -> TimeWindow {
    match clicks {
        (0, 0) => last_good,
        (a, b) => TimeWindow {
            min: a.min(b),
            max: a.max(b),
        },
    }
}

/// Counts time differences per integer bin over `min_bin..=max_bin`.
///
/// Entry `i` holds the number of records with `dt == min_bin + i`. Records
/// outside the range are not counted.
///
/// # Errors
/// Returns [`Error::InvalidTimeWindow`] if `min_bin > max_bin`, and
/// [`Error::Computation`] if the range needs more bins than a histogram may
/// allocate.
pub fn dt_histogram(events: &CoincidenceEvents, min_bin: i64, max_bin: i64) -> Result<Vec<u64>> {
    let window = TimeWindow::new(min_bin, max_bin)?;
    let bins = window
        .width()
        .and_then(|w| usize::try_from(w).ok())
        .and_then(|w| w.checked_add(1))
        .filter(|&n| n <= MAX_BINS)
        .ok_or_else(|| {
            Error::Computation(format!(
                "dt histogram over [{min_bin}, {max_bin}] is too large"
            ))
        })?;
    let mut counts = vec![0u64; bins];
    for &dt in &events.time_differences() {
        if window.contains(dt) {
            if let Ok(idx) = usize::try_from(dt - min_bin) {
                counts[idx] += 1;
            }
        }
    }
    Ok(counts)
}
