//! Session orchestration.
//!
//! A [`Session`] owns the raw and filtered datasets and runs the pipeline
//!
//! ```text
//! raw -> time filter -> space filter -> rebin -> filtered
//! ```
//!
//! The filter functions stay pure. The session is the only place where
//! datasets are replaced and listeners notified.

use std::cell::Cell;
use std::rc::Rc;

use coincpix_core::{
    CoincidenceEvents, DatasetKind, DatasetListener, ListenerId, ObservedDataset, Result,
    SessionConfig, TimeWindow,
};

use crate::fidelity::{Fidelities, ReferenceImage};
use crate::rebin::RebinStage;
use crate::space_filter::{space_filter_alt, SpaceFilterDiagnostics};
use crate::time_filter::{filter_window, resolve_selection};

/// Space filter threshold used until the caller picks one.
pub const DEFAULT_SPACE_THRESHOLD: f64 = 0.2;

/// Supplies the dataset the space filter restarts from on reset.
pub trait ResetSource {
    /// Recomputes the unfiltered-in-space dataset from the raw one.
    ///
    /// # Errors
    /// Returns any error of the recomputation.
    fn reset_input(&self, raw: &CoincidenceEvents) -> Result<CoincidenceEvents>;
}

impl<F> ResetSource for F
where
    F: Fn(&CoincidenceEvents) -> Result<CoincidenceEvents>,
{
    fn reset_input(&self, raw: &CoincidenceEvents) -> Result<CoincidenceEvents> {
        self(raw)
    }
}

/// Time filter state: the last confirmed window.
#[derive(Debug, Clone, Default)]
pub struct TimeFilterStage {
    last_good: Rc<Cell<TimeWindow>>,
}

impl TimeFilterStage {
    /// Creates a stage starting from `window`.
    #[must_use]
    pub fn new(window: TimeWindow) -> Self {
        Self {
            last_good: Rc::new(Cell::new(window)),
        }
    }

    /// Last confirmed window.
    #[must_use]
    pub fn window(&self) -> TimeWindow {
        self.last_good.get()
    }

    /// Resolves a click pair and remembers the result.
    pub fn select(&self, clicks: (i64, i64)) -> TimeWindow {
        let window = resolve_selection(clicks, self.last_good.get());
        self.last_good.set(window);
        window
    }

    /// Applies the last confirmed window to `raw`.
    ///
    /// # Errors
    /// Propagates selection errors.
    pub fn apply(&self, raw: &CoincidenceEvents) -> Result<CoincidenceEvents> {
        filter_window(raw, self.last_good.get())
    }

    /// A reset source that re-applies this stage's current window.
    #[must_use]
    pub fn reset_source(&self) -> TimeWindowReset {
        TimeWindowReset {
            window: Rc::clone(&self.last_good),
        }
    }
}

/// Reset source bound to a time filter stage.
#[derive(Debug, Clone)]
pub struct TimeWindowReset {
    window: Rc<Cell<TimeWindow>>,
}

impl ResetSource for TimeWindowReset {
    fn reset_input(&self, raw: &CoincidenceEvents) -> Result<CoincidenceEvents> {
        filter_window(raw, self.window.get())
    }
}

/// Space filter state: threshold, injected reset source and last diagnostics.
pub struct SpaceFilterStage {
    threshold: f64,
    reset: Box<dyn ResetSource>,
    diagnostics: Option<SpaceFilterDiagnostics>,
}

impl std::fmt::Debug for SpaceFilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceFilterStage")
            .field("threshold", &self.threshold)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish_non_exhaustive()
    }
}

impl SpaceFilterStage {
    /// Creates a stage with its reset source.
    pub fn new<R: ResetSource + 'static>(threshold: f64, reset: R) -> Self {
        Self {
            threshold,
            reset: Box::new(reset),
            diagnostics: None,
        }
    }

    /// Threshold of the last run.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Histograms and masks of the last run.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&SpaceFilterDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Runs the filter and remembers the threshold.
    ///
    /// # Errors
    /// Returns an error for a threshold outside (0, 1]; the stage is
    /// unchanged in that case.
    pub fn apply(&mut self, events: &CoincidenceEvents, threshold: f64) -> Result<CoincidenceEvents> {
        let (filtered, diagnostics) = space_filter_alt(events, threshold)?;
        self.threshold = threshold;
        self.diagnostics = Some(diagnostics);
        Ok(filtered)
    }

    /// Recomputes the input of the space filter through the reset source.
    ///
    /// # Errors
    /// Propagates the reset source's error.
    pub fn reset(&mut self, raw: &CoincidenceEvents) -> Result<CoincidenceEvents> {
        self.diagnostics = None;
        self.reset.reset_input(raw)
    }
}

/// Owner of the datasets and the filter pipeline of one analysis session.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    raw: ObservedDataset,
    filtered: ObservedDataset,
    time: TimeFilterStage,
    space: SpaceFilterStage,
    rebin: RebinStage,
    reference: Option<ReferenceImage>,
}

impl Session {
    /// Creates an empty session.
    ///
    /// # Errors
    /// Returns an error if `config` does not validate.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let time = TimeFilterStage::new(config.time_filter);
        let space = SpaceFilterStage::new(DEFAULT_SPACE_THRESHOLD, time.reset_source());
        Ok(Self {
            config,
            raw: ObservedDataset::new(DatasetKind::Raw),
            filtered: ObservedDataset::new(DatasetKind::Filtered),
            time,
            space,
            rebin: RebinStage::new(),
            reference: None,
        })
    }

    /// Rebuilds a session from a raw dataset and a saved configuration.
    ///
    /// The saved time window is applied to the raw data. The reference is
    /// not loaded here; callers prepare it from `config.reference` and pass
    /// it to [`Session::set_reference`].
    ///
    /// # Errors
    /// Returns an error if `config` does not validate.
    pub fn replay(raw: CoincidenceEvents, config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(config)?;
        session.load_raw(raw)?;
        session.apply_time_filter((0, 0))?;
        Ok(session)
    }

    /// Installs a new raw dataset; the filtered dataset becomes a copy.
    ///
    /// The event bin factor goes back to 1.
    ///
    /// # Errors
    /// Propagates rebinning errors.
    pub fn load_raw(&mut self, raw: CoincidenceEvents) -> Result<()> {
        log::info!("loaded {} raw coincidences", raw.len());
        self.raw.set(raw);
        self.reset()
    }

    /// Restores the filtered dataset to a copy of the raw one.
    ///
    /// # Errors
    /// Propagates rebinning errors.
    pub fn reset(&mut self) -> Result<()> {
        self.rebin = RebinStage::new();
        self.space.diagnostics = None;
        let copy = self.raw.get().clone();
        log::info!("filtered dataset reset to raw ({} records)", copy.len());
        self.publish(copy)
    }

    /// Applies the time filter from a pair of histogram clicks.
    ///
    /// `(0, 0)` re-applies the last confirmed window. The filter always
    /// starts from the raw dataset.
    ///
    /// # Errors
    /// Propagates filter errors.
    pub fn apply_time_filter(&mut self, clicks: (i64, i64)) -> Result<TimeWindow> {
        let window = self.time.select(clicks);
        let filtered = self.time.apply(self.raw.get())?;
        self.publish(filtered)?;
        Ok(window)
    }

    /// Applies the spatial-correlation filter to the current unbinned data.
    ///
    /// Returns the number of surviving records.
    ///
    /// # Errors
    /// Returns an error for a threshold outside (0, 1].
    pub fn apply_space_filter(&mut self, threshold: f64) -> Result<usize> {
        let filtered = self.space.apply(self.rebin.baseline(), threshold)?;
        let kept = filtered.len();
        self.publish(filtered)?;
        Ok(kept)
    }

    /// Undoes space filtering by recomputing its input from raw.
    ///
    /// # Errors
    /// Propagates the reset source's error.
    pub fn reset_space_filter(&mut self) -> Result<()> {
        let input = self.space.reset(self.raw.get())?;
        self.publish(input)
    }

    /// Rebins the current unbinned data by `(x, y)`.
    ///
    /// # Errors
    /// Returns an error for a non-positive factor.
    pub fn set_binning(&mut self, xbinsize: i64, ybinsize: i64) -> Result<()> {
        let binned = self.rebin.set_factor(xbinsize, ybinsize)?;
        log::info!("bin factor set to ({xbinsize}, {ybinsize})");
        self.filtered.set(binned);
        Ok(())
    }

    fn publish(&mut self, baseline: CoincidenceEvents) -> Result<()> {
        let out = self.rebin.rebase(baseline)?;
        self.filtered.set(out);
        Ok(())
    }

    /// Installs or clears the prepared reference.
    pub fn set_reference(&mut self, reference: Option<ReferenceImage>) {
        if let Some(r) = &reference {
            self.config.reference = r.params().clone();
        }
        self.reference = reference;
    }

    /// The prepared reference, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&ReferenceImage> {
        self.reference.as_ref()
    }

    /// Fidelity of the filtered dataset, if a reference is set.
    #[must_use]
    pub fn fidelities(&self) -> Option<Fidelities> {
        self.reference
            .as_ref()
            .map(|r| r.fidelities(self.filtered.get()))
    }

    /// Registers a listener on the raw dataset.
    pub fn subscribe_raw<L: DatasetListener + 'static>(&mut self, listener: L) -> ListenerId {
        self.raw.subscribe(listener)
    }

    /// Registers a listener on the filtered dataset.
    pub fn subscribe_filtered<L: DatasetListener + 'static>(&mut self, listener: L) -> ListenerId {
        self.filtered.subscribe(listener)
    }

    /// Removes a listener from either dataset.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.raw.unsubscribe(id) || self.filtered.unsubscribe(id)
    }

    /// Raw dataset.
    #[must_use]
    pub fn raw(&self) -> &CoincidenceEvents {
        self.raw.get()
    }

    /// Filtered dataset.
    #[must_use]
    pub fn filtered(&self) -> &CoincidenceEvents {
        self.filtered.get()
    }

    /// Filtered dataset before rebinning.
    #[must_use]
    pub fn unbinned(&self) -> &CoincidenceEvents {
        self.rebin.baseline()
    }

    /// Last confirmed time window.
    #[must_use]
    pub fn time_window(&self) -> TimeWindow {
        self.time.window()
    }

    /// Space filter threshold of the last run.
    #[must_use]
    pub fn space_threshold(&self) -> f64 {
        self.space.threshold()
    }

    /// Diagnostics of the last space filter run.
    #[must_use]
    pub fn space_diagnostics(&self) -> Option<&SpaceFilterDiagnostics> {
        self.space.diagnostics()
    }

    /// Current event bin factor.
    #[must_use]
    pub fn binning(&self) -> (i64, i64) {
        self.rebin.factor()
    }

    /// Configuration reflecting the current session state.
    #[must_use]
    pub fn config_snapshot(&self) -> SessionConfig {
        self.config.clone().with_time_filter(self.time.window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coincpix_core::{CoincidenceRecord, DatasetChanged, Hit};
    use std::cell::RefCell;

    fn with_dts(dts: &[i64]) -> CoincidenceEvents {
        let records: Vec<_> = dts
            .iter()
            .enumerate()
            .map(|(i, &dt)| {
                let p = i64::try_from(i).unwrap() * 4;
                CoincidenceRecord::new(Hit::new(p, p, 1000), Hit::new(p + 1, p + 2, 1000 + dt))
            })
            .collect();
        CoincidenceEvents::from_records(&records)
    }

    #[test]
    fn test_time_filter_click_fallback() {
        let mut session = Session::new(SessionConfig::new()).unwrap();
        session.load_raw(with_dts(&[-300, -50, 0, 50, 300])).unwrap();
        assert_eq!(session.filtered().len(), 5);

        let window = session.apply_time_filter((100, -100)).unwrap();
        assert_eq!(window, TimeWindow { min: -100, max: 100 });
        assert_eq!(session.filtered().len(), 3);

        // (0, 0) keeps the last confirmed window instead of an empty one.
        let window = session.apply_time_filter((0, 0)).unwrap();
        assert_eq!(window, TimeWindow { min: -100, max: 100 });
        assert_eq!(session.filtered().len(), 3);
        assert_eq!(session.config_snapshot().time_filter, window);
    }

    #[test]
    fn test_listeners_see_every_update_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut session = Session::new(SessionConfig::new()).unwrap();
        let first = Rc::clone(&log);
        session.subscribe_filtered(move |c: &DatasetChanged, _: &CoincidenceEvents| {
            first.borrow_mut().push(("first", c.len));
        });
        let second = Rc::clone(&log);
        session.subscribe_filtered(move |c: &DatasetChanged, _: &CoincidenceEvents| {
            second.borrow_mut().push(("second", c.len));
        });
        let raw_log = Rc::clone(&log);
        session.subscribe_raw(move |c: &DatasetChanged, _: &CoincidenceEvents| {
            raw_log.borrow_mut().push(("raw", c.len));
        });

        session.load_raw(with_dts(&[0, 500])).unwrap();
        session.apply_time_filter((-10, 10)).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                ("raw", 2),
                ("first", 2),
                ("second", 2),
                ("first", 1),
                ("second", 1)
            ]
        );
    }

    #[test]
    fn test_binning_restarts_from_baseline() {
        let mut session = Session::new(SessionConfig::new()).unwrap();
        session.load_raw(with_dts(&[0, 0, 0])).unwrap();
        session.set_binning(2, 2).unwrap();
        let once = session.filtered().clone();
        session.set_binning(2, 2).unwrap();
        assert_eq!(session.filtered(), &once);
        assert_eq!(session.unbinned(), session.raw());
        assert!(session.set_binning(0, 2).is_err());
        assert_eq!(session.binning(), (2, 2));

        // Later filters are binned with the current factor.
        session.apply_time_filter((-1, 1)).unwrap();
        assert_eq!(session.filtered(), &once);
    }

    #[test]
    fn test_space_filter_reset_uses_injected_source() {
        let mut session = Session::new(SessionConfig::new()).unwrap();
        session.load_raw(with_dts(&[0, 5, 300])).unwrap();
        session.apply_time_filter((-10, 10)).unwrap();
        assert_eq!(session.filtered().len(), 2);

        // Every record sits in its own bin, so a threshold of 1 rejects all.
        assert_eq!(session.apply_space_filter(1.0).unwrap(), 0);
        assert!(session.space_diagnostics().is_some());
        assert!(session.apply_space_filter(1.5).is_err());

        session.reset_space_filter().unwrap();
        assert_eq!(session.filtered().len(), 2);
        assert!(session.space_diagnostics().is_none());
    }

    #[test]
    fn test_space_stage_with_closure_source() {
        let mut stage = SpaceFilterStage::new(0.5, |raw: &CoincidenceEvents| -> Result<CoincidenceEvents> {
            Ok(raw.clone())
        });
        let raw = with_dts(&[1, 2]);
        assert_eq!(stage.reset(&raw).unwrap(), raw);
        assert!((stage.threshold() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_replay_rederives_filtered() {
        let config = SessionConfig::new().with_time_filter(TimeWindow { min: 0, max: 60 });
        let session = Session::replay(with_dts(&[-300, -50, 0, 50, 300]), config.clone()).unwrap();
        assert_eq!(session.filtered().len(), 2);
        assert_eq!(session.config_snapshot(), config);
        assert!(session.fidelities().is_none());
    }

    #[test]
    fn test_reset_restores_raw() {
        let mut session = Session::new(SessionConfig::new()).unwrap();
        session.load_raw(with_dts(&[0, 900])).unwrap();
        session.apply_time_filter((-5, 5)).unwrap();
        session.set_binning(3, 3).unwrap();
        session.reset().unwrap();
        assert_eq!(session.filtered(), session.raw());
        assert_eq!(session.binning(), (1, 1));
    }
}
