//! Dataset ownership and change notification.
//!
//! A session holds each coincidence dataset in a [`DatasetCell`] and pairs it
//! with an [`UpdateBus`]. Replacing the dataset notifies every listener
//! synchronously, in registration order, before `set` returns. Listeners only
//! receive a shared borrow of the new dataset, so they cannot replace it from
//! inside a callback.

use crate::CoincidenceEvents;

/// Which dataset slot changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Coincidences as produced by the detector toolkit.
    Raw,
    /// Output of the filter pipeline.
    Filtered,
}

/// Notification sent to listeners after a dataset is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetChanged {
    /// Slot that changed.
    pub kind: DatasetKind,
    /// Number of records in the new dataset.
    pub len: usize,
    /// Monotonic count of replacements of this slot.
    pub generation: u64,
}

/// Single-slot owner of a coincidence dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetCell {
    events: CoincidenceEvents,
    generation: u64,
}

impl DatasetCell {
    /// Creates a cell holding `events`.
    #[must_use]
    pub fn new(events: CoincidenceEvents) -> Self {
        Self {
            events,
            generation: 0,
        }
    }

    /// Borrows the current dataset.
    #[must_use]
    pub fn get(&self) -> &CoincidenceEvents {
        &self.events
    }

    /// Replaces the dataset and returns the previous one.
    pub fn set(&mut self, events: CoincidenceEvents) -> CoincidenceEvents {
        self.generation += 1;
        std::mem::replace(&mut self.events, events)
    }

    /// Number of times the dataset has been replaced.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Receiver of dataset change notifications.
pub trait DatasetListener {
    /// Called after the dataset has been replaced.
    fn dataset_changed(&mut self, change: &DatasetChanged, events: &CoincidenceEvents);
}

impl<F> DatasetListener for F
where
    F: FnMut(&DatasetChanged, &CoincidenceEvents),
{
    fn dataset_changed(&mut self, change: &DatasetChanged, events: &CoincidenceEvents) {
        self(change, events);
    }
}

/// Handle returned by [`UpdateBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered, synchronous list of dataset listeners.
#[derive(Default)]
pub struct UpdateBus {
    listeners: Vec<(ListenerId, Box<dyn DatasetListener>)>,
    next_id: u64,
}

impl std::fmt::Debug for UpdateBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl UpdateBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener at the end of the dispatch order.
    pub fn subscribe<L: DatasetListener + 'static>(&mut self, listener: L) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Invokes every listener in registration order.
    pub fn notify(&mut self, change: &DatasetChanged, events: &CoincidenceEvents) {
        for (_, listener) in &mut self.listeners {
            listener.dataset_changed(change, events);
        }
    }
}

/// A dataset cell bundled with its update bus.
#[derive(Debug)]
pub struct ObservedDataset {
    kind: DatasetKind,
    cell: DatasetCell,
    bus: UpdateBus,
}

impl ObservedDataset {
    /// Creates an empty observed slot.
    #[must_use]
    pub fn new(kind: DatasetKind) -> Self {
        Self {
            kind,
            cell: DatasetCell::default(),
            bus: UpdateBus::new(),
        }
    }

    /// Borrows the current dataset.
    #[must_use]
    pub fn get(&self) -> &CoincidenceEvents {
        self.cell.get()
    }

    /// Replaces the dataset, then notifies all listeners.
    pub fn set(&mut self, events: CoincidenceEvents) -> CoincidenceEvents {
        let previous = self.cell.set(events);
        self.notify();
        previous
    }

    /// Re-sends the current dataset to all listeners.
    pub fn notify(&mut self) {
        let change = DatasetChanged {
            kind: self.kind,
            len: self.cell.get().len(),
            generation: self.cell.generation(),
        };
        log::trace!(
            "{:?} dataset changed: {} records (generation {})",
            change.kind,
            change.len,
            change.generation
        );
        self.bus.notify(&change, self.cell.get());
    }

    /// Registers a listener for this slot.
    pub fn subscribe<L: DatasetListener + 'static>(&mut self, listener: L) -> ListenerId {
        self.bus.subscribe(listener)
    }

    /// Removes a listener from this slot.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Slot kind.
    #[must_use]
    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    /// Number of replacements so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.cell.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoincidenceRecord, Hit};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn events(n: usize) -> CoincidenceEvents {
        let records: Vec<_> = (0..n)
            .map(|i| {
                let t = i64::try_from(i).unwrap();
                CoincidenceRecord::new(Hit::new(0, 0, t), Hit::new(1, 1, t + 5))
            })
            .collect();
        CoincidenceEvents::from_records(&records)
    }

    #[test]
    fn test_cell_set_returns_previous() {
        let mut cell = DatasetCell::new(events(2));
        let prev = cell.set(events(5));
        assert_eq!(prev.len(), 2);
        assert_eq!(cell.get().len(), 5);
        assert_eq!(cell.generation(), 1);
    }

    #[test]
    fn test_listeners_called_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut slot = ObservedDataset::new(DatasetKind::Filtered);

        for name in ["preview", "histogram", "counts"] {
            let log = Rc::clone(&log);
            slot.subscribe(move |change: &DatasetChanged, ev: &CoincidenceEvents| {
                assert_eq!(change.len, ev.len());
                log.borrow_mut().push((name, change.len, change.generation));
            });
        }

        slot.set(events(3));
        assert_eq!(
            *log.borrow(),
            vec![("preview", 3, 1), ("histogram", 3, 1), ("counts", 3, 1)]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let hits = Rc::new(RefCell::new(0));
        let mut slot = ObservedDataset::new(DatasetKind::Raw);
        let counter = Rc::clone(&hits);
        let id = slot.subscribe(move |_: &DatasetChanged, _: &CoincidenceEvents| {
            *counter.borrow_mut() += 1;
        });
        slot.set(events(1));
        assert!(slot.unsubscribe(id));
        assert!(!slot.unsubscribe(id));
        slot.set(events(1));
        assert_eq!(*hits.borrow(), 1);
    }
}
