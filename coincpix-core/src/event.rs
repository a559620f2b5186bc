//! Coincidence event arrays.
//!
//! A coincidence dataset is a dense `(2, 3, N)` tensor. Axis 0 selects the hit
//! in the pair (idler, signal), axis 1 the field (x, y, t) and axis 2 the
//! record. Filters select along axis 2; rebinning rewrites the x/y planes.

use ndarray::{s, Array1, Array3, ArrayView1, ArrayViewMut1, Axis, Zip};

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One of the two correlated detection channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Channel {
    /// Hit index 0.
    Idler,
    /// Hit index 1.
    Signal,
}

impl Channel {
    /// Both channels in tensor order.
    pub const ALL: [Channel; 2] = [Channel::Idler, Channel::Signal];

    /// Index along axis 0.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Channel::Idler => 0,
            Channel::Signal => 1,
        }
    }
}

/// Per-hit field stored along axis 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Field {
    /// Pixel column.
    X,
    /// Pixel row.
    Y,
    /// Arrival timestamp in detector clock units.
    T,
}

impl Field {
    /// Index along axis 1.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Field::X => 0,
            Field::Y => 1,
            Field::T => 2,
        }
    }
}

/// A spatial coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpatialAxis {
    /// Pixel columns.
    X,
    /// Pixel rows.
    Y,
}

impl SpatialAxis {
    /// Both spatial axes.
    pub const ALL: [SpatialAxis; 2] = [SpatialAxis::X, SpatialAxis::Y];

    /// The tensor field holding this coordinate.
    #[inline]
    #[must_use]
    pub fn field(self) -> Field {
        match self {
            SpatialAxis::X => Field::X,
            SpatialAxis::Y => Field::Y,
        }
    }
}

/// A single detector hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Pixel column.
    pub x: i64,
    /// Pixel row.
    pub y: i64,
    /// Arrival timestamp.
    pub t: i64,
}

impl Hit {
    /// Creates a new hit.
    #[inline]
    #[must_use]
    pub fn new(x: i64, y: i64, t: i64) -> Self {
        Self { x, y, t }
    }

    #[inline]
    fn get(&self, field: Field) -> i64 {
        match field {
            Field::X => self.x,
            Field::Y => self.y,
            Field::T => self.t,
        }
    }
}

/// One coincidence: an idler hit paired with a signal hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoincidenceRecord {
    /// Hit on the idler channel.
    pub idler: Hit,
    /// Hit on the signal channel.
    pub signal: Hit,
}

impl CoincidenceRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(idler: Hit, signal: Hit) -> Self {
        Self { idler, signal }
    }

    /// Returns the hit on the given channel.
    #[inline]
    #[must_use]
    pub fn hit(&self, channel: Channel) -> Hit {
        match channel {
            Channel::Idler => self.idler,
            Channel::Signal => self.signal,
        }
    }

    /// Signal timestamp minus idler timestamp, saturating like
    /// [`CoincidenceEvents::time_differences`].
    #[inline]
    #[must_use]
    pub fn dt(&self) -> i64 {
        self.signal.t.saturating_sub(self.idler.t)
    }
}

/// A coincidence dataset with the `(2, 3, N)` layout enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoincidenceEvents {
    data: Array3<i64>,
}

impl Default for CoincidenceEvents {
    fn default() -> Self {
        Self::empty()
    }
}

impl CoincidenceEvents {
    /// Wraps a tensor, rejecting anything that is not `(2, 3, N)`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] if axis 0 is not 2 long or axis 1 is not 3 long.
    pub fn new(data: Array3<i64>) -> Result<Self> {
        let shape = data.shape();
        if shape[0] != 2 || shape[1] != 3 {
            return Err(Error::InvalidShape {
                expected: "(2, 3, N)",
                got: shape.to_vec(),
            });
        }
        Ok(Self { data })
    }

    /// An empty dataset with shape `(2, 3, 0)`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Array3::zeros((2, 3, 0)),
        }
    }

    /// Builds a dataset from individual records.
    #[must_use]
    pub fn from_records(records: &[CoincidenceRecord]) -> Self {
        let data = Array3::from_shape_fn((2, 3, records.len()), |(c, f, i)| {
            let channel = Channel::ALL[c];
            let field = [Field::X, Field::Y, Field::T][f];
            records[i].hit(channel).get(field)
        });
        Self { data }
    }

    /// Returns the number of coincidence records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the underlying tensor.
    #[must_use]
    pub fn as_array(&self) -> &Array3<i64> {
        &self.data
    }

    /// Consumes the dataset and returns the tensor.
    #[must_use]
    pub fn into_array(self) -> Array3<i64> {
        self.data
    }

    /// View of one field of one channel across all records.
    #[must_use]
    pub fn field(&self, channel: Channel, field: Field) -> ArrayView1<'_, i64> {
        self.data.slice(s![channel.index(), field.index(), ..])
    }

    /// Mutable view of one field of one channel across all records.
    pub fn field_mut(&mut self, channel: Channel, field: Field) -> ArrayViewMut1<'_, i64> {
        self.data.slice_mut(s![channel.index(), field.index(), ..])
    }

    /// `t_signal - t_idler` for every record.
    ///
    /// Detector timestamps are far from the `i64` limits; a difference that
    /// would overflow saturates.
    #[must_use]
    pub fn time_differences(&self) -> Array1<i64> {
        let idler = self.field(Channel::Idler, Field::T);
        let signal = self.field(Channel::Signal, Field::T);
        Zip::from(&signal)
            .and(&idler)
            .map_collect(|&s, &i| s.saturating_sub(i))
    }

    /// Inclusive `(min, max)` of a field, or `None` when empty.
    #[must_use]
    pub fn range(&self, channel: Channel, field: Field) -> Option<(i64, i64)> {
        self.field(channel, field)
            .iter()
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Returns the record at `index`.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<CoincidenceRecord> {
        if index >= self.len() {
            return None;
        }
        let hit = |c: usize| Hit {
            x: self.data[[c, 0, index]],
            y: self.data[[c, 1, index]],
            t: self.data[[c, 2, index]],
        };
        Some(CoincidenceRecord::new(hit(0), hit(1)))
    }

    /// Iterates over all records in order.
    pub fn records(&self) -> impl Iterator<Item = CoincidenceRecord> + '_ {
        (0..self.len()).filter_map(move |i| self.record(i))
    }

    /// Keeps the records whose mask entry is true, preserving order.
    ///
    /// # Errors
    /// Returns [`Error::MaskLength`] if the mask does not have one entry per record.
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(Error::MaskLength {
                mask: mask.len(),
                records: self.len(),
            });
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        let data = Array3::from_shape_fn((2, 3, keep.len()), |(c, f, i)| {
            self.data[[c, f, keep[i]]]
        });
        Ok(Self { data })
    }
}

impl TryFrom<Array3<i64>> for CoincidenceEvents {
    type Error = Error;

    fn try_from(data: Array3<i64>) -> Result<Self> {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CoincidenceEvents {
        CoincidenceEvents::from_records(&[
            CoincidenceRecord::new(Hit::new(10, 20, 1000), Hit::new(110, 120, 1050)),
            CoincidenceRecord::new(Hit::new(11, 21, 2000), Hit::new(111, 121, 1900)),
            CoincidenceRecord::new(Hit::new(12, 22, 3000), Hit::new(112, 122, 3000)),
        ])
    }

    #[test]
    fn test_rejects_bad_shape() {
        let err = CoincidenceEvents::new(Array3::zeros((3, 3, 4))).unwrap_err();
        assert!(matches!(err, Error::InvalidShape { .. }));
        assert!(CoincidenceEvents::new(Array3::zeros((2, 2, 4))).is_err());
        assert!(CoincidenceEvents::new(Array3::zeros((2, 3, 0))).is_ok());
    }

    #[test]
    fn test_layout_and_fields() {
        let events = sample();
        assert_eq!(events.as_array().shape(), &[2, 3, 3]);
        assert_eq!(events.field(Channel::Idler, Field::X).to_vec(), vec![10, 11, 12]);
        assert_eq!(events.field(Channel::Signal, Field::Y).to_vec(), vec![120, 121, 122]);
        assert_eq!(events.time_differences().to_vec(), vec![50, -100, 0]);
        assert_eq!(events.range(Channel::Signal, Field::X), Some((110, 112)));
        assert_eq!(CoincidenceEvents::empty().range(Channel::Idler, Field::T), None);
    }

    #[test]
    fn test_record_access() {
        let events = sample();
        let rec = events.record(1).unwrap();
        assert_eq!(rec.idler, Hit::new(11, 21, 2000));
        assert_eq!(rec.dt(), -100);
        assert!(events.record(3).is_none());
        assert_eq!(events.records().count(), 3);
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let events = CoincidenceEvents::from_records(&[
            CoincidenceRecord::new(Hit::new(0, 0, i64::MIN), Hit::new(0, 0, i64::MAX)),
            CoincidenceRecord::new(Hit::new(0, 0, i64::MAX), Hit::new(0, 0, i64::MIN)),
        ]);
        assert_eq!(events.time_differences().to_vec(), vec![i64::MAX, i64::MIN]);
        assert_eq!(events.record(0).unwrap().dt(), i64::MAX);
        assert_eq!(events.record(1).unwrap().dt(), i64::MIN);
    }

    #[test]
    fn test_select_preserves_order() {
        let events = sample();
        let kept = events.select(&[true, false, true]).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.field(Channel::Idler, Field::T).to_vec(), vec![1000, 3000]);

        let none = events.select(&[false, false, false]).unwrap();
        assert!(none.is_empty());
        assert_eq!(none.as_array().shape(), &[2, 3, 0]);

        assert!(matches!(
            events.select(&[true]),
            Err(Error::MaskLength { mask: 1, records: 3 })
        ));
    }
}
