//! Beam regions of interest.
//!
//! A beam is a rectangle in pixel space selected on the preview scatter view.
//! The detector toolkit uses beams to decide which hits take part in
//! coincidence building.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rectangular region `left..=right` by `bottom..=top` in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Beam {
    /// Lowest column.
    pub left: i64,
    /// Lowest row.
    pub bottom: i64,
    /// Highest column.
    pub right: i64,
    /// Highest row.
    pub top: i64,
}

impl Beam {
    /// Creates a beam from explicit edges.
    #[must_use]
    pub fn new(left: i64, bottom: i64, right: i64, top: i64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Creates a beam from two opposite corners in any order.
    #[must_use]
    pub fn from_corners(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            left: x1.min(x2),
            bottom: y1.min(y2),
            right: x1.max(x2),
            top: y1.max(y2),
        }
    }

    /// Checks whether a pixel lies inside the beam (edges inclusive).
    #[inline]
    #[must_use]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        (self.left..=self.right).contains(&x) && (self.bottom..=self.top).contains(&y)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> i64 {
        self.top - self.bottom
    }

    /// A zero-sized beam at the origin marks "nothing selected".
    #[must_use]
    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.bottom, self.right, self.top)
    }
}

impl FromStr for Beam {
    type Err = Error;

    /// Parses four integers separated by commas or whitespace, optionally
    /// wrapped in brackets or parentheses.
    #[allow(clippy::cast_possible_truncation)]
    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .trim()
            .trim_start_matches(['(', '['])
            .trim_end_matches([')', ']']);
        let values = inner
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| Error::ConfigError(format!("invalid beam coordinate '{part}'")))
            })
            .collect::<Result<Vec<f64>>>()?;

        match values.as_slice() {
            [l, b, r, t] => Ok(Self::new(
                l.round() as i64,
                b.round() as i64,
                r.round() as i64,
                t.round() as i64,
            )),
            _ => Err(Error::ConfigError(format!(
                "beam needs 4 coordinates, got '{s}'"
            ))),
        }
    }
}

/// Beams chosen for each channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BeamSelection {
    /// Regions used for the idler channel.
    pub idler: Vec<Beam>,
    /// Regions used for the signal channel.
    pub signal: Vec<Beam>,
}

impl BeamSelection {
    /// Returns true once both channels have at least one beam.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.idler.is_empty() && !self.signal.is_empty()
    }

    /// Forgets all beams.
    pub fn clear(&mut self) {
        self.idler.clear();
        self.signal.clear();
    }
}
