//! Ledger Ranges
//!
//! A [`Range`] describes which ledger sequences a consumer wants to read:
//!
//! - **Bounded** `[from,to]`: retrieval stops after `to`. Every ledger in the
//!   range is expected to exist already.
//! - **Unbounded** `[from,latest)`: retrieval continues indefinitely and waits
//!   for ledgers that have not been published yet.
//!
//! ## Containment
//!
//! A backend prepared for one range can serve any range it contains:
//!
//! ```text
//! [3,latest)  contains  [5,latest), [3,10], [4,4]
//! [3,10]      contains  [3,10], [4,9]
//! [3,10]      never contains an unbounded range
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Span of ledger sequence numbers to retrieve. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "RangeRepr")]
pub struct Range {
    from: u32,
    to: u32,
    bounded: bool,
}

impl Range {
    /// Closed range `[from,to]`.
    pub fn bounded(from: u32, to: u32) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        Ok(Self {
            from,
            to,
            bounded: true,
        })
    }

    /// Open range `[from,latest)`.
    pub fn unbounded(from: u32) -> Self {
        Self {
            from,
            to: 0,
            bounded: false,
        }
    }

    /// Range holding exactly one ledger.
    pub fn single(sequence: u32) -> Self {
        Self {
            from: sequence,
            to: sequence,
            bounded: true,
        }
    }

    pub fn from(&self) -> u32 {
        self.from
    }

    /// Upper bound, `None` for unbounded ranges.
    pub fn to(&self) -> Option<u32> {
        self.bounded.then_some(self.to)
    }

    pub fn is_bounded(&self) -> bool {
        self.bounded
    }

    /// Whether every sequence of `other` is also in `self`.
    pub fn contains(&self, other: &Range) -> bool {
        if other.from < self.from {
            return false;
        }
        match (self.bounded, other.bounded) {
            (false, _) => true,
            (true, false) => false,
            (true, true) => other.to <= self.to,
        }
    }

    /// Whether `sequence` lies inside the range.
    pub fn includes(&self, sequence: u32) -> bool {
        sequence >= self.from && (!self.bounded || sequence <= self.to)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bounded {
            write!(f, "[{},{}]", self.from, self.to)
        } else {
            write!(f, "[{},latest)", self.from)
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RangeRepr {
    from: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<u32>,
}

impl TryFrom<RangeRepr> for Range {
    type Error = Error;

    fn try_from(repr: RangeRepr) -> Result<Self> {
        match repr.to {
            Some(to) => Range::bounded(repr.from, to),
            None => Ok(Range::unbounded(repr.from)),
        }
    }
}

impl From<Range> for RangeRepr {
    fn from(range: Range) -> Self {
        RangeRepr {
            from: range.from,
            to: range.to(),
        }
    }
}
