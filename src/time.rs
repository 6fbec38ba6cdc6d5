//! Simulated time: a monotonically non-decreasing tick count.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Sub};

/// A point (or duration) in simulated time.
///
/// Backed by `f64` per spec: the engine must not assume integer ticks.
/// `NaN` is never produced by any public constructor, so `TickTime` can
/// soundly implement `Eq`/`Ord` (unlike bare `f64`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TickTime(f64);

impl TickTime {
	pub const ZERO: TickTime = TickTime(0.0);

	/// # Panics
	/// Panics if `value` is NaN — every caller in this crate derives ticks
	/// from arithmetic on prior `TickTime`s or validated deltas, so a NaN
	/// here means a bug upstream, not a recoverable runtime condition.
	#[must_use]
	pub fn new(value: f64) -> Self {
		assert!(!value.is_nan(), "TickTime must not be NaN");
		Self(value)
	}

	#[must_use]
	pub const fn as_f64(self) -> f64 {
		self.0
	}

	/// Advance by a non-negative delta.
	///
	/// # Errors
	/// Returns [`SimError::InvalidTransition`] if `delta` is negative.
	pub fn advance(self, delta: f64) -> Result<Self, SimError> {
		if delta < 0.0 {
			return Err(SimError::InvalidTransition(format!("negative time delta: {delta}")));
		}
		Ok(Self(self.0 + delta))
	}
}

impl Eq for TickTime {}

impl Ord for TickTime {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.partial_cmp(&other.0).expect("TickTime values are never NaN")
	}
}

impl Default for TickTime {
	fn default() -> Self {
		Self::ZERO
	}
}

impl Add<f64> for TickTime {
	type Output = TickTime;
	fn add(self, rhs: f64) -> TickTime {
		TickTime(self.0 + rhs)
	}
}

impl Sub<TickTime> for TickTime {
	type Output = f64;
	fn sub(self, rhs: TickTime) -> f64 {
		self.0 - rhs.0
	}
}

impl AddAssign<f64> for TickTime {
	fn add_assign(&mut self, rhs: f64) {
		self.0 += rhs;
	}
}

impl std::fmt::Display for TickTime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:.6}", self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn advance_rejects_negative_delta() {
		let t = TickTime::new(5.0);
		assert!(t.advance(-1.0).is_err());
		assert_eq!(t.advance(2.0).unwrap(), TickTime::new(7.0));
	}

	#[test]
	fn ordering_matches_f64() {
		let mut ts = vec![TickTime::new(3.0), TickTime::new(1.0), TickTime::new(2.0)];
		ts.sort();
		assert_eq!(ts, vec![TickTime::new(1.0), TickTime::new(2.0), TickTime::new(3.0)]);
	}
}
