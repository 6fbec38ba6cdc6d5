//! Running numeric statistics (spec §3, §4.2).
//!
//! Mean/variance are tracked with Welford's online algorithm so that long
//! simulations never replay raw samples and never suffer the catastrophic
//! cancellation a naive `sum_of_squares - n*mean^2` accumulation would.
//! [`NumericStatisticMonitor::merge`] combines two monitors' running moments
//! directly (Chan et al.'s parallel variance formula) rather than
//! concatenating and replaying samples.

use crate::error::{SimError, SimResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NumericStatistics {
	pub count: u64,
	pub mean: f64,
	pub variance: f64,
	pub std_dev: f64,
	pub min: f64,
	pub max: f64,
}

#[derive(Debug, Clone)]
pub struct NumericStatisticMonitor {
	enabled: bool,
	count: u64,
	mean: f64,
	m2: f64,
	min: f64,
	max: f64,
}

impl Default for NumericStatisticMonitor {
	fn default() -> Self {
		Self::new()
	}
}

impl NumericStatisticMonitor {
	#[must_use]
	pub fn new() -> Self {
		Self {
			enabled: true,
			count: 0,
			mean: 0.0,
			m2: 0.0,
			min: f64::INFINITY,
			max: f64::NEG_INFINITY,
		}
	}

	pub fn disable(&mut self) {
		self.enabled = false;
	}

	pub fn enable(&mut self) {
		self.enabled = true;
	}

	#[must_use]
	pub const fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Record a sample. Dropped silently when disabled.
	pub fn add_value(&mut self, value: f64) {
		if !self.enabled {
			return;
		}
		self.count += 1;
		let delta = value - self.mean;
		self.mean += delta / self.count as f64;
		let delta2 = value - self.mean;
		self.m2 += delta * delta2;
		self.min = self.min.min(value);
		self.max = self.max.max(value);
	}

	#[must_use]
	pub const fn count(&self) -> u64 {
		self.count
	}

	/// # Errors
	/// [`SimError::Unavailable`] if disabled or no samples recorded.
	pub fn statistics(&self) -> SimResult<NumericStatistics> {
		if !self.enabled {
			return Err(SimError::Unavailable("monitor is disabled".into()));
		}
		if self.count == 0 {
			return Err(SimError::Unavailable("monitor has no samples".into()));
		}
		let variance = if self.count > 1 { self.m2 / self.count as f64 } else { 0.0 };
		Ok(NumericStatistics {
			count: self.count,
			mean: self.mean,
			variance,
			std_dev: variance.sqrt(),
			min: self.min,
			max: self.max,
		})
	}

	/// Combine several monitors' running moments into one, as if every
	/// sample had been recorded against a single monitor.
	#[must_use]
	pub fn merge(monitors: &[&Self]) -> Self {
		let mut acc = Self::new();
		for m in monitors {
			if m.count == 0 {
				continue;
			}
			if acc.count == 0 {
				acc.count = m.count;
				acc.mean = m.mean;
				acc.m2 = m.m2;
			} else {
				let n_a = acc.count as f64;
				let n_b = m.count as f64;
				let delta = m.mean - acc.mean;
				let total = n_a + n_b;
				acc.mean = (n_a * acc.mean + n_b * m.mean) / total;
				acc.m2 += m.m2 + delta * delta * n_a * n_b / total;
				acc.count += m.count;
			}
			acc.min = acc.min.min(m.min);
			acc.max = acc.max.max(m.max);
		}
		acc
	}
}
