//! Categorical monitors and timelines (spec §3, §4.2).
//!
//! Companions to [`super::stat::NumericStatisticMonitor`] and
//! [`super::timeline::Timeline`] for values that are labels rather than
//! numbers — lifecycle states, queue names, resource tags.

use crate::error::{SimError, SimResult};
use crate::time::TickTime;
use std::collections::HashMap;
use std::hash::Hash;

/// Frequency counter over discrete categories.
#[derive(Debug, Clone)]
pub struct CategoryMonitor<T: Eq + Hash + Clone> {
	enabled: bool,
	counts: HashMap<T, u64>,
}

impl<T: Eq + Hash + Clone> Default for CategoryMonitor<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Eq + Hash + Clone> CategoryMonitor<T> {
	#[must_use]
	pub fn new() -> Self {
		Self {
			enabled: true,
			counts: HashMap::new(),
		}
	}

	pub fn disable(&mut self) {
		self.enabled = false;
	}

	pub fn enable(&mut self) {
		self.enabled = true;
	}

	pub fn add_value(&mut self, value: T) {
		if !self.enabled {
			return;
		}
		*self.counts.entry(value).or_insert(0) += 1;
	}

	/// # Errors
	/// [`SimError::Unavailable`] if disabled.
	pub fn counts(&self) -> SimResult<&HashMap<T, u64>> {
		if !self.enabled {
			return Err(SimError::Unavailable("monitor is disabled".into()));
		}
		Ok(&self.counts)
	}

	#[must_use]
	pub fn total(&self) -> u64 {
		self.counts.values().sum()
	}
}

/// Piecewise-constant categorical signal, analogous to [`super::timeline::Timeline`]
/// but tracking a label instead of a number.
#[derive(Debug, Clone)]
pub struct CategoryTimeline<T: Eq + Hash + Clone> {
	enabled: bool,
	breakpoints: Vec<(TickTime, T)>,
}

impl<T: Eq + Hash + Clone> CategoryTimeline<T> {
	pub fn new(now: TickTime, initial: T) -> Self {
		Self {
			enabled: true,
			breakpoints: vec![(now, initial)],
		}
	}

	pub fn disable(&mut self) {
		self.enabled = false;
	}

	pub fn enable(&mut self) {
		self.enabled = true;
	}

	/// # Errors
	/// [`SimError::DomainError`] if `now` precedes the last recorded timestamp.
	pub fn add_value(&mut self, now: TickTime, value: T) -> SimResult<()> {
		if !self.enabled {
			return Ok(());
		}
		let last_time = self.breakpoints.last().expect("always has the creation sample").0;
		if now < last_time {
			return Err(SimError::DomainError(format!("timeline write at {now} precedes last sample at {last_time}")));
		}
		if now == last_time {
			self.breakpoints.last_mut().unwrap().1 = value;
		} else {
			self.breakpoints.push((now, value));
		}
		Ok(())
	}

	#[must_use]
	pub fn first_timestamp(&self) -> TickTime {
		self.breakpoints[0].0
	}

	/// Fraction of `[first_timestamp, now]` spent in each category.
	///
	/// # Errors
	/// [`SimError::Unavailable`] if disabled, [`SimError::DomainError`] if
	/// `now` precedes the first sample.
	pub fn proportions(&self, now: TickTime) -> SimResult<HashMap<T, f64>> {
		if !self.enabled {
			return Err(SimError::Unavailable("timeline is disabled".into()));
		}
		if now < self.first_timestamp() {
			return Err(SimError::DomainError(format!("query at {now} precedes first sample at {}", self.first_timestamp())));
		}

		let mut durations: HashMap<T, f64> = HashMap::new();
		let mut total = 0.0_f64;
		for (i, (t0, v)) in self.breakpoints.iter().enumerate() {
			let t1 = self.breakpoints.get(i + 1).map_or(now.max(*t0), |(next_t, _)| *next_t);
			let duration = t1 - *t0;
			*durations.entry(v.clone()).or_insert(0.0) += duration;
			total += duration;
		}
		if total > 0.0 {
			for v in durations.values_mut() {
				*v /= total;
			}
		}
		Ok(durations)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn category_monitor_counts_occurrences() {
		let mut mon = CategoryMonitor::new();
		mon.add_value("busy");
		mon.add_value("idle");
		mon.add_value("busy");
		let counts = mon.counts().unwrap();
		assert_eq!(counts["busy"], 2);
		assert_eq!(counts["idle"], 1);
		assert_eq!(mon.total(), 3);
	}

	#[test]
	fn category_timeline_proportions_sum_to_one() {
		let mut tl = CategoryTimeline::new(TickTime::ZERO, "idle");
		tl.add_value(TickTime::new(2.0), "busy").unwrap();
		tl.add_value(TickTime::new(8.0), "idle").unwrap();
		let props = tl.proportions(TickTime::new(10.0)).unwrap();
		assert_relative_eq!(props["idle"], 0.8, epsilon = 1e-9);
		assert_relative_eq!(props["busy"], 0.2, epsilon = 1e-9);
	}

	#[test]
	fn rejects_out_of_order_write() {
		let mut tl = CategoryTimeline::new(TickTime::new(5.0), "a");
		assert!(tl.add_value(TickTime::new(1.0), "b").is_err());
	}
}
