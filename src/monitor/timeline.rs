//! Piecewise-constant time-weighted numeric signals (spec §3, §4.2).
//!
//! A `Timeline<V>` always carries an implicit sample at its creation time
//! (the engine's `now` at the moment `Timeline::new` was called) — every
//! scenario in spec §8 that exercises a timeline's weighted mean only makes
//! sense if the pre-first-`add_value` interval contributes its own segment,
//! so construction takes the initial value explicitly rather than leaving
//! the timeline empty until the first write.

use crate::error::{SimError, SimResult};
use crate::time::TickTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimelineStatistics {
	pub mean: f64,
	pub min: f64,
	pub max: f64,
	pub breakpoint_count: usize,
	pub first_timestamp: TickTime,
	pub duration: f64,
}

/// `DoubleTimeline` / `IntTimeline` from spec §3 are both instantiations of
/// this one generic timeline, distinguished only by `V`.
#[derive(Debug, Clone)]
pub struct Timeline<V> {
	enabled: bool,
	breakpoints: Vec<(TickTime, V)>,
}

pub type DoubleTimeline = Timeline<f64>;
pub type IntTimeline = Timeline<i64>;

impl<V: Copy + Into<f64>> Timeline<V> {
	pub fn new(now: TickTime, initial: V) -> Self {
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

	#[must_use]
	pub const fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Append `(now, value)`, coalescing with the previous sample if it
	/// shares the same timestamp. Dropped silently when disabled.
	///
	/// # Errors
	/// [`SimError::DomainError`] if `now` precedes the last recorded timestamp.
	pub fn add_value(&mut self, now: TickTime, value: V) -> SimResult<()> {
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

	#[must_use]
	pub fn breakpoints(&self) -> &[(TickTime, V)] {
		&self.breakpoints
	}

	/// Step-interpolated value at `t` (the value that was current at `t`).
	///
	/// # Errors
	/// [`SimError::Unavailable`] if disabled, [`SimError::DomainError`] if
	/// `t` precedes the first sample.
	pub fn value_at(&self, t: TickTime) -> SimResult<V> {
		if !self.enabled {
			return Err(SimError::Unavailable("timeline is disabled".into()));
		}
		if t < self.first_timestamp() {
			return Err(SimError::DomainError(format!("query at {t} precedes first sample at {}", self.first_timestamp())));
		}
		Ok(self.breakpoints.iter().rev().find(|(bt, _)| *bt <= t).map(|(_, v)| *v).expect("first sample always satisfies bt <= t"))
	}

	/// Time-weighted statistics over `[first_timestamp, now]`. If `now`
	/// exceeds the last sample, the last segment is extended to `now`.
	///
	/// # Errors
	/// [`SimError::Unavailable`] if disabled, [`SimError::DomainError`] if
	/// `now` precedes the first sample.
	pub fn statistics(&self, now: TickTime) -> SimResult<TimelineStatistics> {
		if !self.enabled {
			return Err(SimError::Unavailable("timeline is disabled".into()));
		}
		if now < self.first_timestamp() {
			return Err(SimError::DomainError(format!("query at {now} precedes first sample at {}", self.first_timestamp())));
		}

		let mut weighted_sum = 0.0_f64;
		let mut total_duration = 0.0_f64;
		let mut min = f64::INFINITY;
		let mut max = f64::NEG_INFINITY;

		for (i, &(t0, v)) in self.breakpoints.iter().enumerate() {
			let t1 = self.breakpoints.get(i + 1).map_or(now.max(t0), |(next_t, _)| *next_t);
			let duration = t1 - t0;
			let value: f64 = v.into();
			weighted_sum += value * duration;
			total_duration += duration;
			min = min.min(value);
			max = max.max(value);
		}

		Ok(TimelineStatistics {
			mean: if total_duration > 0.0 { weighted_sum / total_duration } else { self.breakpoints[0].1.into() },
			min,
			max,
			breakpoint_count: self.breakpoints.len(),
			first_timestamp: self.first_timestamp(),
			duration: total_duration,
		})
	}

	/// Segments as `(value, duration)` pairs over `[first_timestamp, now]`,
	/// the building block for [`merge`].
	fn segments(&self, now: TickTime) -> Vec<(f64, f64)> {
		self.breakpoints
			.iter()
			.enumerate()
			.map(|(i, &(t0, v))| {
				let t1 = self.breakpoints.get(i + 1).map_or(now.max(t0), |(next_t, _)| *next_t);
				(v.into(), t1 - t0)
			})
			.collect()
	}
}

fn combine<A, B>(a: &Timeline<A>, b: &Timeline<B>, op: impl Fn(f64, f64) -> f64) -> Timeline<f64>
where
	A: Copy + Into<f64>,
	B: Copy + Into<f64>,
{
	let start = a.first_timestamp().max(b.first_timestamp());
	let mut timestamps: Vec<TickTime> = a.breakpoints().iter().map(|(t, _)| *t).chain(b.breakpoints().iter().map(|(t, _)| *t)).filter(|t| *t >= start).collect();
	timestamps.sort();
	timestamps.dedup();

	let breakpoints = timestamps
		.into_iter()
		.map(|t| {
			let av: f64 = a.value_at(t).expect("t >= start implies t is within both domains").into();
			let bv: f64 = b.value_at(t).expect("t >= start implies t is within both domains").into();
			(t, op(av, bv))
		})
		.collect();

	Timeline { enabled: true, breakpoints }
}

macro_rules! impl_binop {
	($trait:ident, $method:ident, $op:expr) => {
		impl<A, B> std::ops::$trait<&Timeline<B>> for &Timeline<A>
		where
			A: Copy + Into<f64>,
			B: Copy + Into<f64>,
		{
			type Output = Timeline<f64>;
			fn $method(self, rhs: &Timeline<B>) -> Timeline<f64> {
				combine(self, rhs, $op)
			}
		}
	};
}

impl_binop!(Add, add, |a: f64, b: f64| a + b);
impl_binop!(Sub, sub, |a: f64, b: f64| a - b);
impl_binop!(Mul, mul, |a: f64, b: f64| a * b);
impl_binop!(Div, div, |a: f64, b: f64| a / b);

/// One sample of a duration-weighted empirical distribution (see [`merge`]).
#[derive(Debug, Clone, Copy)]
pub struct WeightedSample {
	pub value: f64,
	pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct WeightedDistribution {
	pub samples: Vec<WeightedSample>,
}

impl WeightedDistribution {
	#[must_use]
	pub fn total_weight(&self) -> f64 {
		self.samples.iter().map(|s| s.weight).sum()
	}

	#[must_use]
	pub fn mean(&self) -> f64 {
		let total = self.total_weight();
		if total == 0.0 {
			return 0.0;
		}
		self.samples.iter().map(|s| s.value * s.weight).sum::<f64>() / total
	}
}

/// Merge several timelines into one duration-weighted empirical distribution.
pub fn merge<V: Copy + Into<f64>>(timelines: &[&Timeline<V>], now: TickTime) -> WeightedDistribution {
	let mut samples = Vec::new();
	for tl in timelines {
		for (value, weight) in tl.segments(now) {
			samples.push(WeightedSample { value, weight });
		}
	}
	WeightedDistribution { samples }
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn scenario_weighted_mean() {
		// spec §8 scenario 1
		let mut tl: IntTimeline = Timeline::new(TickTime::ZERO, 0);
		tl.add_value(TickTime::new(2.0), 2).unwrap();
		tl.add_value(TickTime::new(4.0), 6).unwrap();
		let stats = tl.statistics(TickTime::new(8.0)).unwrap();
		assert_relative_eq!(stats.mean, 3.5);
	}

	#[test]
	fn scenario_merged_timelines() {
		// spec §8 scenario 3
		let mut a: IntTimeline = Timeline::new(TickTime::ZERO, 0);
		let mut b: IntTimeline = Timeline::new(TickTime::ZERO, 0);
		a.add_value(TickTime::new(5.0), 23).unwrap();
		b.add_value(TickTime::new(10.0), 3).unwrap();
		b.add_value(TickTime::new(12.0), 5).unwrap();
		a.add_value(TickTime::new(14.0), 10).unwrap();

		let sum = &a + &b;
		let timestamps: Vec<f64> = sum.breakpoints().iter().map(|(t, _)| t.as_f64()).collect();
		let values: Vec<f64> = sum.breakpoints().iter().map(|(_, v)| *v).collect();

		assert_eq!(timestamps, vec![0.0, 5.0, 10.0, 12.0, 14.0]);
		assert_eq!(values, vec![0.0, 23.0, 26.0, 28.0, 15.0]);
	}

	#[test]
	fn add_then_subtract_is_identity() {
		let mut a: DoubleTimeline = Timeline::new(TickTime::ZERO, 1.0);
		let mut b: DoubleTimeline = Timeline::new(TickTime::ZERO, 2.0);
		a.add_value(TickTime::new(3.0), 4.0).unwrap();
		b.add_value(TickTime::new(5.0), 6.0).unwrap();

		let sum = &a + &b;
		let recovered = &sum - &b;
		for (t, v) in recovered.breakpoints() {
			assert_relative_eq!(*v, a.value_at(*t).unwrap(), epsilon = 1e-9);
		}
	}

	#[test]
	fn disabled_timeline_drops_writes_and_fails_reads() {
		let mut tl: DoubleTimeline = Timeline::new(TickTime::ZERO, 0.0);
		tl.disable();
		assert!(tl.add_value(TickTime::new(1.0), 99.0).is_ok());
		assert!(tl.value_at(TickTime::new(1.0)).is_err());
		assert!(tl.statistics(TickTime::new(1.0)).is_err());
	}

	#[test]
	fn query_before_first_sample_is_domain_error() {
		let tl: DoubleTimeline = Timeline::new(TickTime::new(5.0), 1.0);
		assert!(matches!(tl.value_at(TickTime::new(1.0)), Err(SimError::DomainError(_))));
	}

	#[test]
	fn merge_total_matches_sum_of_individual_totals() {
		let mut a: DoubleTimeline = Timeline::new(TickTime::ZERO, 1.0);
		let mut b: DoubleTimeline = Timeline::new(TickTime::ZERO, 2.0);
		a.add_value(TickTime::new(3.0), 4.0).unwrap();
		b.add_value(TickTime::new(2.0), 5.0).unwrap();

		let now = TickTime::new(6.0);
		let merged = merge(&[&a, &b], now);
		let separately: f64 = a.segments(now).iter().map(|(_, w)| w).sum::<f64>() + b.segments(now).iter().map(|(_, w)| w).sum::<f64>();
		assert_relative_eq!(merged.total_weight(), separately, epsilon = 1e-9);
	}
}
