//! Predicate-wait mechanism (spec module C).
//!
//! `State<T>` is a pure reducer: [`State::set_value`] and [`State::trigger`]
//! never touch the Clock or a component's lifecycle directly. They return
//! the waiters whose predicate now holds as a plain `Vec<HonorResult>`; the
//! Environment is the one place that turns a honor result into an actual
//! reschedule, mirroring how `Resource` honoring works (see `resource.rs`)
//! and the cursorium `EngineState::apply_event` pure-reducer style.

use crate::component::ComponentId;
use crate::error::{SimError, SimResult};
use crate::time::TickTime;

/// Combinator for a waiter's list of predicate clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllOrAny {
	All,
	Any,
}

struct Waiter<T> {
	component: ComponentId,
	clauses: Vec<Box<dyn Fn(&T) -> bool>>,
	all_or_any: AllOrAny,
	priority: i32,
	fail_at: Option<TickTime>,
}

impl<T> Waiter<T> {
	fn satisfied(&self, value: &T) -> bool {
		match self.all_or_any {
			AllOrAny::All => self.clauses.iter().all(|p| p(value)),
			AllOrAny::Any => self.clauses.iter().any(|p| p(value)),
		}
	}
}

/// A waiter whose predicate now holds (or timed out) and must be rescheduled
/// by the Environment.
#[derive(Debug, Clone, Copy)]
pub struct HonorResult {
	pub component: ComponentId,
	pub priority: i32,
	pub failed: bool,
}

pub struct State<T> {
	enabled: bool,
	value: T,
	waiters: Vec<Waiter<T>>,
}

impl<T: Clone> State<T> {
	pub fn new(initial: T) -> Self {
		Self {
			enabled: true,
			value: initial,
			waiters: Vec::new(),
		}
	}

	pub fn disable(&mut self) {
		self.enabled = false;
	}

	pub fn enable(&mut self) {
		self.enabled = true;
	}

	/// # Errors
	/// [`SimError::Unavailable`] if disabled.
	pub fn get(&self) -> SimResult<T> {
		if !self.enabled {
			return Err(SimError::Unavailable("state is disabled".into()));
		}
		Ok(self.value.clone())
	}

	/// Register `component` to be honored once `clauses` are satisfied
	/// (per `all_or_any`), or to fail at `fail_at` if given. If the
	/// predicate already holds, returns a honor result immediately instead
	/// of queuing a waiter.
	pub fn wait(&mut self, component: ComponentId, clauses: Vec<Box<dyn Fn(&T) -> bool>>, all_or_any: AllOrAny, priority: i32, fail_at: Option<TickTime>) -> Option<HonorResult> {
		let waiter = Waiter {
			component,
			clauses,
			all_or_any,
			priority,
			fail_at,
		};
		if waiter.satisfied(&self.value) {
			return Some(HonorResult {
				component: waiter.component,
				priority: waiter.priority,
				failed: false,
			});
		}
		self.waiters.push(waiter);
		None
	}

	/// Drop a waiter (explicit cancel, or the component was forced out of
	/// WAITING by another transition) without honoring it.
	pub fn remove_waiter(&mut self, component: ComponentId) {
		self.waiters.retain(|w| w.component != component);
	}

	/// Called by the Environment when a waiter's `fail_at` timer fires.
	/// Removes the waiter and returns its honor result with `failed = true`.
	pub fn fail_waiter(&mut self, component: ComponentId) -> Option<HonorResult> {
		let idx = self.waiters.iter().position(|w| w.component == component)?;
		let w = self.waiters.remove(idx);
		Some(HonorResult { component: w.component, priority: w.priority, failed: true })
	}

	/// Assign a new value and re-evaluate every waiter, in FIFO order.
	/// Returns the waiters that now hold, removed from the waiter list.
	pub fn set_value(&mut self, value: T) -> Vec<HonorResult> {
		self.value = value;
		let mut honored = Vec::new();
		self.waiters.retain(|w| {
			if w.satisfied(&self.value) {
				honored.push(HonorResult {
					component: w.component,
					priority: w.priority,
					failed: false,
				});
				false
			} else {
				true
			}
		});
		honored
	}

	/// Set `value`, honor up to `max` waiters (FIFO order among the
	/// satisfied), then revert to the prior value within the same tick.
	/// Every currently-registered waiter observes `value` as the current
	/// state at the instant of evaluation, but the final resting value is
	/// the one the state held before the trigger.
	pub fn trigger(&mut self, value: T, max: usize) -> Vec<HonorResult> {
		let prior = self.value.clone();
		self.value = value;
		let mut honored = Vec::new();
		self.waiters.retain(|w| {
			if honored.len() < max && w.satisfied(&self.value) {
				honored.push(HonorResult {
					component: w.component,
					priority: w.priority,
					failed: false,
				});
				false
			} else {
				true
			}
		});
		self.value = prior;
		honored
	}

	#[must_use]
	pub fn waiter_count(&self) -> usize {
		self.waiters.len()
	}
}
