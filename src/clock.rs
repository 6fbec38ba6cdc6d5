//! Future-event queue (spec §4.1).
//!
//! Generalizes the binary-heap `sift_up`/`sift_down` discipline from
//! `ImplicitHeap` (see DESIGN.md) to `std::collections::BinaryHeap`, keyed on
//! `(time, -priority, sequence)` instead of a bare priority. Arbitrary
//! removal (`cancel`) is handled by lazy tombstoning: a live binary heap has
//! no O(log n) remove-by-key without an auxiliary position index, and
//! tombstone-on-pop is the standard middle ground for event queues that need
//! occasional cancellation but mostly insert/pop-min traffic.

use crate::component::ComponentId;
use crate::error::SimError;
use crate::time::TickTime;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

/// A name for an alternate process entry point, used by `activate(process, ...)`.
pub type ProcessEntry = String;

/// Opaque reference to a pending scheduled event, usable with [`Clock::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

#[derive(Debug, Clone)]
pub struct Event {
	pub time: TickTime,
	pub sequence: u64,
	pub priority: i32,
	pub component: ComponentId,
	pub process_entry: Option<ProcessEntry>,
}

impl Event {
	fn handle(&self) -> EventHandle {
		EventHandle(self.sequence)
	}
}

impl PartialEq for Event {
	fn eq(&self, other: &Self) -> bool {
		self.time == other.time && self.priority == other.priority && self.sequence == other.sequence
	}
}
impl Eq for Event {}

impl PartialOrd for Event {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Event {
	/// Time ascending, then priority descending (higher priority first),
	/// then sequence ascending (FIFO among equals).
	fn cmp(&self, other: &Self) -> Ordering {
		self.time.cmp(&other.time).then_with(|| other.priority.cmp(&self.priority)).then_with(|| self.sequence.cmp(&other.sequence))
	}
}

/// The priority-ordered future-event queue plus the simulation clock itself.
///
/// `now` only ever moves forward, and only on [`Clock::pop`].
pub struct Clock {
	heap: BinaryHeap<Reverse<Event>>,
	cancelled: HashSet<u64>,
	next_sequence: u64,
	now: TickTime,
}

impl Default for Clock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock {
	#[must_use]
	pub fn new() -> Self {
		Self {
			heap: BinaryHeap::new(),
			cancelled: HashSet::new(),
			next_sequence: 0,
			now: TickTime::ZERO,
		}
	}

	#[must_use]
	pub const fn now(&self) -> TickTime {
		self.now
	}

	/// Insert an event. `at` must not precede `now`.
	///
	/// # Errors
	/// Returns [`SimError::InvalidTransition`] if `at < now`.
	pub fn schedule(&mut self, component: ComponentId, at: TickTime, priority: i32, process_entry: Option<ProcessEntry>) -> Result<EventHandle, SimError> {
		if at < self.now {
			return Err(SimError::InvalidTransition(format!("cannot schedule at {at} before now ({})", self.now)));
		}
		let sequence = self.next_sequence;
		self.next_sequence += 1;
		let event = Event {
			time: at,
			sequence,
			priority,
			component,
			process_entry,
		};
		let handle = event.handle();
		self.heap.push(Reverse(event));
		Ok(handle)
	}

	/// Idempotent: cancelling an already-popped or already-cancelled handle is a no-op.
	pub fn cancel(&mut self, handle: EventHandle) {
		self.cancelled.insert(handle.0);
	}

	fn purge_cancelled(&mut self) {
		while let Some(Reverse(top)) = self.heap.peek() {
			if self.cancelled.remove(&top.sequence) {
				self.heap.pop();
			} else {
				break;
			}
		}
	}

	/// Lowest-ordered event without removing it. Does not advance `now`.
	pub fn peek(&mut self) -> Option<Event> {
		self.purge_cancelled();
		self.heap.peek().map(|Reverse(e)| e.clone())
	}

	/// Remove and return the lowest-ordered event, advancing `now` to its time.
	pub fn pop(&mut self) -> Option<Event> {
		self.purge_cancelled();
		let Reverse(event) = self.heap.pop()?;
		self.now = event.time;
		Some(event)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.heap.len() <= self.cancelled.len()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.heap.len().saturating_sub(self.cancelled.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cid(n: usize) -> ComponentId {
		ComponentId::for_test(n)
	}

	#[test]
	fn pop_orders_by_time_then_priority_then_fifo() {
		let mut clock = Clock::new();
		clock.schedule(cid(1), TickTime::new(5.0), 0, None).unwrap();
		clock.schedule(cid(2), TickTime::new(1.0), 0, None).unwrap();
		clock.schedule(cid(3), TickTime::new(1.0), 5, None).unwrap();
		clock.schedule(cid(4), TickTime::new(1.0), 0, None).unwrap();

		// t=1, prio 5 (component 3) fires first among t=1 events.
		assert_eq!(clock.pop().unwrap().component, cid(3));
		// then FIFO among the remaining t=1, prio 0 events: component 2 before 4.
        assert_eq!(clock.pop().unwrap().component, cid(2));
        assert_eq!(clock.pop().unwrap().component, cid(4));
		// finally t=5.
		assert_eq!(clock.pop().unwrap().component, cid(1));
		assert!(clock.pop().is_none());
	}

	#[test]
	fn now_advances_only_on_pop() {
		let mut clock = Clock::new();
		clock.schedule(cid(1), TickTime::new(10.0), 0, None).unwrap();
		assert_eq!(clock.now(), TickTime::ZERO);
		clock.peek();
		assert_eq!(clock.now(), TickTime::ZERO);
		clock.pop();
		assert_eq!(clock.now(), TickTime::new(10.0));
	}

	#[test]
	fn cancel_is_idempotent_and_skips_event() {
		let mut clock = Clock::new();
		let h = clock.schedule(cid(1), TickTime::new(1.0), 0, None).unwrap();
		clock.schedule(cid(2), TickTime::new(2.0), 0, None).unwrap();
		clock.cancel(h);
		clock.cancel(h);
		assert_eq!(clock.pop().unwrap().component, cid(2));
		assert!(clock.pop().is_none());
	}

	#[test]
	fn rejects_scheduling_in_the_past() {
		let mut clock = Clock::new();
		clock.schedule(cid(1), TickTime::new(5.0), 0, None).unwrap();
		clock.pop();
		assert!(clock.schedule(cid(2), TickTime::new(4.0), 0, None).is_err());
	}
}
