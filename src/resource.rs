//! Counting and depletable resources (spec module D).
//!
//! `Resource` is a pure reducer the same way `State<T>` is: `try_claim`,
//! `release`, and `put` mutate only the resource's own claims/level/queues
//! and return what changed (honored requesters, capacity violations); they
//! never touch the Clock or a `Component`'s lifecycle. The Environment
//! calls these, then applies the result to the component arena.

use crate::component::ComponentId;
use crate::error::{SimError, SimResult};
use crate::monitor::{NumericStatisticMonitor, Timeline};
use crate::time::TickTime;
use smallvec::SmallVec;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
	Counting,
	Depletable,
}

/// Overflow behavior for `put` on a depletable resource once `level` would
/// exceed `capacity` (spec §7, §9 open question resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityMode {
	Fail,
	Cap,
	Schedule,
}

/// How a `ResourceSelectionPolicy` consumer should pick among several
/// candidate resources for a quantity-bearing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSelectionPolicy {
	ShortestQueue,
	RandomAvailable,
	RoundRobin,
	FirstAvailable,
}

/// Pick a candidate index from `capacities`/`queue_lens` per `policy`.
/// `round_robin_cursor` is advanced in place for `RoundRobin`.
pub fn select_resource(policy: ResourceSelectionPolicy, available: &[f64], queue_lens: &[usize], round_robin_cursor: &mut usize, rng_pick: impl FnOnce(usize) -> usize) -> Option<usize> {
	let candidates: Vec<usize> = available.iter().enumerate().filter(|(_, &a)| a > 0.0).map(|(i, _)| i).collect();
	if candidates.is_empty() {
		return None;
	}
	match policy {
		ResourceSelectionPolicy::FirstAvailable => candidates.first().copied(),
		ResourceSelectionPolicy::ShortestQueue => candidates.into_iter().min_by_key(|&i| queue_lens[i]),
		ResourceSelectionPolicy::RandomAvailable => Some(candidates[rng_pick(candidates.len())]),
		ResourceSelectionPolicy::RoundRobin => {
			let start = *round_robin_cursor;
			for offset in 0..available.len() {
				let idx = (start + offset) % available.len();
				if available[idx] > 0.0 {
					*round_robin_cursor = (idx + 1) % available.len();
					return Some(idx);
				}
			}
			None
		}
	}
}

struct QueuedRequest {
	component: ComponentId,
	quantity: f64,
	priority: i32,
	sequence: u64,
	enqueued_at: TickTime,
}

/// A `put` deferred under `CapacityMode::Schedule` because it would have
/// exceeded capacity. Held whole — never applied partially — until enough
/// level has been drawn down that the full quantity fits. FIFO order falls
/// out of push/remove(0) on `scheduled_puts`, same as `requesters`.
struct PendingPut {
	quantity: f64,
}

/// Outcome of a re-honor scan: requesters moved from `requesters` to
/// `claimers`, ready for the Environment to resume as CURRENT/SCHEDULED.
pub struct HonorResult {
	pub component: ComponentId,
	pub priority: i32,
}

pub struct Resource {
	name: String,
	kind: ResourceKind,
	capacity: f64,
	level: f64,
	capacity_mode: CapacityMode,
	claims: HashMap<ComponentId, f64>,
	requesters: SmallVec<[QueuedRequest; 4]>,
	scheduled_puts: SmallVec<[PendingPut; 2]>,
	claimer_started_at: HashMap<ComponentId, TickTime>,
	next_sequence: u64,
	scanning: bool,
	pending_rescan: bool,

	pub claimed_timeline: Timeline<f64>,
	pub capacity_timeline: Timeline<f64>,
	pub availability_timeline: Timeline<f64>,
	pub occupancy_timeline: Timeline<f64>,
	pub level_timeline: Timeline<f64>,
	pub requesters_size_timeline: Timeline<f64>,
	pub claimers_size_timeline: Timeline<f64>,
	pub requester_length_of_stay: NumericStatisticMonitor,
	pub claimer_length_of_stay: NumericStatisticMonitor,
}

impl Resource {
	#[must_use]
	pub fn new_counting(name: impl Into<String>, now: TickTime, capacity: f64) -> Self {
		Self::new(name, now, ResourceKind::Counting, capacity, 0.0, CapacityMode::Fail)
	}

	#[must_use]
	pub fn new_depletable(name: impl Into<String>, now: TickTime, capacity: f64, initial_level: f64, capacity_mode: CapacityMode) -> Self {
		Self::new(name, now, ResourceKind::Depletable, capacity, initial_level, capacity_mode)
	}

	fn new(name: impl Into<String>, now: TickTime, kind: ResourceKind, capacity: f64, initial_level: f64, capacity_mode: CapacityMode) -> Self {
		Self {
			name: name.into(),
			kind,
			capacity,
			level: initial_level,
			capacity_mode,
			claims: HashMap::new(),
			requesters: SmallVec::new(),
			scheduled_puts: SmallVec::new(),
			claimer_started_at: HashMap::new(),
			next_sequence: 0,
			scanning: false,
			pending_rescan: false,
			claimed_timeline: Timeline::new(now, 0.0),
			capacity_timeline: Timeline::new(now, capacity),
			availability_timeline: Timeline::new(now, capacity),
			occupancy_timeline: Timeline::new(now, 0.0),
			level_timeline: Timeline::new(now, initial_level),
			requesters_size_timeline: Timeline::new(now, 0.0),
			claimers_size_timeline: Timeline::new(now, 0.0),
			requester_length_of_stay: NumericStatisticMonitor::new(),
			claimer_length_of_stay: NumericStatisticMonitor::new(),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub const fn kind(&self) -> ResourceKind {
		self.kind
	}

	#[must_use]
	pub const fn capacity(&self) -> f64 {
		self.capacity
	}

	#[must_use]
	pub const fn level(&self) -> f64 {
		self.level
	}

	#[must_use]
	pub fn claimed(&self) -> f64 {
		self.claims.values().sum()
	}

	#[must_use]
	pub fn available(&self) -> f64 {
		match self.kind {
			ResourceKind::Counting => self.capacity - self.claimed(),
			ResourceKind::Depletable => self.level,
		}
	}

	#[must_use]
	pub fn requester_count(&self) -> usize {
		self.requesters.len()
	}

	#[must_use]
	pub fn claimer_count(&self) -> usize {
		self.claimer_started_at.len()
	}

	/// Number of `put`s deferred under `CapacityMode::Schedule`, waiting for
	/// enough level to be consumed that they fit.
	#[must_use]
	pub fn scheduled_put_count(&self) -> usize {
		self.scheduled_puts.len()
	}

	fn record_timelines(&mut self, now: TickTime) {
		let claimed = self.claimed();
		let _ = self.claimed_timeline.add_value(now, claimed);
		let _ = self.capacity_timeline.add_value(now, self.capacity);
		let _ = self.availability_timeline.add_value(now, self.capacity - claimed);
		let occupancy = if self.capacity > 0.0 { claimed / self.capacity } else { 0.0 };
		let _ = self.occupancy_timeline.add_value(now, occupancy);
		let _ = self.level_timeline.add_value(now, self.level);
		let _ = self.requesters_size_timeline.add_value(now, self.requesters.len() as f64);
		let _ = self.claimers_size_timeline.add_value(now, self.claimer_started_at.len() as f64);
	}

	fn honorable(&self, quantity: f64) -> bool {
		match self.kind {
			ResourceKind::Counting => self.claimed() + quantity <= self.capacity,
			ResourceKind::Depletable => self.level >= quantity,
		}
	}

	/// Non-mutating honorability check, used by callers that must verify
	/// several resources are *simultaneously* satisfiable (spec's
	/// multi-resource `request` equivalence rule) before committing any.
	#[must_use]
	pub fn can_claim(&self, quantity: f64) -> bool {
		self.honorable(quantity)
	}

	/// Commit a claim known (by the caller) to be honorable right now,
	/// without the usual honorability check — used once a multi-resource
	/// request has already verified every resource via `can_claim`.
	pub fn force_claim(&mut self, now: TickTime, component: ComponentId, quantity: f64) {
		self.commit_claim(now, component, quantity);
	}

	/// Enqueue `component` as a requester without attempting to honor it —
	/// used for the branch of a multi-resource request where at least one
	/// listed resource is not currently satisfiable, so none may commit.
	pub fn enqueue_requester(&mut self, now: TickTime, component: ComponentId, quantity: f64, priority: i32) {
		let sequence = self.next_sequence;
		self.next_sequence += 1;
		let index = self.requesters.iter().position(|r| r.priority < priority).unwrap_or(self.requesters.len());
		self.requesters.insert(
			index,
			QueuedRequest {
				component,
				quantity,
				priority,
				sequence,
				enqueued_at: now,
			},
		);
		self.record_timelines(now);
	}

	fn commit_claim(&mut self, now: TickTime, component: ComponentId, quantity: f64) {
		match self.kind {
			ResourceKind::Counting => {
				*self.claims.entry(component).or_insert(0.0) += quantity;
				self.claimer_started_at.entry(component).or_insert(now);
			}
			ResourceKind::Depletable => {
				self.level -= quantity;
				self.drain_scheduled_puts();
			}
		}
		self.record_timelines(now);
	}

	/// Apply any `Schedule`-mode puts that now fit in full, in FIFO order.
	/// A queued put is never applied partially, so this stops at the first
	/// one that still doesn't fit.
	fn drain_scheduled_puts(&mut self) {
		loop {
			let Some(front) = self.scheduled_puts.first() else { break };
			if self.level + front.quantity > self.capacity {
				break;
			}
			let pending = self.scheduled_puts.remove(0);
			self.level += pending.quantity;
		}
	}

	/// Attempt to claim `quantity` immediately, without queuing. Returns
	/// `true` and commits the claim iff honorable right now.
	///
	/// # Errors
	/// [`SimError::DomainError`] for a negative or non-finite quantity.
	pub fn try_claim(&mut self, now: TickTime, component: ComponentId, quantity: f64, priority: i32) -> SimResult<bool> {
		if quantity < 0.0 || !quantity.is_finite() {
			return Err(SimError::DomainError(format!("invalid claim quantity {quantity}")));
		}
		if self.honorable(quantity) {
			self.commit_claim(now, component, quantity);
			Ok(true)
		} else {
			let sequence = self.next_sequence;
			self.next_sequence += 1;
			let index = self.requesters.iter().position(|r| r.priority < priority).unwrap_or(self.requesters.len());
			self.requesters.insert(
				index,
				QueuedRequest {
					component,
					quantity,
					priority,
					sequence,
					enqueued_at: now,
				},
			);
			self.record_timelines(now);
			Ok(false)
		}
	}

	/// Remove a queued requester without honoring it (cancel, timeout,
	/// forced transition).
	pub fn remove_requester(&mut self, now: TickTime, component: ComponentId) {
		if let Some(pos) = self.requesters.iter().position(|r| r.component == component) {
			let req = self.requesters.remove(pos);
			self.requester_length_of_stay.add_value(now - req.enqueued_at);
			self.record_timelines(now);
		}
	}

	/// Reduce (or clear, if `quantity` is `None`) a component's claim, then
	/// re-honor the requester queue.
	pub fn release(&mut self, now: TickTime, component: ComponentId, quantity: Option<f64>) -> Vec<HonorResult> {
		if self.kind == ResourceKind::Counting {
			if let Some(claimed) = self.claims.get_mut(&component) {
				let released = quantity.unwrap_or(*claimed);
				*claimed -= released;
				if *claimed <= 0.0 {
					self.claims.remove(&component);
					if let Some(started) = self.claimer_started_at.remove(&component) {
						self.claimer_length_of_stay.add_value(now - started);
					}
				}
			}
		}
		self.record_timelines(now);
		self.rehonor(now)
	}

	/// Increase `level` (depletable only) by `quantity`, subject to
	/// `capacity_mode` when it would exceed capacity.
	///
	/// Under `CapacityMode::Schedule`, an overflowing put is deferred whole
	/// rather than truncated: it is queued and applied in full, FIFO, once
	/// enough level has been consumed that it fits (see
	/// `scheduled_put_count`/`drain_scheduled_puts`).
	///
	/// # Errors
	/// [`SimError::DomainError`] for a negative or non-finite quantity.
	/// [`SimError::CapacityViolation`] under `CapacityMode::Fail`.
	pub fn put(&mut self, now: TickTime, quantity: f64) -> SimResult<Vec<HonorResult>> {
		debug_assert_eq!(self.kind, ResourceKind::Depletable, "put is only meaningful on depletable resources");
		if quantity < 0.0 || !quantity.is_finite() {
			return Err(SimError::DomainError(format!("invalid put quantity {quantity}")));
		}
		let target = self.level + quantity;
		if target > self.capacity {
			match self.capacity_mode {
				CapacityMode::Fail => return Err(SimError::CapacityViolation(format!("put({quantity}) would exceed capacity {}", self.capacity))),
				CapacityMode::Cap => self.level = self.capacity,
				CapacityMode::Schedule => {
					self.scheduled_puts.push(PendingPut { quantity });
					self.record_timelines(now);
					return Ok(Vec::new());
				}
			}
		} else {
			self.level = target;
		}
		self.record_timelines(now);
		Ok(self.rehonor(now))
	}

	/// Change `capacity` at runtime (spec §4.4). A larger capacity may let
	/// queued `Schedule`-mode puts fit and, for counting resources, may let
	/// queued requesters be honored; both are applied here before returning.
	///
	/// # Errors
	/// [`SimError::DomainError`] if `capacity` is negative/non-finite.
	/// [`SimError::CapacityViolation`] if it would drop below what's already
	/// committed (`claimed(r)` for counting, `level` for depletable), which
	/// would violate `0 <= claimed(r) <= capacity(r)` / `level <= capacity`.
	pub fn set_capacity(&mut self, now: TickTime, capacity: f64) -> SimResult<Vec<HonorResult>> {
		if capacity < 0.0 || !capacity.is_finite() {
			return Err(SimError::DomainError(format!("invalid capacity {capacity}")));
		}
		let floor = match self.kind {
			ResourceKind::Counting => self.claimed(),
			ResourceKind::Depletable => self.level,
		};
		if capacity < floor {
			return Err(SimError::CapacityViolation(format!("capacity {capacity} would drop below already-committed {floor}")));
		}
		self.capacity = capacity;
		self.drain_scheduled_puts();
		self.record_timelines(now);
		Ok(self.rehonor(now))
	}

	/// Scan the requester queue from the head, honoring each request that
	/// is fully satisfiable, stopping at the first that is not (strict FIFO
	/// at equal priority — no skip-ahead). Guarded against reentrancy: a
	/// `release` that happens while a scan is already running (as part of
	/// honoring a prior requester's continuation) just marks a pending
	/// rescan instead of recursing.
	fn rehonor(&mut self, now: TickTime) -> Vec<HonorResult> {
		if self.scanning {
			self.pending_rescan = true;
			return Vec::new();
		}
		self.scanning = true;
		let mut honored = Vec::new();
		loop {
			let Some(req) = self.requesters.first() else { break };
			if !self.honorable(req.quantity) {
				break;
			}
			let req = self.requesters.remove(0);
			self.requester_length_of_stay.add_value(now - req.enqueued_at);
			self.commit_claim(now, req.component, req.quantity);
			honored.push(HonorResult {
				component: req.component,
				priority: req.priority,
			});
		}
		self.scanning = false;
		if self.pending_rescan {
			self.pending_rescan = false;
			honored.extend(self.rehonor(now));
		}
		honored
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cid(n: usize) -> ComponentId {
		ComponentId::for_test(n)
	}

	#[test]
	fn scenario_priority_fifo_honoring() {
		// spec §8 scenario 4
		let mut r = Resource::new_counting("pump", TickTime::ZERO, 1.0);
		assert!(r.try_claim(TickTime::ZERO, cid(1), 1.0, 0).unwrap());
		assert!(!r.try_claim(TickTime::ZERO, cid(2), 1.0, 1).unwrap());
		assert!(!r.try_claim(TickTime::ZERO, cid(3), 1.0, 0).unwrap());

		let honored = r.release(TickTime::new(1.0), cid(1), None);
		assert_eq!(honored.len(), 1);
		assert_eq!(honored[0].component, cid(2));

		let honored = r.release(TickTime::new(2.0), cid(2), None);
		assert_eq!(honored.len(), 1);
		assert_eq!(honored[0].component, cid(3));
	}

	#[test]
	fn counting_claim_invariant_holds() {
		let mut r = Resource::new_counting("r", TickTime::ZERO, 3.0);
		r.try_claim(TickTime::ZERO, cid(1), 2.0, 0).unwrap();
		r.try_claim(TickTime::ZERO, cid(2), 1.0, 0).unwrap();
		assert!((r.claimed() - 3.0).abs() < 1e-9);
		assert!(r.claimed() <= r.capacity());
	}

	#[test]
	fn depletable_request_and_put() {
		let mut r = Resource::new_depletable("tank", TickTime::ZERO, 2000.0, 2000.0, CapacityMode::Fail);
		assert!(r.try_claim(TickTime::ZERO, cid(1), 40.0, 0).unwrap());
		assert!((r.level() - 1960.0).abs() < 1e-9);
		r.put(TickTime::new(1.0), 40.0).unwrap();
        assert!((r.level() - 2000.0).abs() < 1e-9);
	}

	#[test]
	fn put_under_fail_mode_errors_on_overflow() {
		let mut r = Resource::new_depletable("tank", TickTime::ZERO, 100.0, 100.0, CapacityMode::Fail);
		assert!(r.put(TickTime::new(1.0), 1.0).is_err());
	}

	#[test]
	fn put_under_cap_mode_truncates() {
		let mut r = Resource::new_depletable("tank", TickTime::ZERO, 100.0, 90.0, CapacityMode::Cap);
		r.put(TickTime::new(1.0), 50.0).unwrap();
		assert!((r.level() - 100.0).abs() < 1e-9);
	}

	#[test]
	fn reentrant_release_during_scan_does_not_recurse() {
		// A single release() call triggers exactly one top-level rehonor;
		// nested rehonor attempts fold into the pending-rescan bit rather
		// than recursing while `scanning` is true.
		let mut r = Resource::new_counting("r", TickTime::ZERO, 1.0);
		r.try_claim(TickTime::ZERO, cid(1), 1.0, 0).unwrap();
		r.try_claim(TickTime::ZERO, cid(2), 1.0, 0).unwrap();
		let honored = r.release(TickTime::new(1.0), cid(1), None);
		assert_eq!(honored.len(), 1);
		assert_eq!(honored[0].component, cid(2));
	}

	#[test]
	fn put_under_schedule_mode_defers_whole_quantity_until_it_fits() {
		let mut r = Resource::new_depletable("tank", TickTime::ZERO, 100.0, 90.0, CapacityMode::Schedule);
		r.put(TickTime::new(1.0), 30.0).unwrap();
		// Would overflow (90 + 30 > 100): queued whole, level untouched.
		assert_eq!(r.scheduled_put_count(), 1);
		assert!((r.level() - 90.0).abs() < 1e-9);

		// Draining only 5 isn't enough for the queued 30 to fit yet.
		assert!(r.try_claim(TickTime::new(2.0), cid(1), 5.0, 0).unwrap());
		assert_eq!(r.scheduled_put_count(), 1);
		assert!((r.level() - 85.0).abs() < 1e-9);

		// Draining enough (down to 70) lets the full 30 apply at once.
		assert!(r.try_claim(TickTime::new(3.0), cid(2), 15.0, 0).unwrap());
		assert_eq!(r.scheduled_put_count(), 0);
		assert!((r.level() - 100.0).abs() < 1e-9);
	}

	#[test]
	fn set_capacity_rejects_invalid_and_below_committed() {
		let mut r = Resource::new_counting("r", TickTime::ZERO, 3.0);
		r.try_claim(TickTime::ZERO, cid(1), 2.0, 0).unwrap();
		assert!(r.set_capacity(TickTime::new(1.0), -1.0).is_err());
		assert!(r.set_capacity(TickTime::new(1.0), 1.0).is_err(), "below claimed total must be rejected");
		assert!(r.set_capacity(TickTime::new(1.0), 5.0).is_ok());
		assert!((r.capacity() - 5.0).abs() < 1e-9);
	}

	#[test]
	fn set_capacity_increase_honors_queued_requester() {
		let mut r = Resource::new_counting("r", TickTime::ZERO, 1.0);
		assert!(r.try_claim(TickTime::ZERO, cid(1), 1.0, 0).unwrap());
		assert!(!r.try_claim(TickTime::ZERO, cid(2), 1.0, 0).unwrap());
		let honored = r.set_capacity(TickTime::new(1.0), 2.0).unwrap();
		assert_eq!(honored.len(), 1);
		assert_eq!(honored[0].component, cid(2));
	}

	#[test]
	fn selection_policy_first_available_and_round_robin() {
		let available = [0.0, 2.0, 3.0];
		let queue_lens = [0, 1, 0];
		let mut cursor = 0;
		assert_eq!(select_resource(ResourceSelectionPolicy::FirstAvailable, &available, &queue_lens, &mut cursor, |_| 0), Some(1));
		assert_eq!(select_resource(ResourceSelectionPolicy::ShortestQueue, &available, &queue_lens, &mut cursor, |_| 0), Some(2));

		let mut cursor = 0;
		assert_eq!(select_resource(ResourceSelectionPolicy::RoundRobin, &available, &queue_lens, &mut cursor, |_| 0), Some(1));
		assert_eq!(select_resource(ResourceSelectionPolicy::RoundRobin, &available, &queue_lens, &mut cursor, |_| 0), Some(2));
	}
}
