//! Component lifecycle state machine and process driver (spec module E).
//!
//! A process is expressed as a small state machine behind the [`Process`]
//! trait rather than a native coroutine — stable Rust has no generators, so
//! `resume` plays the role the spec's "lazy sequence of intents" plays in a
//! language with first-class coroutines: each call advances the component's
//! internal position by exactly one yield point and returns the [`Intent`]
//! at that point. The driver (`Environment::dispatch`) owns interpreting the
//! intent; `resume` itself never touches the Clock or any resource's
//! internals directly, only through the `env` handle it is given.

use crate::clock::EventHandle;
use crate::environment::Environment;
use crate::resource::Resource;
use crate::time::TickTime;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Opaque index into `Environment`'s component arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(usize);

impl ComponentId {
	pub(crate) const fn new(index: usize) -> Self {
		Self(index)
	}

	pub(crate) const fn index(self) -> usize {
		self.0
	}

	/// Construct a `ComponentId` outside the arena. Only meaningful in unit
	/// tests that exercise `Clock`/`State`/`Resource` in isolation from a
	/// live `Environment`.
	#[cfg(test)]
	#[must_use]
	pub const fn for_test(index: usize) -> Self {
		Self(index)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Data,
	Current,
	Scheduled,
	Passive,
	Requesting,
	Waiting,
	Standby,
	Interrupted,
}

/// What queue (if any) a component is attached to. A component is attached
/// to at most one at a time — the scheduler's own future-event queue, one
/// resource's requester or claimer list, or a state's waiter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAttachment {
	Scheduler,
	ResourceRequesters(u64),
	ResourceClaimers(u64),
	StateWaiters(u64),
}

/// Snapshot taken on `interrupt()`, restored on `resume()`. Preserves the
/// *remaining* hold/fail duration rather than the original one (scenario 6).
pub struct SuspendedSnapshot {
	pub prior_state: LifecycleState,
	pub prior_queue: Option<QueueAttachment>,
	pub remaining: Option<f64>,
}

/// A quantity-bearing claim against one resource, as part of a (possibly
/// multi-resource / `one_of`) request.
pub struct ResourceClaim {
	pub resource: Rc<RefCell<Resource>>,
	pub quantity: f64,
}

pub struct RequestIntent {
	pub claims: Vec<ResourceClaim>,
	pub one_of: bool,
	pub priority: i32,
	pub fail_at: Option<TickTime>,
	pub fail_delay: Option<f64>,
}

/// Yielded after a `State::wait` call already returned `None` (not yet
/// satisfied). `on_timeout` is invoked once, by the Environment, if the
/// fail timer fires before the state re-evaluates the waiter — it should
/// deregister the waiter from whichever `State<T>` it was queued on.
pub struct WaitIntent {
	pub fail_at: Option<TickTime>,
	pub fail_delay: Option<f64>,
	pub on_timeout: Option<Box<dyn FnOnce()>>,
}

/// The interaction a process wants to perform at its current yield point.
pub enum Intent {
	Hold { duration: f64, priority: i32 },
	Passivate,
	Standby,
	Request(RequestIntent),
	Wait(WaitIntent),
	End,
}

/// A component's behavior. Implementors typically close over `Rc<RefCell<_>>`
/// handles to whatever resources/states they interact with, and track their
/// own resumption point as an explicit enum or counter (there being no
/// native coroutine to rely on).
pub trait Process {
	fn resume(&mut self, env: &mut Environment, me: ComponentId) -> Intent;
}

pub struct Component {
	id: ComponentId,
	name: String,
	state: LifecycleState,
	scheduled_event: Option<EventHandle>,
	scheduled_at: Option<TickTime>,
	queue: Option<QueueAttachment>,
	process: Option<Box<dyn Process>>,
	interrupt_depth: u32,
	suspended: Option<SuspendedSnapshot>,
	failed: bool,
	/// Invoked once, either when a pending fail-timeout fires or when the
	/// component is forced out of REQUESTING/WAITING by another transition
	/// (cancel, activate, interrupt) — deregisters it from whichever
	/// resource/state queue it was sitting on.
	dequeue_hook: Option<Box<dyn FnOnce()>>,
}

impl Component {
	pub(crate) fn new(id: ComponentId, name: String, process: Option<Box<dyn Process>>) -> Self {
		Self {
			id,
			name,
			state: LifecycleState::Data,
			scheduled_event: None,
			scheduled_at: None,
			queue: None,
			process,
			interrupt_depth: 0,
			suspended: None,
			failed: false,
			dequeue_hook: None,
		}
	}

	#[must_use]
	pub const fn id(&self) -> ComponentId {
		self.id
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub const fn state(&self) -> LifecycleState {
		self.state
	}

	#[must_use]
	pub const fn is_failed(&self) -> bool {
		self.failed
	}

	pub(crate) fn clear_failed(&mut self) {
		self.failed = false;
	}

	pub(crate) fn set_failed(&mut self) {
		self.failed = true;
	}

	pub(crate) const fn queue(&self) -> Option<QueueAttachment> {
		self.queue
	}

	pub(crate) fn set_queue(&mut self, queue: Option<QueueAttachment>) {
		self.queue = queue;
	}

	pub(crate) const fn scheduled_event(&self) -> Option<EventHandle> {
		self.scheduled_event
	}

	pub(crate) fn set_scheduled_event(&mut self, handle: Option<EventHandle>) {
		self.scheduled_event = handle;
	}

	pub(crate) const fn scheduled_at(&self) -> Option<TickTime> {
		self.scheduled_at
	}

	pub(crate) fn set_scheduled_at(&mut self, at: Option<TickTime>) {
		self.scheduled_at = at;
	}

	pub(crate) fn set_state(&mut self, state: LifecycleState) {
		self.state = state;
	}

	pub(crate) fn set_dequeue_hook(&mut self, hook: Option<Box<dyn FnOnce()>>) {
		self.dequeue_hook = hook;
	}

	pub(crate) fn take_dequeue_hook(&mut self) -> Option<Box<dyn FnOnce()>> {
		self.dequeue_hook.take()
	}

	pub(crate) fn take_process(&mut self) -> Option<Box<dyn Process>> {
		self.process.take()
	}

	pub(crate) fn put_process(&mut self, process: Box<dyn Process>) {
		self.process = Some(process);
	}

	pub(crate) const fn has_process(&self) -> bool {
		self.process.is_some()
	}

	#[must_use]
	pub const fn interrupt_depth(&self) -> u32 {
		self.interrupt_depth
	}

	pub(crate) fn push_interrupt(&mut self, snapshot: SuspendedSnapshot) {
		self.interrupt_depth += 1;
		if self.suspended.is_none() {
			self.suspended = Some(snapshot);
		}
	}

	/// Pop one level of interrupt nesting. Returns the snapshot to restore
	/// from once `interrupt_depth` reaches zero, `None` while still nested.
	pub(crate) fn pop_interrupt(&mut self) -> Option<SuspendedSnapshot> {
		if self.interrupt_depth == 0 {
			return None;
		}
		self.interrupt_depth -= 1;
		if self.interrupt_depth == 0 {
			self.suspended.take()
		} else {
			None
		}
	}
}

/// Generates unique component names from a class/label prefix, mirroring
/// the spec's `"{ClassName}.{counter}"` default and its "trailing `-`, `.`,
/// or `_` means auto-index this caller-supplied name" rule.
#[derive(Default)]
pub struct NameGenerator {
	counters: HashMap<String, u64>,
}

impl NameGenerator {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn generate(&mut self, requested: Option<&str>, default_class: &str) -> String {
		match requested {
			Some(name) if name.ends_with(['-', '.', '_']) => self.indexed(name),
			Some(name) => name.to_string(),
			None => self.indexed(&format!("{default_class}.")),
		}
	}

	fn indexed(&mut self, prefix: &str) -> String {
		let counter = self.counters.entry(prefix.to_string()).or_insert(0);
		let name = format!("{prefix}{counter}");
		*counter += 1;
		name
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auto_generated_names_are_indexed_per_class() {
		let mut gen = NameGenerator::new();
		assert_eq!(gen.generate(None, "Car"), "Car.0");
		assert_eq!(gen.generate(None, "Car"), "Car.1");
		assert_eq!(gen.generate(None, "Truck"), "Truck.0");
	}

	#[test]
	fn trailing_separator_triggers_auto_index() {
		let mut gen = NameGenerator::new();
		assert_eq!(gen.generate(Some("Pump-"), "Car"), "Pump-0");
		assert_eq!(gen.generate(Some("Pump-"), "Car"), "Pump-1");
	}

	#[test]
	fn explicit_name_without_separator_is_used_verbatim() {
		let mut gen = NameGenerator::new();
		assert_eq!(gen.generate(Some("MainPump"), "Car"), "MainPump");
		assert_eq!(gen.generate(Some("MainPump"), "Car"), "MainPump");
	}

	#[test]
	fn interrupt_nesting_only_restores_at_depth_zero() {
		let mut c = Component::new(ComponentId::for_test(0), "c".into(), None);
		c.push_interrupt(SuspendedSnapshot {
			prior_state: LifecycleState::Scheduled,
			prior_queue: None,
			remaining: Some(5.0),
		});
		assert!(c.pop_interrupt().is_none());
		c.push_interrupt(SuspendedSnapshot {
			prior_state: LifecycleState::Scheduled,
			prior_queue: None,
			remaining: Some(5.0),
		});
		assert_eq!(c.interrupt_depth(), 2);
		assert!(c.pop_interrupt().is_none());
		let snap = c.pop_interrupt().unwrap();
		assert_eq!(snap.remaining, Some(5.0));
	}
}
