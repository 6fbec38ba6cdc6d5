//! The scheduler loop that owns the Clock and drives components (spec
//! module F).
//!
//! `Environment` is the arena for `Component`s (the part of the data model
//! that is genuinely homogeneous and cyclic-reference-prone, per the
//! arena-plus-opaque-ID design note). `Resource` and `State<T>` are *not*
//! arena members here — `State<T>` is generic per value type, and Rust has
//! no runtime reflection to stash arbitrary `State<T>`s in one homogeneous
//! collection the way a DI-container language would. Callers own their
//! resources/states directly (typically behind `Rc<RefCell<_>>` when shared
//! across several components' process closures) and reach the Environment
//! only through `Intent`/honor-result handoffs — see DESIGN.md.

use crate::clock::Clock;
use crate::component::{Component, ComponentId, Intent, LifecycleState, NameGenerator, Process, QueueAttachment, SuspendedSnapshot};
use crate::error::{SimError, SimResult};
use crate::resource::HonorResult as ResourceHonor;
use crate::state::HonorResult as StateHonor;
use crate::time::TickTime;
use std::any::{Any, TypeId};
use std::collections::HashMap;

const TIMEOUT_MARKER: &str = "#timeout";

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventLogRecord {
	pub time: TickTime,
	pub kind: String,
	pub actor: String,
	pub detail: String,
}

/// Stop condition for [`Environment::run`].
pub enum RunUntil {
	Duration(f64),
	Until(TickTime),
	Forever,
}

pub struct Environment {
	clock: Clock,
	components: Vec<Component>,
	name_gen: NameGenerator,
	current: Option<ComponentId>,
	standby: Vec<ComponentId>,
	event_log: Option<Vec<EventLogRecord>>,
	default_priority: i32,
	registry: HashMap<(TypeId, Option<String>), Box<dyn Any>>,
}

impl Default for Environment {
	fn default() -> Self {
		Self::new()
	}
}

impl Environment {
	#[must_use]
	pub fn new() -> Self {
		Self {
			clock: Clock::new(),
			components: Vec::new(),
			name_gen: NameGenerator::new(),
			current: None,
			standby: Vec::new(),
			event_log: None,
			default_priority: 0,
			registry: HashMap::new(),
		}
	}

	/// Build an `Environment` from a parsed [`crate::config::EnvironmentConfig`]:
	/// applies `default_priority` and turns on the event log when requested.
	/// `max_duration` is not applied here since it bounds `run`, not
	/// construction — pass it to `run(RunUntil::Duration(cfg.max_duration))`
	/// at the call site.
	#[cfg(feature = "cli-config")]
	#[must_use]
	pub fn from_config(config: &crate::config::EnvironmentConfig) -> Self {
		let mut env = Self::new();
		env.default_priority = config.default_priority;
		if config.enable_event_log {
			env.enable_event_log();
		}
		env
	}

	#[must_use]
	pub const fn now(&self) -> TickTime {
		self.clock.now()
	}

	#[must_use]
	pub const fn current(&self) -> Option<ComponentId> {
		self.current
	}

	pub fn enable_event_log(&mut self) {
		self.event_log = Some(Vec::new());
	}

	pub fn disable_event_log(&mut self) {
		self.event_log = None;
	}

	pub fn drain_event_log(&mut self) -> Vec<EventLogRecord> {
		self.event_log.as_mut().map(std::mem::take).unwrap_or_default()
	}

	/// Render the current (undrained) event log as caller-facing JSON — the
	/// "format is caller-chosen" of spec §6 realized as the one obvious
	/// serialization this crate ships, matching the rest of the workspace's
	/// `serde_json` usage at its own API boundaries.
	///
	/// # Errors
	/// Propagates any `serde_json` serialization failure (none are expected
	/// for this record shape).
	pub fn event_log_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self.event_log.as_deref().unwrap_or_default())
	}

	fn log(&mut self, kind: &str, actor: ComponentId, detail: impl Into<String>) {
		let detail = detail.into();
		tracing::debug!(actor = self.components[actor.index()].name(), kind, %detail, "component transition");
		if let Some(log) = &mut self.event_log {
			log.push(EventLogRecord {
				time: self.clock.now(),
				kind: kind.to_string(),
				actor: self.components[actor.index()].name().to_string(),
				detail,
			});
		}
	}

	pub fn bind<T: 'static>(&mut self, qualifier: Option<&str>, value: T) {
		self.registry.insert((TypeId::of::<T>(), qualifier.map(str::to_string)), Box::new(value));
	}

	#[must_use]
	pub fn get<T: 'static>(&self, qualifier: Option<&str>) -> Option<&T> {
		self.registry.get(&(TypeId::of::<T>(), qualifier.map(str::to_string)))?.downcast_ref::<T>()
	}

	/// Create a new component in DATA, optionally self-activated at
	/// `now + delay` (the default spec.md §3 lifecycle).
	pub fn create_component(&mut self, name: Option<&str>, class: &str, process: Box<dyn Process>, auto_activate_delay: Option<f64>) -> SimResult<ComponentId> {
		let generated = self.name_gen.generate(name, class);
		let id = ComponentId::new(self.components.len());
		self.components.push(Component::new(id, generated, Some(process)));
		if let Some(delay) = auto_activate_delay {
			self.activate(id, None, None, Some(delay), self.default_priority)?;
		}
		Ok(id)
	}

	#[must_use]
	pub fn component_name(&self, id: ComponentId) -> &str {
		self.components[id.index()].name()
	}

	#[must_use]
	pub fn component_state(&self, id: ComponentId) -> LifecycleState {
		self.components[id.index()].state()
	}

	#[must_use]
	pub fn is_failed(&self, id: ComponentId) -> bool {
		self.components[id.index()].is_failed()
	}

	pub fn clear_failed(&mut self, id: ComponentId) {
		self.components[id.index()].clear_failed();
	}

	fn resolve_deadline(now: TickTime, fail_at: Option<TickTime>, fail_delay: Option<f64>) -> Option<TickTime> {
		match (fail_at, fail_delay) {
			(None, None) => None,
			(Some(a), None) => Some(a),
			(None, Some(d)) => Some(now + d),
			(Some(a), Some(d)) => Some(a.min(now + d)),
		}
	}

	/// Remove `id` from its current queue (if any) before a forced
	/// transition, returning the state it was in. Sets `failed = true` when
	/// that state was REQUESTING or WAITING, per spec §4.5/§5.
	fn force_leave(&mut self, id: ComponentId) -> LifecycleState {
		let idx = id.index();
		let old_state = self.components[idx].state();
		if let Some(hook) = self.components[idx].take_dequeue_hook() {
			hook();
		}
		if let Some(handle) = self.components[idx].scheduled_event() {
			self.clock.cancel(handle);
		}
		self.components[idx].set_scheduled_event(None);
		self.components[idx].set_scheduled_at(None);
		self.components[idx].set_queue(None);
		if matches!(old_state, LifecycleState::Requesting | LifecycleState::Waiting) {
			self.components[idx].set_failed();
		}
		old_state
	}

	/// `activate(process?, at?, delay?)` — spec §4.5.
	///
	/// # Errors
	/// [`SimError::InvalidTransition`] if `id` is the currently CURRENT
	/// component and no `process` is given, or if the resolved target time
	/// precedes `now`.
	pub fn activate(&mut self, id: ComponentId, process: Option<Box<dyn Process>>, at: Option<TickTime>, delay: Option<f64>, priority: i32) -> SimResult<()> {
		if self.current == Some(id) && process.is_none() {
			return Err(SimError::InvalidTransition("activate on the CURRENT component requires an explicit process".into()));
		}
		let now = self.clock.now();
		let target = match (at, delay) {
			(Some(t), _) => t,
			(None, Some(d)) => now.advance(d)?,
			(None, None) => now,
		};
		self.force_leave(id);
		if let Some(process) = process {
			let idx = id.index();
			self.components[idx].take_process();
			self.components[idx].put_process(process);
		}
		self.schedule_at(id, target, priority)?;
		self.log("activate", id, format!("at {target}"));
		Ok(())
	}

	/// `cancel()` — spec §4.5. Forces DATA immediately from any state.
	pub fn cancel(&mut self, id: ComponentId) {
		self.force_leave(id);
		let idx = id.index();
		self.components[idx].set_state(LifecycleState::Data);
		self.log("cancel", id, "forced to DATA");
	}

	/// `interrupt()` — spec §4.5. Valid from any state but DATA/CURRENT.
	///
	/// # Errors
	/// [`SimError::InvalidTransition`] if `id` is DATA or CURRENT.
	pub fn interrupt(&mut self, id: ComponentId) -> SimResult<()> {
		let idx = id.index();
		let state = self.components[idx].state();
		if matches!(state, LifecycleState::Data | LifecycleState::Current) {
			return Err(SimError::InvalidTransition(format!("cannot interrupt a component in {state:?}")));
		}
		if state == LifecycleState::Interrupted {
			self.components[idx].push_interrupt(SuspendedSnapshot {
				prior_state: state,
				prior_queue: None,
				remaining: None,
			});
			return Ok(());
		}
		let now = self.clock.now();
		let remaining = match state {
			LifecycleState::Scheduled => self.components[idx].scheduled_at().map(|at| at - now),
			LifecycleState::Standby => Some(0.0),
			_ => None,
		};
		let prior_queue = self.components[idx].queue();
		self.force_leave(id);
		let idx = id.index();
		self.components[idx].push_interrupt(SuspendedSnapshot { prior_state: state, prior_queue, remaining });
		self.components[idx].set_state(LifecycleState::Interrupted);
		self.log("interrupt", id, format!("from {state:?}"));
		Ok(())
	}

	/// `resume()` — spec §4.5. Restores the state captured at `interrupt`,
	/// preserving the *remaining* hold duration (scenario 6).
	///
	/// # Errors
	/// [`SimError::InvalidTransition`] if `id` is not INTERRUPTED.
	pub fn resume(&mut self, id: ComponentId) -> SimResult<()> {
		let idx = id.index();
		if self.components[idx].state() != LifecycleState::Interrupted {
			return Err(SimError::InvalidTransition("resume requires INTERRUPTED state".into()));
		}
		let Some(snapshot) = self.components[idx].pop_interrupt() else {
			return Ok(());
		};
		let now = self.clock.now();
		match snapshot.prior_state {
			LifecycleState::Scheduled => {
				let target = now.advance(snapshot.remaining.unwrap_or(0.0))?;
				self.schedule_at(id, target, self.default_priority)?;
			}
			LifecycleState::Standby => {
				self.components[idx].set_state(LifecycleState::Standby);
				self.standby.push(id);
			}
			LifecycleState::Passive => {
				// No queue or timer was ever attached to PASSIVE, so there's
				// nothing to re-register — just restore the state.
				self.components[idx].set_state(LifecycleState::Passive);
			}
			_ => {
				// A REQUESTING/WAITING component reneged its queue position
				// when interrupted (see DESIGN.md); resume drops it to DATA
				// rather than silently re-granting a stale request.
				self.components[idx].set_state(LifecycleState::Data);
			}
		}
		self.log("resume", id, format!("restoring {:?}", snapshot.prior_state));
		Ok(())
	}

	fn schedule_at(&mut self, id: ComponentId, at: TickTime, priority: i32) -> SimResult<()> {
		let handle = self.clock.schedule(id, at, priority, None)?;
		let idx = id.index();
		self.components[idx].set_scheduled_event(Some(handle));
		self.components[idx].set_scheduled_at(Some(at));
		self.components[idx].set_state(LifecycleState::Scheduled);
		self.components[idx].set_queue(Some(QueueAttachment::Scheduler));
		Ok(())
	}

	/// Drive `id` until it truly suspends (Hold/Passivate/Standby/blocked
	/// Request or Wait/End), immediately re-entering `resume` in between
	/// whenever an intent is honored in the same tick (e.g. an immediately
	/// satisfiable `request`), matching "process code runs to completion
	/// atomically between yields" (spec §5).
	fn drive(&mut self, id: ComponentId) {
		loop {
			let idx = id.index();
			self.components[idx].set_state(LifecycleState::Current);
			self.current = Some(id);
			let Some(mut process) = self.components[idx].take_process() else {
				self.components[idx].set_state(LifecycleState::Data);
				self.current = None;
				return;
			};
			let intent = process.resume(self, id);
			let idx = id.index();
			// The process has now had its one chance to observe `failed`
			// for this resumption; an immediately-honored request looping
			// back into another `resume` below is a *new* resumption.
			self.components[idx].clear_failed();
			let ended = matches!(intent, Intent::End);
			if ended {
				self.current = None;
			} else {
				self.components[idx].put_process(process);
			}
			match self.apply_intent(id, intent) {
				Ok(true) => continue,
				Ok(false) => {
					self.current = None;
					return;
				}
				Err(err) => {
					tracing::error!(component = self.components[idx].name(), %err, "component step aborted");
					self.components[idx].set_failed();
					self.components[idx].set_state(LifecycleState::Data);
					self.components[idx].set_scheduled_event(None);
					self.components[idx].set_queue(None);
					self.current = None;
					return;
				}
			}
		}
	}

	/// Apply one yielded intent. Returns `Ok(true)` when the component
	/// should be driven again immediately (an honored request), `Ok(false)`
	/// when it has genuinely suspended or ended.
	fn apply_intent(&mut self, id: ComponentId, intent: Intent) -> SimResult<bool> {
		match intent {
			Intent::Hold { duration, priority } => {
				if duration < 0.0 {
					return Err(SimError::InvalidTransition(format!("negative hold duration: {duration}")));
				}
				let target = self.clock.now().advance(duration)?;
				self.schedule_at(id, target, priority)?;
				Ok(false)
			}
			Intent::Passivate => {
				let idx = id.index();
				self.components[idx].set_state(LifecycleState::Passive);
				self.components[idx].set_scheduled_event(None);
				self.components[idx].set_scheduled_at(None);
				self.components[idx].set_queue(None);
				Ok(false)
			}
			Intent::Standby => {
				let idx = id.index();
				self.components[idx].set_state(LifecycleState::Standby);
				self.standby.push(id);
				Ok(false)
			}
			Intent::Request(req) => self.apply_request(id, req),
			Intent::Wait(wait) => {
				let idx = id.index();
				self.components[idx].set_state(LifecycleState::Waiting);
				self.components[idx].set_queue(Some(QueueAttachment::StateWaiters(0)));
				self.components[idx].set_dequeue_hook(wait.on_timeout);
				let now = self.clock.now();
				if let Some(deadline) = Self::resolve_deadline(now, wait.fail_at, wait.fail_delay) {
					let handle = self.clock.schedule(id, deadline, i32::MIN, Some(TIMEOUT_MARKER.to_string()))?;
					self.components[idx].set_scheduled_event(Some(handle));
					self.components[idx].set_scheduled_at(Some(deadline));
				}
				Ok(false)
			}
			Intent::End => {
				let idx = id.index();
				self.components[idx].set_state(LifecycleState::Data);
				self.components[idx].set_scheduled_event(None);
				self.components[idx].set_scheduled_at(None);
				self.components[idx].set_queue(None);
				Ok(false)
			}
		}
	}

	fn apply_request(&mut self, id: ComponentId, req: crate::component::RequestIntent) -> SimResult<bool> {
		if req.claims.is_empty() {
			return Err(SimError::DomainError("request with no resource claims".into()));
		}
		let now = self.clock.now();
		for claim in &req.claims {
			if claim.quantity < 0.0 || !claim.quantity.is_finite() {
				return Err(SimError::DomainError(format!("invalid request quantity {}", claim.quantity)));
			}
		}

		if req.one_of || req.claims.len() == 1 {
			for claim in &req.claims {
				if claim.resource.borrow_mut().try_claim(now, id, claim.quantity, req.priority)? {
					return Ok(true);
				}
				if req.one_of {
					continue;
				}
			}
		} else {
			let all_ok = req.claims.iter().all(|c| c.resource.borrow().can_claim(c.quantity));
			if all_ok {
				for c in &req.claims {
					c.resource.borrow_mut().force_claim(now, id, c.quantity);
				}
				return Ok(true);
			}
			for c in &req.claims {
				c.resource.borrow_mut().enqueue_requester(now, id, c.quantity, req.priority);
			}
		}

		let idx = id.index();
		self.components[idx].set_state(LifecycleState::Requesting);
		self.components[idx].set_queue(Some(QueueAttachment::ResourceRequesters(0)));
		let resources: Vec<_> = req.claims.iter().map(|c| c.resource.clone()).collect();
		let hook_id = id;
		self.components[idx].set_dequeue_hook(Some(Box::new(move || {
			for r in resources {
				r.borrow_mut().remove_requester(now, hook_id);
			}
		})));
		if let Some(deadline) = Self::resolve_deadline(now, req.fail_at, req.fail_delay) {
			let handle = self.clock.schedule(id, deadline, i32::MIN, Some(TIMEOUT_MARKER.to_string()))?;
			self.components[idx].set_scheduled_event(Some(handle));
			self.components[idx].set_scheduled_at(Some(deadline));
		}
		Ok(false)
	}

	/// Apply resource re-honor results: each honored requester is scheduled
	/// as a fresh event at `now` so it becomes CURRENT only after the
	/// component that triggered the release/put finishes its own step.
	///
	/// Invoking the requester's dequeue hook here (rather than discarding it)
	/// is what makes a multi-resource `request` honor correctly: the hook
	/// deregisters the requester from every sibling resource it was also
	/// queued on, so a request honored on resource A cannot later be
	/// double-granted on resource B once B also frees up (spec §4.4's "all
	/// pairs satisfiable simultaneously" equivalence rule).
	pub fn apply_resource_honors(&mut self, honors: &[ResourceHonor]) -> SimResult<()> {
		let now = self.clock.now();
		for h in honors {
			let idx = h.component.index();
			if let Some(handle) = self.components[idx].scheduled_event() {
				self.clock.cancel(handle);
			}
			if let Some(hook) = self.components[idx].take_dequeue_hook() {
				hook();
			}
			let handle = self.clock.schedule(h.component, now, h.priority, None)?;
			self.components[idx].set_scheduled_event(Some(handle));
			self.components[idx].set_scheduled_at(Some(now));
			self.components[idx].set_state(LifecycleState::Scheduled);
			self.components[idx].set_queue(Some(QueueAttachment::Scheduler));
		}
		Ok(())
	}

	/// Apply state waiter honor results (see `state::State::set_value`/`trigger`).
	pub fn apply_state_honors(&mut self, honors: &[StateHonor]) -> SimResult<()> {
		let now = self.clock.now();
		for h in honors {
			let idx = h.component.index();
			if let Some(handle) = self.components[idx].scheduled_event() {
				self.clock.cancel(handle);
			}
			if let Some(hook) = self.components[idx].take_dequeue_hook() {
				hook();
			}
			if h.failed {
				self.components[idx].set_failed();
			}
			let handle = self.clock.schedule(h.component, now, h.priority, None)?;
			self.components[idx].set_scheduled_event(Some(handle));
			self.components[idx].set_scheduled_at(Some(now));
			self.components[idx].set_state(LifecycleState::Scheduled);
			self.components[idx].set_queue(Some(QueueAttachment::Scheduler));
		}
		Ok(())
	}

	fn dispatch(&mut self, event: crate::clock::Event) {
		let id = event.component;
		let idx = id.index();
		if event.process_entry.as_deref() == Some(TIMEOUT_MARKER) {
			if let Some(hook) = self.components[idx].take_dequeue_hook() {
				hook();
			}
			self.components[idx].set_failed();
			self.components[idx].set_queue(None);
			self.components[idx].set_scheduled_event(None);
			self.components[idx].set_scheduled_at(None);
		} else {
			// "failed flag cleared on resumption" (spec §3): a timeout sets
			// it for exactly the one resume that observes it; any later,
			// ordinary dispatch (a fresh `hold`/honored request, not itself
			// a timeout) starts clean.
			self.components[idx].clear_failed();
		}
		self.drive(id);
	}

	/// Run the scheduler loop until the stop condition holds or the queue
	/// empties. STANDBY components are re-scheduled at the next event's
	/// time, with maximal priority so they run before any non-STANDBY
	/// component due at the same instant (spec §4.6).
	pub fn run(&mut self, until: RunUntil) -> SimResult<()> {
		let deadline = match until {
			RunUntil::Duration(d) => Some(self.clock.now().advance(d)?),
			RunUntil::Until(t) => Some(t),
			RunUntil::Forever => None,
		};
		loop {
			if !self.standby.is_empty() {
				let next_time = self.clock.peek().map_or(self.clock.now(), |e| e.time);
				if deadline.is_some_and(|d| next_time > d) {
					break;
				}
				for comp in std::mem::take(&mut self.standby) {
					let idx = comp.index();
					if self.components[idx].state() != LifecycleState::Standby {
						continue;
					}
					let handle = self.clock.schedule(comp, next_time, i32::MAX, None)?;
					self.components[idx].set_scheduled_event(Some(handle));
					self.components[idx].set_scheduled_at(Some(next_time));
				}
			}
			let Some(event) = self.clock.pop() else { break };
			if deadline.is_some_and(|d| event.time > d) {
				break;
			}
			self.dispatch(event);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::Intent;

	struct OneShotHold(f64);
	impl Process for OneShotHold {
		fn resume(&mut self, _env: &mut Environment, _me: ComponentId) -> Intent {
			Intent::Hold { duration: self.0, priority: 0 }
		}
	}

	#[test]
	fn hold_advances_now_by_exactly_duration() {
		let mut env = Environment::new();
		env.create_component(None, "Car", Box::new(OneShotHold(5.0)), Some(0.0)).unwrap();
		env.run(RunUntil::Forever).unwrap();
		assert_eq!(env.now(), TickTime::new(5.0));
	}

	struct TwoStep {
		step: u8,
	}
	impl Process for TwoStep {
		fn resume(&mut self, _env: &mut Environment, _me: ComponentId) -> Intent {
			self.step += 1;
			match self.step {
				1 => Intent::Hold { duration: 3.0, priority: 0 },
				_ => Intent::End,
			}
		}
	}

	#[test]
	fn component_returns_to_data_after_end() {
		let mut env = Environment::new();
		let id = env.create_component(None, "Car", Box::new(TwoStep { step: 0 }), Some(0.0)).unwrap();
		env.run(RunUntil::Forever).unwrap();
		assert_eq!(env.component_state(id), LifecycleState::Data);
	}

	#[test]
	fn interrupt_then_resume_preserves_remaining_duration() {
		// spec §8 scenario 6
		let mut env = Environment::new();
		let id = env.create_component(None, "A", Box::new(OneShotHold(10.0)), Some(0.0)).unwrap();
		env.run(RunUntil::Until(TickTime::new(5.0))).unwrap();
		assert_eq!(env.now(), TickTime::new(5.0));
		env.interrupt(id).unwrap();
		assert_eq!(env.component_state(id), LifecycleState::Interrupted);

		env.run(RunUntil::Until(TickTime::new(7.0))).unwrap();
		env.resume(id).unwrap();
		assert_eq!(env.component_state(id), LifecycleState::Scheduled);

		env.run(RunUntil::Forever).unwrap();
		assert_eq!(env.now(), TickTime::new(12.0));
	}

	#[test]
	fn interrupt_then_resume_of_passive_component_restores_passive() {
		// Regression: resume() used to fold PASSIVE into the generic
		// Requesting/Waiting fallback and force the component to DATA,
		// contradicting spec §4.5's "resume() | INTERRUPTED | prior state
		// restored" for a state that has no queue or timer to renege.
		struct PassivateOnce;
		impl Process for PassivateOnce {
			fn resume(&mut self, _env: &mut Environment, _me: ComponentId) -> Intent {
				Intent::Passivate
			}
		}
		let mut env = Environment::new();
		let id = env.create_component(None, "A", Box::new(PassivateOnce), Some(0.0)).unwrap();
		env.run(RunUntil::Forever).unwrap();
		assert_eq!(env.component_state(id), LifecycleState::Passive);

		env.interrupt(id).unwrap();
		assert_eq!(env.component_state(id), LifecycleState::Interrupted);
		env.resume(id).unwrap();
		assert_eq!(env.component_state(id), LifecycleState::Passive);
	}

	#[test]
	fn activate_on_current_without_process_is_rejected() {
		struct SelfActivate;
		impl Process for SelfActivate {
			fn resume(&mut self, env: &mut Environment, me: ComponentId) -> Intent {
				let err = env.activate(me, None, None, Some(1.0), 0);
				assert!(err.is_err());
				Intent::End
			}
		}
		let mut env = Environment::new();
		env.create_component(None, "A", Box::new(SelfActivate), Some(0.0)).unwrap();
		env.run(RunUntil::Forever).unwrap();
	}
}
