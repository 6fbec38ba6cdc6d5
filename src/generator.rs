//! Arrival generator (spec module G).
//!
//! A `ComponentGenerator` is itself a [`Process`]: each arrival samples an
//! inter-arrival time, holds for that duration, then invokes the factory to
//! spawn one new component — the "sample IAT, hold, invoke factory" loop
//! spec.md §4.7 describes, reusing the ordinary process-driver machinery
//! instead of a bespoke arrival loop.

use crate::component::{ComponentId, Intent, Process};
use crate::environment::Environment;
use crate::error::SimResult;
use crate::time::TickTime;

/// Opaque external sampler for inter-arrival times and durations. No RNG is
/// bundled with this crate — callers supply one (see `rand::Rng` in tests
/// and demos).
pub trait Distribution {
	fn sample(&mut self) -> f64;
}

/// Blanket impl so a plain closure can serve as a `Distribution`.
impl<F: FnMut() -> f64> Distribution for F {
	fn sample(&mut self) -> f64 {
		self()
	}
}

pub struct ComponentGenerator<D, F> {
	inter_arrival: D,
	factory: F,
	total: Option<u64>,
	spawned: u64,
	until: Option<TickTime>,
	/// `false` until the generator has held through its first sampled IAT —
	/// the first resume only samples and holds, so the very first arrival
	/// is produced at `t = iat.sample()`, not at the generator's own
	/// activation time.
	awaiting_first_hold: bool,
}

impl<D, F> ComponentGenerator<D, F>
where
	D: Distribution,
	F: FnMut(&mut Environment) -> SimResult<ComponentId>,
{
	pub fn new(inter_arrival: D, factory: F) -> Self {
		Self {
			inter_arrival,
			factory,
			total: None,
			spawned: 0,
			until: None,
			awaiting_first_hold: true,
		}
	}

	#[must_use]
	pub const fn with_total(mut self, total: u64) -> Self {
		self.total = Some(total);
		self
	}

	#[must_use]
	pub const fn with_until(mut self, until: TickTime) -> Self {
		self.until = Some(until);
		self
	}

	/// Register the generator with `env`, self-activating at `now + at`
	/// (default: immediately).
	pub fn spawn(self, env: &mut Environment, name: Option<&str>, at: Option<f64>) -> SimResult<ComponentId>
	where
		D: 'static,
		F: 'static,
	{
		env.create_component(name, "ComponentGenerator", Box::new(self), Some(at.unwrap_or(0.0)))
	}
}

impl<D, F> Process for ComponentGenerator<D, F>
where
	D: Distribution,
	F: FnMut(&mut Environment) -> SimResult<ComponentId>,
{
	fn resume(&mut self, env: &mut Environment, _me: ComponentId) -> Intent {
		if self.awaiting_first_hold {
			self.awaiting_first_hold = false;
			return Intent::Hold {
				duration: self.inter_arrival.sample(),
				priority: 0,
			};
		}
		if self.total.is_some_and(|total| self.spawned >= total) {
			return Intent::End;
		}
		if self.until.is_some_and(|until| env.now() >= until) {
			return Intent::End;
		}
		match (self.factory)(env) {
			Ok(_) => self.spawned += 1,
			Err(err) => {
				tracing::error!(%err, "component generator factory failed");
				return Intent::End;
			}
		}
		Intent::Hold {
			duration: self.inter_arrival.sample(),
			priority: 0,
		}
	}
}
