//! A general-purpose discrete-event simulation engine with a
//! process-oriented programming model: components describe their behavior
//! as a sequence of interaction intents (hold, passivate, wait, request,
//! standby, interrupt) against a priority-ordered future-event queue,
//! shared resources, predicate-waited state, and time-weighted monitors.

pub mod clock;
pub mod component;
pub mod config;
pub mod environment;
pub mod error;
pub mod generator;
pub mod monitor;
pub mod resource;
pub mod state;
pub mod time;

pub use clock::{Clock, Event, EventHandle};
pub use component::{Component, ComponentId, Intent, LifecycleState, Process, QueueAttachment, RequestIntent, ResourceClaim, WaitIntent};
pub use environment::{Environment, EventLogRecord, RunUntil};
pub use error::{SimError, SimResult};
pub use generator::{ComponentGenerator, Distribution};
pub use monitor::{merge, CategoryMonitor, CategoryTimeline, DoubleTimeline, IntTimeline, NumericStatisticMonitor, NumericStatistics, Timeline, TimelineStatistics, WeightedDistribution};
pub use resource::{CapacityMode, Resource, ResourceKind, ResourceSelectionPolicy};
pub use state::{AllOrAny, HonorResult as StateHonorResult, State};
pub use time::TickTime;

#[cfg(feature = "cli-config")]
pub use config::EnvironmentConfig;
