//! Run-loop configuration for binaries embedding the engine (spec §2.3).
//!
//! `Environment::new()` needs none of this — it's an opt-in convenience,
//! gated behind the `cli-config` feature, for demos/benches that want their
//! knobs on the command line the way `task_queue::config::Config` does.

#![cfg(feature = "cli-config")]

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct EnvironmentConfig {
	#[arg(long, env = "SIM_MAX_DURATION", help = "Wall-clock safety valve: stop after this many simulated ticks regardless of other stop conditions")]
	pub max_duration: Option<f64>,

	#[arg(long, env = "SIM_ENABLE_EVENT_LOG", default_value = "false", help = "Record a structured event log as the simulation runs")]
	pub enable_event_log: bool,

	#[arg(long, env = "SIM_DEFAULT_PRIORITY", default_value = "0", help = "Priority used for events scheduled without an explicit priority")]
	pub default_priority: i32,
}

impl EnvironmentConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::parse()
	}
}

impl Default for EnvironmentConfig {
	fn default() -> Self {
		Self {
			max_duration: None,
			enable_event_log: false,
			default_priority: 0,
		}
	}
}
