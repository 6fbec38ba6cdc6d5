//! Error kinds surfaced by the engine.
//!
//! Mirrors spec §7: these are *kinds*, not a type per failing operation.
//! Timeouts and predicate failures are not errors — they set `failed = true`
//! on the component and resume normally (see `component::Component`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
	#[error("invalid transition: {0}")]
	InvalidTransition(String),

	#[error("domain error: {0}")]
	DomainError(String),

	#[error("unavailable: {0}")]
	Unavailable(String),

	#[error("capacity violation: {0}")]
	CapacityViolation(String),

	#[error("internal invariant violated: {0}")]
	Internal(String),
}

pub type SimResult<T> = Result<T, SimError>;
