//! Floor Controller errors.

use orchestrator_core::error::{BusError, RegistryError};
use thiserror::Error;

/// Errors the Floor Controller (C5) can surface.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FloorError {
    /// Attempted to grant while another stream already holds the floor.
    #[error("floor already held by {0}")]
    AlreadyHeld(String),

    /// Attempted to release a floor the caller does not hold.
    #[error("stream {0} does not hold the floor")]
    NotHolder(String),

    /// Release attempted before `T_min` elapsed and no preemption signal
    /// was present to override it.
    #[error("cannot release before T_min has elapsed")]
    BeforeMinDuration,

    /// The registry rejected a state transition.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The bus rejected an append.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}
