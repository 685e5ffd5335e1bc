//! # orchestrator-core — data model and capability traits for the orchestrator kernel
//!
//! This crate defines the shared vocabulary every other kernel crate builds
//! on: the immutable [`Event`] record, typed identifiers, the closed
//! `Role`/`Act`/`Payload` enums that make up an event, the `Stream` and
//! `Turn` record shapes, and the three capability traits the kernel
//! consumes but never implements itself — [`AgentStream`], [`ToolAdapter`],
//! and [`MemoryPlane`].
//!
//! ## Design Principle
//!
//! Every type here is a plain data shape or a narrow trait boundary. No
//! scheduling, no I/O, no persistence — those live in `orchestrator-bus`,
//! `orchestrator-registry`, `orchestrator-floor`, and `orchestrator-turn`.
//! Keeping the vocabulary in one dependency-light crate means every other
//! crate speaks the same `Event`/`Act`/`Role` without re-deriving it.

#![deny(missing_docs)]

pub mod capability;
pub mod duration;
pub mod error;
pub mod event;
pub mod id;
pub mod payload;
pub mod stream_record;
pub mod turn_record;

#[cfg(feature = "test-utils")]
pub mod test_support;

pub use capability::agent::{AgentChunk, AgentStream};
pub use capability::memory::MemoryPlane;
pub use capability::redact::{NoopRedactor, Redactor};
pub use capability::tool::{ToolAdapter, ToolHandle};
pub use duration::DurationMs;
pub use error::{BusError, KernelError, RegistryError, ToolError, TurnError};
pub use event::{Event, PartialEvent};
pub use id::{StreamId, TurnId};
pub use payload::{Act, Payload, Role, ToolChannel, ToolEndStatus, TurnStatus};
pub use stream_record::{StreamRecord, StreamState};
pub use turn_record::TurnRecord;
