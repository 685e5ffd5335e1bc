//! The Trigger Engine (C6): a pure function from bus tail and stream
//! state to a floor decision. No I/O, no clock of its own — every input
//! it needs is passed in by the caller.

#![deny(missing_docs)]

mod decision;
mod engine;

pub use decision::{FloorDecision, GrantReason};
pub use engine::{decide, CurrentTurn, TriggerConfig, TriggerInput};
