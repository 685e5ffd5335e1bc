//! Turn Runner (C7) and Tool Adapter Contract shim (C9): drives one
//! floor-holder's turn and converts tool subprocess output into events.

#![deny(missing_docs)]

mod runner;
mod tool_shim;

pub use runner::{TurnConfig, TurnOutcome, TurnRunner};
pub use tool_shim::ToolAdapterShim;
