//! In-memory/scripted implementations for testing.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! implementations that prove the capability traits are usable, mirroring
//! `layer0::test_utils`'s `EchoOperator`/`LocalOrchestrator` pattern one
//! level down, at the capability boundary instead of the protocol boundary.

mod scripted_agent;
mod scripted_tool;

pub use scripted_agent::ScriptedAgent;
pub use scripted_tool::{ScriptedTool, ToolScript};
