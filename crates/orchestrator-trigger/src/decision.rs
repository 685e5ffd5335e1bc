//! The decision vocabulary the Trigger Engine (C6) returns.

use orchestrator_core::id::StreamId;

/// Why a [`FloorDecision::GrantNext`] was proposed. Carried through to
/// the Floor Controller so it can populate a turn's `floor_release`
/// `reason` field (e.g. `reason=byte_budget`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    /// A `user`/`interrupt` event has not yet been acted on.
    UserInput,
    /// A tool invocation this turn issued just completed.
    ToolCompletion,
    /// Plain time-sliced alternation (`T_quiet` elapsed).
    Alternation,
    /// The current turn's produced bytes reached `byte_budget`.
    SizeBudget,
    /// The granted stream had not spoken for `T_starve`.
    Starvation,
}

/// What the Trigger Engine proposes the Floor Controller do next: one
/// of `grant_next(stream)`, `continue`, `idle`, or `shutdown`.
#[derive(Debug, Clone, PartialEq)]
pub enum FloorDecision {
    /// Grant the floor to `stream` next, for the stated `reason`.
    GrantNext {
        /// Which stream to grant.
        stream: StreamId,
        /// Why.
        reason: GrantReason,
    },
    /// No change: let the current turn keep running.
    Continue,
    /// Nothing to grant and no turn running; the control loop may emit
    /// a heartbeat and wait for the next bus notification or timer tick.
    Idle,
    /// Wind down: no further turns should be granted.
    Shutdown,
}
