//! The closed enums that classify an event and carry its content.

use serde::{Deserialize, Serialize};

/// Which kind of participant produced an event.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The strategist agent slot.
    Strategist,
    /// The implementer agent slot.
    Implementer,
    /// A tool stream (wraps an external subprocess).
    Tool,
    /// The human user.
    User,
    /// The kernel itself (heartbeats, errors, lifecycle).
    System,
}

/// The closed speech-act vocabulary. Every event carries exactly one.
///
/// This is deliberately closed (not `#[non_exhaustive]`): the set of
/// things an event can *do* is part of the kernel's ordering and
/// invariant guarantees, and widening it is a breaking change to those
/// guarantees, not an additive one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Act {
    /// Ordinary conversational content.
    Say,
    /// A proposal put forward for the other party to react to.
    Propose,
    /// A question directed at the other participant or the user.
    Ask,
    /// A response to a prior `ask`.
    Answer,
    /// A report of something observed (tool output, environment state).
    Observe,
    /// A stated plan of action.
    Plan,
    /// A structured decision.
    Decide,
    /// Invocation of a tool.
    ToolInvoke,
    /// A chunk of tool output (stdout or stderr).
    ToolChunk,
    /// Terminal event for a tool invocation.
    ToolEnd,
    /// An externally-triggered preemption signal.
    Interrupt,
    /// The floor was granted to a stream.
    FloorGrant,
    /// The floor was released by its holder.
    FloorRelease,
    /// An error surfaced as an ordinary event.
    Error,
    /// Liveness signal emitted while idle.
    Heartbeat,
}

impl Act {
    /// Whether this act requires the floor: every event except
    /// `interrupt`, `heartbeat`, and `tool_chunk` must carry the current
    /// floor-holder's stream.
    pub fn requires_floor(&self) -> bool {
        !matches!(self, Act::Interrupt | Act::Heartbeat | Act::ToolChunk)
    }
}

/// Which output channel a tool chunk came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolChannel {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Terminal status of a tool invocation, carried on its `tool_end` event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolEndStatus {
    /// The process exited; `exit_code` on the payload is meaningful.
    Completed,
    /// The invoking turn was preempted/cancelled before the tool finished.
    Cancelled,
    /// The adapter itself failed (spawn error, I/O error).
    Errored,
}

/// Terminal status of a turn, carried on its `floor_release` event and
/// mirrored in the in-memory [`TurnRecord`](crate::turn_record::TurnRecord).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Still producing events.
    Running,
    /// Ended normally (natural completion or a safe-boundary size/time trigger).
    Completed,
    /// Ended because of an externally-triggered preemption.
    Preempted,
    /// Ended because the speaker returned an error.
    Errored,
    /// Ended because the hard deadline was reached.
    TimedOut,
}

/// Why a turn released the floor, when that reason is more specific than
/// the bare [`TurnStatus`] (e.g. "hit `byte_budget`" vs "hit `T_max`").
/// `None` means the status alone is sufficient explanation.
pub type ReleaseReason = Option<String>;

/// The payload variants an [`Event`](crate::event::Event) can carry: a
/// text chunk, a tool invocation (name + args), a tool chunk (channel +
/// bytes), or a structured decision (key/value map), plus the handful
/// of acts that carry no free-form content (`floor_grant`, `heartbeat`)
/// or a fixed shape (`floor_release`, `tool_end`, `error`).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Plain text content — used by `say`, `propose`, `ask`, `answer`,
    /// `observe`, `plan`, and `interrupt`.
    Text {
        /// The text chunk.
        text: String,
        /// True when this is the last content event flushed for a
        /// cancelled turn.
        #[serde(default)]
        partial: bool,
    },
    /// A tool invocation request, issued by an agent turn.
    ToolInvoke {
        /// Name of the tool to invoke.
        name: String,
        /// Tool arguments.
        args: serde_json::Value,
    },
    /// A chunk of tool output, appended without holding the floor.
    ToolChunk {
        /// Which stream the bytes came from.
        channel: ToolChannel,
        /// The (possibly redacted) bytes.
        bytes: Vec<u8>,
    },
    /// Terminal event for a tool invocation.
    ToolEnd {
        /// Process exit code, when the process actually ran to completion.
        exit_code: Option<i32>,
        /// How the invocation ended.
        status: ToolEndStatus,
    },
    /// A structured decision (key/value map).
    Decision {
        /// The decision's fields.
        data: serde_json::Map<String, serde_json::Value>,
    },
    /// Terminal event for a turn.
    FloorRelease {
        /// How the turn ended.
        status: TurnStatus,
        /// Optional machine-readable reason (e.g. `"byte_budget"`).
        #[serde(default)]
        reason: ReleaseReason,
    },
    /// An error surfaced as an ordinary event; `message` has already
    /// passed through the configured redactor.
    Error {
        /// Redacted error message.
        message: String,
    },
    /// No content — used by `floor_grant` and `heartbeat`.
    None,
}

impl Payload {
    /// Convenience constructor for a non-partial text payload.
    pub fn text(s: impl Into<String>) -> Self {
        Payload::Text {
            text: s.into(),
            partial: false,
        }
    }

    /// Borrow the text content, if this payload carries any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_floor_matches_invariant_3() {
        assert!(!Act::Interrupt.requires_floor());
        assert!(!Act::Heartbeat.requires_floor());
        assert!(!Act::ToolChunk.requires_floor());
        assert!(Act::Say.requires_floor());
        assert!(Act::FloorGrant.requires_floor());
        assert!(Act::ToolInvoke.requires_floor());
    }

    #[test]
    fn payload_round_trips_through_json() {
        let p = Payload::text("hello");
        let json = serde_json::to_string(&p).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
