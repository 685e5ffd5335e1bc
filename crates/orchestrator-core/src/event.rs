//! The immutable [`Event`] record and the [`PartialEvent`] producers submit.

use crate::duration::DurationMs;
use crate::id::{StreamId, TurnId};
use crate::payload::{Act, Payload, Role};
use serde::{Deserialize, Serialize};

/// An immutable record on the event bus. Sealed at append time — nothing
/// after construction by [`crate::event::PartialEvent`] into a full
/// `Event` may mutate it.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Strictly increasing, gap-free per process lifetime. Assigned at
    /// bus append — never set by a producer.
    pub seq: u64,

    /// Wall-clock time of production, UTC milliseconds.
    pub event_time_ms: u64,

    /// Monotonic non-decreasing watermark, advanced by the Watermark
    /// Clock on every append. Always `<= event_time_ms`.
    pub watermark_ms: u64,

    /// Which kind of participant produced this event.
    pub role: Role,

    /// The producing stream's registered name.
    pub stream: StreamId,

    /// The turn that produced this event. All events in a turn share it.
    pub turn_id: TurnId,

    /// The speech-act this event performs.
    pub act: Act,

    /// The event's content.
    pub payload: Payload,

    /// True on the last event of a turn.
    pub is_final: bool,

    /// Links an answer/observation/tool_chunk back to the question,
    /// invocation, or prior event it responds to.
    pub parent_seq: Option<u64>,
}

impl Event {
    /// Seal a [`PartialEvent`] into an immutable `Event`, assigning the
    /// three fields only the Event Bus may set: created at the producer,
    /// sealed at bus append. The bus redacts `partial.payload` before
    /// calling this.
    pub fn seal(partial: PartialEvent, seq: u64, event_time_ms: u64, watermark_ms: u64) -> Self {
        Self {
            seq,
            event_time_ms,
            watermark_ms,
            role: partial.role,
            stream: partial.stream,
            turn_id: partial.turn_id,
            act: partial.act,
            payload: partial.payload,
            is_final: partial.is_final,
            parent_seq: partial.parent_seq,
        }
    }

    /// Milliseconds of watermark lag behind this event's own production
    /// time. Useful for diagnosing `tool_chunk` events arriving "late"
    /// relative to the watermark.
    pub fn watermark_lag(&self) -> DurationMs {
        DurationMs::from_millis(self.event_time_ms.saturating_sub(self.watermark_ms))
    }
}

/// What a producer hands to [`Event Bus::append`](../orchestrator_bus/index.html)
/// before `seq`/`event_time_ms`/`watermark_ms` are assigned. Everything a
/// producer actually decides about an event lives here; everything the
/// bus is solely responsible for does not.
#[derive(Debug, Clone)]
pub struct PartialEvent {
    /// The producing stream's registered name.
    pub stream: StreamId,
    /// Which kind of participant produced this event.
    pub role: Role,
    /// The turn that produced this event.
    pub turn_id: TurnId,
    /// The speech-act this event performs.
    pub act: Act,
    /// The event's content, pre-redaction. The bus applies the
    /// configured [`crate::capability::redact::Redactor`] before sealing.
    pub payload: Payload,
    /// True on the last event of a turn.
    pub is_final: bool,
    /// Links back to a prior event.
    pub parent_seq: Option<u64>,
}

impl PartialEvent {
    /// Construct a partial event with `is_final = false` and no parent.
    pub fn new(stream: StreamId, role: Role, turn_id: TurnId, act: Act, payload: Payload) -> Self {
        Self {
            stream,
            role,
            turn_id,
            act,
            payload,
            is_final: false,
            parent_seq: None,
        }
    }

    /// Builder-style: mark this event final.
    pub fn finalize(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Builder-style: attach a parent sequence number.
    pub fn with_parent(mut self, parent_seq: u64) -> Self {
        self.parent_seq = Some(parent_seq);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_lag_is_zero_when_equal() {
        let e = Event {
            seq: 1,
            event_time_ms: 1000,
            watermark_ms: 1000,
            role: Role::System,
            stream: StreamId::new("system.kernel"),
            turn_id: TurnId::new(),
            act: Act::Heartbeat,
            payload: Payload::None,
            is_final: true,
            parent_seq: None,
        };
        assert_eq!(e.watermark_lag(), DurationMs::ZERO);
    }

    #[test]
    fn watermark_lag_reflects_skew() {
        let e = Event {
            seq: 1,
            event_time_ms: 1050,
            watermark_ms: 1000,
            role: Role::Tool,
            stream: StreamId::new("tool.shell.1"),
            turn_id: TurnId::new(),
            act: Act::ToolChunk,
            payload: Payload::None,
            is_final: false,
            parent_seq: Some(0),
        };
        assert_eq!(e.watermark_lag(), DurationMs::from_millis(50));
    }
}
