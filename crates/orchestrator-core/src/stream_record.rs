//! The [`StreamRecord`] shape tracked by the Stream Registry (C4).

use crate::id::StreamId;
use crate::payload::Role;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Not currently holding or awaiting the floor.
    Idle,
    /// Has just been granted the floor (about to speak).
    Granted,
    /// Actively producing events under a turn.
    Speaking,
    /// Winding down after a release or preemption.
    Releasing,
    /// Backed off after repeated errors; not eligible for selection
    /// until `backoff_until_ms`.
    Errored,
    /// Preempted mid-turn.
    Preempted,
    /// Deregistered or permanently failed; never selected again.
    Dead,
}

/// A registered producer and its liveness bookkeeping.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    /// The stream's registered name.
    pub name: StreamId,
    /// What kind of participant this stream is.
    pub role: Role,
    /// Current lifecycle state.
    pub state: StreamState,
    /// Wall-clock time this stream last produced a floor-holding event.
    pub last_active_ms: u64,
    /// If in backoff, the stream is not selectable until this time.
    pub backoff_until_ms: Option<u64>,
    /// Running count of bytes produced, for backpressure accounting.
    pub pending_bytes: u64,
}

impl StreamRecord {
    /// Create a freshly-registered, idle stream record.
    pub fn new(name: StreamId, role: Role, now_ms: u64) -> Self {
        Self {
            name,
            role,
            state: StreamState::Idle,
            last_active_ms: now_ms,
            backoff_until_ms: None,
            pending_bytes: 0,
        }
    }

    /// Whether this stream is currently eligible to be granted the floor.
    pub fn is_eligible(&self, now_ms: u64) -> bool {
        match self.state {
            StreamState::Dead | StreamState::Errored => false,
            _ => match self.backoff_until_ms {
                Some(until) => now_ms >= until,
                None => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_idle_and_eligible() {
        let r = StreamRecord::new(StreamId::new("agent.A"), Role::Strategist, 1000);
        assert_eq!(r.state, StreamState::Idle);
        assert!(r.is_eligible(1000));
    }

    #[test]
    fn backoff_makes_ineligible_until_elapsed() {
        let mut r = StreamRecord::new(StreamId::new("agent.A"), Role::Strategist, 0);
        r.backoff_until_ms = Some(5000);
        assert!(!r.is_eligible(4999));
        assert!(r.is_eligible(5000));
    }

    #[test]
    fn dead_is_never_eligible() {
        let mut r = StreamRecord::new(StreamId::new("agent.A"), Role::Strategist, 0);
        r.state = StreamState::Dead;
        assert!(!r.is_eligible(u64::MAX));
    }
}
