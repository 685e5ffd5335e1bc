//! The [`TurnRecord`] tracked by the Turn Runner (C7) for each in-flight turn.

use crate::duration::DurationMs;
use crate::id::{StreamId, TurnId};
use crate::payload::TurnStatus;
use serde::{Deserialize, Serialize};

/// Bookkeeping for a single turn, from `floor_grant` through its
/// terminal `floor_release`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// This turn's id.
    pub turn_id: TurnId,
    /// The stream that holds (or held) the floor for this turn.
    pub holder_stream: StreamId,
    /// Wall-clock time the turn started (`floor_grant`).
    pub started_ms: u64,
    /// Hard deadline; the Turn Runner hard-cancels at this time.
    pub deadline_ms: u64,
    /// Bytes produced so far (drives the size trigger).
    pub produced_bytes: u64,
    /// Events appended so far under this turn.
    pub produced_events: u64,
    /// Current status.
    pub status: TurnStatus,
}

impl TurnRecord {
    /// Start a new turn record at `floor_grant` time.
    pub fn start(turn_id: TurnId, holder_stream: StreamId, started_ms: u64, max_duration: DurationMs) -> Self {
        Self {
            turn_id,
            holder_stream,
            started_ms,
            deadline_ms: started_ms.saturating_add(max_duration.as_millis()),
            produced_bytes: 0,
            produced_events: 0,
            status: TurnStatus::Running,
        }
    }

    /// Record one flushed content event of `len` bytes.
    pub fn record_flush(&mut self, len: usize) {
        self.produced_bytes = self.produced_bytes.saturating_add(len as u64);
        self.produced_events = self.produced_events.saturating_add(1);
    }

    /// Elapsed wall-clock duration since the turn started, given `now_ms`.
    pub fn elapsed(&self, now_ms: u64) -> DurationMs {
        DurationMs::from_millis(now_ms.saturating_sub(self.started_ms))
    }

    /// Whether `now_ms` is at or past the hard deadline.
    pub fn is_past_deadline(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}
