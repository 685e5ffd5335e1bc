//! The Watermark Clock (C3) — a pure function over wall-clock time.

use orchestrator_core::duration::DurationMs;

/// Default allowance by which `watermark_ms` may trail `event_time_ms`.
pub const DEFAULT_SKEW_TOLERANCE_MS: u64 = 50;

/// Advances a monotonic watermark given the previous value and the
/// current wall-clock reading. `skew_tolerance` bounds how far the
/// watermark may trail `now_ms`; it never lets the watermark run
/// backwards relative to `prev_wm`.
///
/// ```
/// use orchestrator_bus::clock::advance;
/// assert_eq!(advance(0, 1_000, 50), 950);
/// assert_eq!(advance(900, 901, 50), 900); // never regresses
/// ```
pub fn advance(prev_wm: u64, now_ms: u64, skew_tolerance: u64) -> u64 {
    let candidate = now_ms.saturating_sub(skew_tolerance);
    prev_wm.max(candidate)
}

/// Stateful wrapper around [`advance`] that owns the running watermark
/// and the configured skew tolerance, so the bus doesn't have to thread
/// `prev_wm` through every append.
#[derive(Debug, Clone)]
pub struct WatermarkClock {
    watermark_ms: u64,
    skew_tolerance_ms: u64,
}

impl WatermarkClock {
    /// Create a clock starting at watermark `0` with the given skew tolerance.
    pub fn new(skew_tolerance_ms: u64) -> Self {
        Self {
            watermark_ms: 0,
            skew_tolerance_ms,
        }
    }

    /// Advance the watermark to account for an event observed at `now_ms`,
    /// returning the new watermark.
    pub fn advance(&mut self, now_ms: u64) -> u64 {
        self.watermark_ms = advance(self.watermark_ms, now_ms, self.skew_tolerance_ms);
        self.watermark_ms
    }

    /// The current watermark without advancing it.
    pub fn current(&self) -> u64 {
        self.watermark_ms
    }

    /// How far the watermark trails `now_ms`.
    pub fn lag(&self, now_ms: u64) -> DurationMs {
        DurationMs::from_millis(now_ms.saturating_sub(self.watermark_ms))
    }
}

impl Default for WatermarkClock {
    fn default() -> Self {
        Self::new(DEFAULT_SKEW_TOLERANCE_MS)
    }
}
