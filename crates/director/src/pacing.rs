//! Frame pacing.
//!
//! Converts elapsed real time into a batch of logical ticks. The pacer
//! never reads a clock itself; the caller passes `now_ms` each frame, so
//! tests drive it with synthetic timestamps.
//!
//! Sub-interval remainders carry over to the next frame. Backlog beyond
//! the per-frame cap is discarded, which keeps a stalled frame from
//! triggering an unbounded catch-up burst.

/// Converts wall-clock frame timestamps into batches of logical ticks.
#[derive(Debug, Clone)]
pub struct FramePacer {
    tick_interval_ms: u64,
    max_ticks_per_frame: u32,
    last_tick_time_ms: Option<u64>,
}

impl FramePacer {
    /// `tick_interval_ms` is the real-time spacing of logical ticks.
    /// Shrinking it accelerates playback without touching tick semantics.
    pub fn new(tick_interval_ms: u64, max_ticks_per_frame: u32) -> Self {
        Self {
            tick_interval_ms: tick_interval_ms.max(1),
            max_ticks_per_frame,
            last_tick_time_ms: None,
        }
    }

    /// Number of ticks due at `now_ms`, capped per frame.
    ///
    /// The first call anchors the clock and returns 0. A timestamp earlier
    /// than the anchor counts as no elapsed time.
    pub fn ticks_due(&mut self, now_ms: u64) -> u32 {
        let Some(last) = self.last_tick_time_ms else {
            self.last_tick_time_ms = Some(now_ms);
            return 0;
        };

        let elapsed = now_ms.saturating_sub(last);
        let due = elapsed / self.tick_interval_ms;
        let remainder = elapsed % self.tick_interval_ms;

        // Advance the anchor past the whole intervals consumed this frame,
        // keeping the fractional part.
        self.last_tick_time_ms = Some(now_ms - remainder);

        u32::try_from(due)
            .unwrap_or(u32::MAX)
            .min(self.max_ticks_per_frame)
    }

    /// Drop the clock anchor. The next frame re-anchors and returns 0.
    pub fn reset(&mut self) {
        self.last_tick_time_ms = None;
    }
}

// ============================================================================
// Tests
// ============================================================================
