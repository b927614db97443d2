use crate::types::*;
use log::trace;
use std::collections::VecDeque;

/// Largest magnitude accepted as a real reading (100 g).
pub const MAX_MAGNITUDE: f64 = 100.0 * GRAVITY;

/// Turns raw acceleration events into a raw activity estimate: the population
/// standard deviation of acceleration magnitude over a trailing time window.
///
/// Gravity contributes a constant offset to every magnitude, so it cancels out
/// of the deviation; a still device reads ~0 whatever its orientation.
///
/// The estimate is recomputed on every accepted event and written to
/// `ActivityState::target_activity`. With fewer than `min_samples` retained
/// readings the target is forced to 0 (too little data counts as stillness).
///
/// Readings whose magnitude is non-finite or beyond `MAX_MAGNITUDE` are
/// treated like a missing payload, so the estimate stays finite and >= 0.
pub struct MotionSampler {
    window: VecDeque<Sample>,
    window_ms: u64,
    min_samples: usize,
    dropped: u64,
}

impl MotionSampler {
    pub fn new(window_ms: u64, min_samples: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(256),
            window_ms,
            min_samples,
            dropped: 0,
        }
    }

    /// Ingest one motion event. Events without a usable acceleration payload
    /// are dropped and leave `state` untouched.
    pub fn ingest(&mut self, event: &MotionEvent, state: &mut ActivityState) {
        let Some(accel) = event.acceleration else {
            self.dropped += 1;
            trace!("Dropped motion event at {}ms (no payload)", event.timestamp_ms);
            return;
        };
        let magnitude = accel.magnitude();
        if !(magnitude.is_finite() && magnitude <= MAX_MAGNITUDE) {
            self.dropped += 1;
            trace!("Dropped motion event at {}ms (magnitude {})", event.timestamp_ms, magnitude);
            return;
        }

        let now = event.timestamp_ms;
        self.window.push_back(Sample {
            timestamp_ms: now,
            magnitude,
        });
        self.evict(now);

        state.target_activity = self.activity();
    }

    /// Prefix-trim everything older than `now - window_ms`.
    fn evict(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.window_ms);
        while let Some(front) = self.window.front() {
            if front.timestamp_ms < cutoff {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Population standard deviation of the retained magnitudes, or 0 below
    /// the minimum sample count.
    pub fn activity(&self) -> f64 {
        let n = self.window.len();
        if n < self.min_samples {
            return 0.0;
        }
        let mean = self.window.iter().map(|s| s.magnitude).sum::<f64>() / n as f64;
        let variance = self
            .window
            .iter()
            .map(|s| (s.magnitude - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        variance.sqrt()
    }

    pub(crate) fn len(&self) -> usize {
        self.window.len()
    }

    #[cfg(test)]
    fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.window.iter()
    }

    /// Number of dropped events (missing or unusable payload) seen so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
