use std::time::{Duration, Instant};

/// Drops observations that arrive faster than the configured frame rate.
///
/// The detector may deliver frames as fast as the camera produces them; the
/// tracker only needs a steady trickle. An observation is admitted when at
/// least `1 / frame_rate` has passed since the last admitted one.
pub struct FrameThrottle {
    min_interval: Option<Duration>,
    last_admitted: Option<Instant>,
}

impl FrameThrottle {
    /// `frame_rate == 0` disables throttling.
    pub fn new(frame_rate: u32) -> Self {
        let min_interval = (frame_rate > 0).then(|| Duration::from_secs(1) / frame_rate);
        Self {
            min_interval,
            last_admitted: None,
        }
    }

    /// Return `true` if an observation arriving at `now` should be processed.
    pub fn admit(&mut self, now: Instant) -> bool {
        let Some(min_interval) = self.min_interval else {
            return true;
        };
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < min_interval {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    /// Forget the last admitted frame (a new session starts fresh).
    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}
