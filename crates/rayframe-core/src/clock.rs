// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Wall-clock delta between successive frame starts.
///
/// Only reads the monotonic clock, so it cannot fail.
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Option<Instant>,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            frames: 0,
        }
    }

    /// Marks the start of a frame and returns the delta in seconds since the
    /// previous frame start. The first frame reports `0.0`.
    pub fn begin_frame(&mut self) -> f32 {
        self.begin_frame_at(Instant::now()).as_secs_f32()
    }

    fn begin_frame_at(&mut self, now: Instant) -> Duration {
        let dt = match self.last_frame {
            Some(prev) => now.saturating_duration_since(prev),
            None => Duration::ZERO,
        };
        self.last_frame = Some(now);
        self.frames += 1;
        dt
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_zero_delta() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.begin_frame_at(Instant::now()), Duration::ZERO);
        assert_eq!(clock.frames(), 1);
    }

    #[test]
    fn delta_is_measured_between_frame_starts() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.begin_frame_at(t0);
        let dt = clock.begin_frame_at(t0 + Duration::from_millis(16));
        assert_eq!(dt, Duration::from_millis(16));
        let dt = clock.begin_frame_at(t0 + Duration::from_millis(40));
        assert_eq!(dt, Duration::from_millis(24));
        assert_eq!(clock.frames(), 3);
    }

    #[test]
    fn clock_going_backwards_saturates() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now() + Duration::from_secs(1);
        clock.begin_frame_at(t0);
        assert_eq!(clock.begin_frame_at(t0 - Duration::from_millis(5)), Duration::ZERO);
    }
}
