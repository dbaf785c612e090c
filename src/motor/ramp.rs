// Acceleration-limited speed ramp
//
// Each update may change a wheel's speed by at most MAX_ACCELERATION times
// the time since the previous update, measured on the monotonic clock.

use std::time::{Duration, Instant};

use crate::balance::WheelSpeeds;
use crate::config::{MAX_ACCELERATION, MAX_RAMP_INTERVAL, MAX_SPEED};

/// Saturate to the hardware speed range. NaN becomes 0.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        0.0
    } else {
        speed.clamp(-MAX_SPEED, MAX_SPEED)
    }
}

/// Largest speed change allowed after `elapsed`
pub fn acceleration_budget(elapsed: Duration) -> f32 {
    MAX_ACCELERATION * elapsed.min(MAX_RAMP_INTERVAL).as_secs_f32()
}

/// Move `current` towards `target` by no more than `budget`
pub fn limit_step(current: f32, target: f32, budget: f32) -> f32 {
    current + (target - current).clamp(-budget, budget)
}

#[derive(Debug, Clone)]
pub struct SpeedRamp {
    current: WheelSpeeds,
    last_update: Instant,
}

impl SpeedRamp {
    pub fn new(now: Instant) -> Self {
        Self {
            current: WheelSpeeds::ZERO,
            last_update: now,
        }
    }

    /// Advance towards `target` and return the new (stored) speeds
    pub fn step(&mut self, target: WheelSpeeds, now: Instant, bypass: bool) -> WheelSpeeds {
        // Zero if the clock appears to go backwards
        let elapsed = now.saturating_duration_since(self.last_update);
        self.last_update = now;

        let target = WheelSpeeds::new(clamp_speed(target.left), clamp_speed(target.right));
        let next = if bypass {
            target
        } else {
            let budget = acceleration_budget(elapsed);
            WheelSpeeds::new(
                limit_step(self.current.left, target.left, budget),
                limit_step(self.current.right, target.right, budget),
            )
        };

        self.current = WheelSpeeds::new(clamp_speed(next.left), clamp_speed(next.right));
        self.current
    }

    pub fn current(&self) -> WheelSpeeds {
        self.current
    }

    /// Start measuring elapsed time from `now` without touching the speeds
    pub fn restart(&mut self, now: Instant) {
        self.last_update = now;
    }

    /// Drop to rest immediately
    pub fn stop(&mut self, now: Instant) {
        self.current = WheelSpeeds::ZERO;
        self.last_update = now;
    }
}
