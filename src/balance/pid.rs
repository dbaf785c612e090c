// Cascaded PID balancing regulator
//
// Outer speed loop: throttle vs. filtered speed -> target lean angle
// Inner angle loop: target lean angle vs. filtered angle -> wheel correction

use serde::{Deserialize, Serialize};

use super::{Regulator, RegulatorInput, WheelSpeeds};
use crate::config::MAX_TARGET_ANGLE;

/// Gains for one PID loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl LoopGains {
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }
}

/// Full PID gain set, replaced as a whole
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    pub speed: LoopGains,
    pub angle: LoopGains,
    /// Weight of the angular rate added to the angle loop measurement
    pub angular_rate_factor: f32,
}

/// State of a single PID loop
#[derive(Debug, Clone, Default)]
pub struct PidLoop {
    integral: f32,
    previous_error: f32,
}

impl PidLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one step and return the loop output.
    ///
    /// The integral is accumulated already scaled by `ki`, so it stays at
    /// zero while `ki` is zero.
    pub fn update(&mut self, gains: &LoopGains, setpoint: f32, measurement: f32, dt: f32) -> f32 {
        let error = setpoint - measurement;

        let mut derivative = 0.0;
        if dt > 0.0 && dt.is_finite() {
            self.integral += gains.ki * error * dt;
            derivative = (error - self.previous_error) / dt;
        }
        self.previous_error = error;

        gains.kp * error + self.integral + gains.kd * derivative
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn previous_error(&self) -> f32 {
        self.previous_error
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }
}

/// Speed loop feeding a lean-angle setpoint into the angle loop
#[derive(Debug, Clone, Default)]
pub struct PidRegulator {
    gains: PidGains,
    speed_loop_enabled: bool,
    speed_loop: PidLoop,
    angle_loop: PidLoop,
}

impl PidRegulator {
    pub fn new(gains: PidGains, speed_loop_enabled: bool) -> Self {
        Self {
            gains,
            speed_loop_enabled,
            ..Default::default()
        }
    }

    pub fn configure(&mut self, gains: PidGains, speed_loop_enabled: bool) {
        self.gains = gains;
        self.speed_loop_enabled = speed_loop_enabled;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn speed_loop(&self) -> &PidLoop {
        &self.speed_loop
    }

    pub fn angle_loop(&self) -> &PidLoop {
        &self.angle_loop
    }
}

impl Regulator for PidRegulator {
    fn compute(&mut self, input: &RegulatorInput, dt: f32) -> WheelSpeeds {
        let target_angle = if self.speed_loop_enabled {
            self.speed_loop
                .update(&self.gains.speed, input.throttle, input.speed, dt)
                .clamp(-MAX_TARGET_ANGLE, MAX_TARGET_ANGLE)
        } else {
            0.0
        };

        let measured = input.angle + self.gains.angular_rate_factor * input.angular_rate;
        let correction = self
            .angle_loop
            .update(&self.gains.angle, target_angle, measured, dt);

        WheelSpeeds::mix(correction + input.throttle, input.rotation)
    }

    fn reset(&mut self) {
        self.speed_loop.reset();
        self.angle_loop.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.005;

    #[test]
    fn test_proportional_only_is_exact() {
        let gains = LoopGains::new(2.5, 0.0, 0.0);
        let mut pid = PidLoop::new();
        for _ in 0..100 {
            // Constant error of 0.4
            let out = pid.update(&gains, 1.0, 0.6, DT);
            assert_eq!(out, 2.5 * (1.0f32 - 0.6));
            assert_eq!(pid.integral(), 0.0);
        }
    }

    #[test]
    fn test_integral_accumulates() {
        let gains = LoopGains::new(0.0, 2.0, 0.0);
        let mut pid = PidLoop::new();
        pid.update(&gains, 1.0, 0.0, 0.5);
        pid.update(&gains, 1.0, 0.0, 0.5);
        // 2.0 * 1.0 * 0.5, twice
        assert!((pid.integral() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_derivative_term() {
        let gains = LoopGains::new(0.0, 0.0, 1.0);
        let mut pid = PidLoop::new();
        pid.update(&gains, 0.0, 0.0, 0.1);
        // Error jumps from 0 to -1 in 0.1s
        let out = pid.update(&gains, 0.0, 1.0, 0.1);
        assert!((out + 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_non_positive_dt_skips_integral_and_derivative() {
        let gains = LoopGains::new(1.0, 5.0, 5.0);
        let mut pid = PidLoop::new();
        let out = pid.update(&gains, 1.0, 0.0, 0.0);
        assert_eq!(out, 1.0);
        assert_eq!(pid.integral(), 0.0);
        let out = pid.update(&gains, 1.0, 0.0, -1.0);
        assert_eq!(out, 1.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let gains = LoopGains::new(1.0, 1.0, 1.0);
        let mut pid = PidLoop::new();
        pid.update(&gains, 3.0, 0.0, DT);
        assert!(pid.integral() != 0.0);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.previous_error(), 0.0);
    }

    #[test]
    fn test_all_zero_gives_zero_speeds() {
        let mut regulator = PidRegulator::new(PidGains::default(), true);
        let speeds = regulator.compute(&RegulatorInput::default(), DT);
        assert_eq!(speeds, WheelSpeeds::ZERO);
    }

    #[test]
    fn test_angle_loop_drives_both_wheels_the_same_way() {
        let gains = PidGains {
            angle: LoopGains::new(10.0, 0.0, 0.0),
            ..Default::default()
        };
        let mut regulator = PidRegulator::new(gains, false);
        let input = RegulatorInput {
            angle: 0.1,
            ..Default::default()
        };
        let speeds = regulator.compute(&input, DT);
        assert!((speeds.left + 1.0).abs() < 1e-6);
        assert_eq!(speeds.left, speeds.right);
    }

    #[test]
    fn test_angular_rate_term_joins_measurement() {
        let gains = PidGains {
            angle: LoopGains::new(1.0, 0.0, 0.0),
            angular_rate_factor: 0.5,
            ..Default::default()
        };
        let mut regulator = PidRegulator::new(gains, false);
        let input = RegulatorInput {
            angle: 0.2,
            angular_rate: 0.4,
            ..Default::default()
        };
        let speeds = regulator.compute(&input, DT);
        // -(0.2 + 0.5 * 0.4)
        assert!((speeds.left + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_speed_loop_target_angle_is_limited() {
        let gains = PidGains {
            speed: LoopGains::new(100.0, 0.0, 0.0),
            angle: LoopGains::new(1.0, 0.0, 0.0),
            ..Default::default()
        };
        let mut regulator = PidRegulator::new(gains, true);
        let input = RegulatorInput {
            throttle: 1.0,
            ..Default::default()
        };
        let speeds = regulator.compute(&input, DT);
        // Angle loop output equals the clamped target, plus the throttle feed-through
        assert!((speeds.left - (MAX_TARGET_ANGLE + 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_is_differential() {
        let mut regulator = PidRegulator::new(PidGains::default(), false);
        let input = RegulatorInput {
            rotation: 0.3,
            ..Default::default()
        };
        let speeds = regulator.compute(&input, DT);
        assert_eq!(speeds.left, 0.3);
        assert_eq!(speeds.right, -0.3);
    }

    #[test]
    fn test_regulator_reset() {
        let gains = PidGains {
            speed: LoopGains::new(1.0, 1.0, 0.0),
            angle: LoopGains::new(1.0, 1.0, 0.0),
            ..Default::default()
        };
        let mut regulator = PidRegulator::new(gains, true);
        let input = RegulatorInput {
            angle: 0.1,
            throttle: 0.5,
            ..Default::default()
        };
        regulator.compute(&input, DT);
        assert!(regulator.angle_loop().integral() != 0.0);
        assert!(regulator.speed_loop().integral() != 0.0);

        regulator.reset();
        assert_eq!(regulator.angle_loop().integral(), 0.0);
        assert_eq!(regulator.speed_loop().integral(), 0.0);
        assert_eq!(regulator.angle_loop().previous_error(), 0.0);
    }
}
