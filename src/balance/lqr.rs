// Full-state-feedback balancing regulator with fixed gains

use serde::{Deserialize, Serialize};

use super::{Regulator, RegulatorInput, WheelSpeeds};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LqrGains {
    pub linear_velocity: f32,
    pub angular_velocity: f32,
    pub angle: f32,
}

impl LqrGains {
    pub fn new(linear_velocity: f32, angular_velocity: f32, angle: f32) -> Self {
        Self {
            linear_velocity,
            angular_velocity,
            angle,
        }
    }
}

/// Stateless, so there is nothing to wind up or reset
#[derive(Debug, Clone, Default)]
pub struct LqrRegulator {
    gains: LqrGains,
}

impl LqrRegulator {
    pub fn new(gains: LqrGains) -> Self {
        Self { gains }
    }

    pub fn configure(&mut self, gains: LqrGains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> LqrGains {
        self.gains
    }

    /// `-(K_linear * speed + K_angular * rate + K_angle * angle)`
    pub fn correction(&self, input: &RegulatorInput) -> f32 {
        -(self.gains.linear_velocity * input.speed
            + self.gains.angular_velocity * input.angular_rate
            + self.gains.angle * input.angle)
    }
}

impl Regulator for LqrRegulator {
    fn compute(&mut self, input: &RegulatorInput, _dt: f32) -> WheelSpeeds {
        WheelSpeeds::mix(self.correction(input) + input.throttle, input.rotation)
    }
}
