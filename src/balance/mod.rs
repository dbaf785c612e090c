// Balancing regulators for the two-wheel base
//
// Provides:
// - Exponential input filters for angle and speed
// - Cascaded PID regulator (speed loop -> lean angle -> angle loop)
// - Fixed-gain full-state-feedback (LQR) regulator

pub mod filter;
pub mod lqr;
pub mod pid;

use serde::{Deserialize, Serialize};

pub use filter::{ExpFilter, FilterFactor};
pub use lqr::{LqrGains, LqrRegulator};
pub use pid::{LoopGains, PidGains, PidLoop, PidRegulator};

/// Per-wheel speed in rev/s, positive = forward
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelSpeeds {
    pub left: f32,
    pub right: f32,
}

impl WheelSpeeds {
    pub const ZERO: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Combine a same-direction component with a turning component.
    /// Positive rotation speeds up the left wheel (turns right).
    pub fn mix(linear: f32, rotation: f32) -> Self {
        Self {
            left: linear + rotation,
            right: linear - rotation,
        }
    }
}

/// Which regulator produces the balancing correction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulatorMode {
    #[default]
    Pid,
    Lqr,
}

/// Filtered measurements and motion commands for one control cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegulatorInput {
    /// Filtered tilt angle (rad)
    pub angle: f32,
    /// Tilt angular rate (rad/s)
    pub angular_rate: f32,
    /// Filtered linear speed (rev/s)
    pub speed: f32,
    /// Commanded linear speed (rev/s)
    pub throttle: f32,
    /// Commanded differential speed (rev/s)
    pub rotation: f32,
}

/// A balancing control law
pub trait Regulator: Send {
    /// Compute raw (unclamped) target wheel speeds for one cycle.
    /// `dt` is the caller's loop time in seconds.
    fn compute(&mut self, input: &RegulatorInput, dt: f32) -> WheelSpeeds;

    /// Forget accumulated state
    fn reset(&mut self) {}
}

/// Wheel speeds when no balancing correction is applied
pub fn passthrough(input: &RegulatorInput) -> WheelSpeeds {
    WheelSpeeds::mix(input.throttle, input.rotation)
}
