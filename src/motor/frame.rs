// PRU step-generator frame format
//
// Frame layout (12 bytes, little-endian, no padding):
// [enabled, microstep, direction_left, direction_right, speed_left (u32), speed_right (u32)]
//
// Speeds are step delays in PRU ticks: the time between two microsteps.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, DEFAULT_MICROSTEP, PRU_CLOCK_HZ, STEPS_PER_REVOLUTION};

/// Encoded frame size in bytes
pub const FRAME_LEN: usize = 12;

/// Microstep divisors supported by the stepper drivers
pub const SUPPORTED_MICROSTEPS: [u8; 6] = [1, 2, 4, 8, 16, 32];

/// Validated microstep divisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Microstep(u8);

impl Microstep {
    pub fn new(divisor: u8) -> Result<Self, ConfigError> {
        if SUPPORTED_MICROSTEPS.contains(&divisor) {
            Ok(Self(divisor))
        } else {
            Err(ConfigError::UnsupportedMicrostep(divisor))
        }
    }

    pub fn divisor(self) -> u8 {
        self.0
    }
}

impl Default for Microstep {
    fn default() -> Self {
        Self(DEFAULT_MICROSTEP)
    }
}

impl TryFrom<u8> for Microstep {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Microstep> for u8 {
    fn from(microstep: Microstep) -> Self {
        microstep.0
    }
}

/// Microsteps per second for one rev/s at this microstep setting
fn steps_per_rev(microstep: Microstep) -> f64 {
    f64::from(STEPS_PER_REVOLUTION) * f64::from(microstep.divisor())
}

/// Convert a signed speed (rev/s) to a step delay and direction bit.
///
/// Speeds too slow to represent (including zero) map to `idle_delay` with
/// the direction bit cleared.
pub fn speed_to_step_delay(speed: f32, microstep: Microstep, idle_delay: u32) -> (u32, bool) {
    let magnitude = f64::from(speed.abs());
    let delay = (f64::from(PRU_CLOCK_HZ) / (steps_per_rev(microstep) * magnitude)).round();

    // Also catches 0/0 and infinite delays
    if !(delay >= 1.0 && delay <= f64::from(u32::MAX)) {
        return (idle_delay, false);
    }

    (delay as u32, speed > 0.0)
}

/// Inverse of `speed_to_step_delay`, returning the speed magnitude in rev/s
pub fn step_delay_to_speed(delay: u32, microstep: Microstep, idle_delay: u32) -> f32 {
    if delay == idle_delay || delay == 0 {
        return 0.0;
    }
    (f64::from(PRU_CLOCK_HZ) / (steps_per_rev(microstep) * f64::from(delay))) as f32
}

/// One command for the PRU step generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame {
    pub enabled: bool,
    pub microstep: Microstep,
    pub direction_left: bool,
    pub direction_right: bool,
    pub speed_left: u32,
    pub speed_right: u32,
}

impl DataFrame {
    /// Encode physical (post swap/inversion) wheel speeds
    pub fn encode(
        enabled: bool,
        microstep: Microstep,
        left: f32,
        right: f32,
        idle_delay: u32,
    ) -> Self {
        let (speed_left, direction_left) = speed_to_step_delay(left, microstep, idle_delay);
        let (speed_right, direction_right) = speed_to_step_delay(right, microstep, idle_delay);
        Self {
            enabled,
            microstep,
            direction_left,
            direction_right,
            speed_left,
            speed_right,
        }
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = self.enabled as u8;
        bytes[1] = self.microstep.divisor();
        bytes[2] = self.direction_left as u8;
        bytes[3] = self.direction_right as u8;
        bytes[4..8].copy_from_slice(&self.speed_left.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.speed_right.to_le_bytes());
        bytes
    }

    /// Parse a frame as the PRU would; `None` on an unsupported microstep or
    /// a flag byte other than 0/1
    pub fn from_bytes(bytes: &[u8; FRAME_LEN]) -> Option<Self> {
        let flag = |b: u8| match b {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        };
        Some(Self {
            enabled: flag(bytes[0])?,
            microstep: Microstep::new(bytes[1]).ok()?,
            direction_left: flag(bytes[2])?,
            direction_right: flag(bytes[3])?,
            speed_left: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            speed_right: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}
