// Hardware constants, timing limits and the runtime configuration file
use std::f32::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::balance::{FilterFactor, LqrGains, PidGains, RegulatorMode, WheelSpeeds};
use crate::motor::{ChannelConfig, Microstep};

// Character device exposed by the rpmsg link to the PRU
pub const DEVICE_PATH: &str = "/dev/rpmsg_pru31";

// PRU clock rate (ticks per second)
pub const PRU_CLOCK_HZ: u32 = 200_000_000;

pub const STEPS_PER_REVOLUTION: u32 = 200;

// Shortest delay between full steps the motors tolerate, in PRU ticks.
// This is what bounds the top speed.
pub const MIN_FULL_STEP_DELAY: u32 = 400_000;

/// Hardware speed limit in rev/s (2.5 rev/s with the constants above)
pub const MAX_SPEED: f32 = PRU_CLOCK_HZ as f32 / (STEPS_PER_REVOLUTION * MIN_FULL_STEP_DELAY) as f32;

/// Maximum wheel acceleration in rev/s^2 (0.005 rev/s per millisecond)
pub const MAX_ACCELERATION: f32 = 5.0;

// Longest gap between speed updates that still earns acceleration budget
pub const MAX_RAMP_INTERVAL: Duration = Duration::from_millis(50);

pub const DEG_TO_RAD: f32 = PI / 180.0;

/// Lean angle limit for the PID speed loop output (15 degrees, in radians)
pub const MAX_TARGET_ANGLE: f32 = 15.0 * DEG_TO_RAD;

// Step delay the PRU reads as "not stepping"
pub const IDLE_STEP_DELAY: u32 = 0;

pub const DEFAULT_MICROSTEP: u8 = 8;

// Odometry runner loop period
pub const RUNNER_PERIOD: Duration = Duration::from_millis(10);

/// Errors raised while validating or loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Filter factor must be in (0, 1], got {0}")]
    InvalidFilterFactor(f32),

    #[error("Unsupported microstep divisor {0} (expected 1, 2, 4, 8, 16 or 32)")]
    UnsupportedMicrostep(u8),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Maps logical (robot-frame) wheels onto physical motor channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputMapping {
    pub invert_left: bool,
    pub invert_right: bool,
    /// Logical left drives the physical right channel and vice versa
    pub swapped: bool,
}

impl OutputMapping {
    /// Swap first, then invert each physical side
    pub fn apply(&self, logical: WheelSpeeds) -> WheelSpeeds {
        let (mut left, mut right) = if self.swapped {
            (logical.right, logical.left)
        } else {
            (logical.left, logical.right)
        };
        if self.invert_left {
            left = -left;
        }
        if self.invert_right {
            right = -right;
        }
        WheelSpeeds::new(left, right)
    }
}

/// Everything the controller can be tuned with at runtime.
///
/// The value is `Copy` and is always read and replaced as a whole, so a
/// control cycle never observes half of a gain update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Apply the balancing correction (otherwise throttle/rotation pass through)
    pub balancing: bool,
    pub mode: RegulatorMode,
    pub angle_filter_factor: FilterFactor,
    pub speed_filter_factor: FilterFactor,
    /// Run the outer speed loop of the PID regulator
    pub pid_speed_regulator: bool,
    pub pid: PidGains,
    pub lqr: LqrGains,
    pub outputs: OutputMapping,
    pub idle_step_delay: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            balancing: false,
            mode: RegulatorMode::Pid,
            angle_filter_factor: FilterFactor::UNFILTERED,
            speed_filter_factor: FilterFactor::UNFILTERED,
            pid_speed_regulator: false,
            pid: PidGains::default(),
            lqr: LqrGains::default(),
            outputs: OutputMapping::default(),
            idle_step_delay: IDLE_STEP_DELAY,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub channel: ChannelConfig,
    pub controller: ControllerConfig,
    pub microstep: Microstep,
}

impl RobotConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_speed_constant() {
        assert!((MAX_SPEED - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_output_mapping_default_is_identity() {
        let speeds = WheelSpeeds::new(1.0, -0.5);
        assert_eq!(OutputMapping::default().apply(speeds), speeds);
    }

    #[test]
    fn test_output_mapping_swaps_before_inverting() {
        let mapping = OutputMapping {
            invert_left: true,
            invert_right: false,
            swapped: true,
        };
        // Logical right (0.5) lands on physical left, then gets inverted
        let physical = mapping.apply(WheelSpeeds::new(1.0, 0.5));
        assert_eq!(physical, WheelSpeeds::new(-0.5, 1.0));
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = RobotConfig::from_json("{}").unwrap();
        assert_eq!(config.controller, ControllerConfig::default());
        assert_eq!(config.microstep.divisor(), DEFAULT_MICROSTEP);
        assert!(matches!(config.channel, ChannelConfig::Device { .. }));
    }

    #[test]
    fn test_json_overrides() {
        let text = r#"{
            "channel": { "kind": "discard" },
            "microstep": 16,
            "controller": {
                "balancing": true,
                "mode": "lqr",
                "angle_filter_factor": 0.25,
                "lqr": { "linear_velocity": 1.5, "angular_velocity": 0.2, "angle": 30.0 },
                "outputs": { "invert_left": true }
            }
        }"#;
        let config = RobotConfig::from_json(text).unwrap();
        assert!(matches!(config.channel, ChannelConfig::Discard));
        assert_eq!(config.microstep.divisor(), 16);
        assert!(config.controller.balancing);
        assert_eq!(config.controller.mode, RegulatorMode::Lqr);
        assert_eq!(config.controller.angle_filter_factor.get(), 0.25);
        assert_eq!(config.controller.speed_filter_factor.get(), 1.0);
        assert_eq!(config.controller.lqr.angle, 30.0);
        assert!(config.controller.outputs.invert_left);
        assert!(!config.controller.outputs.swapped);
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let bad_factor = r#"{ "controller": { "speed_filter_factor": 0.0 } }"#;
        assert!(matches!(
            RobotConfig::from_json(bad_factor),
            Err(ConfigError::Parse(_))
        ));

        let bad_microstep = r#"{ "microstep": 3 }"#;
        assert!(RobotConfig::from_json(bad_microstep).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = RobotConfig::load("/nonexistent/balancebot.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
