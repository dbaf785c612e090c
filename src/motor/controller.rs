// Motors controller for the balancing robot
//
// Combines input filtering, the balancing regulators, the acceleration ramp
// and the PRU frame writer behind one thread-safe handle.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::channel::{Channel, FrameWriter, MotorError};
use super::frame::{DataFrame, Microstep, step_delay_to_speed};
use super::ramp::SpeedRamp;
use crate::balance::{
    ExpFilter, FilterFactor, LqrGains, LqrRegulator, PidGains, PidRegulator, Regulator,
    RegulatorInput, RegulatorMode, WheelSpeeds, passthrough,
};
use crate::config::{ConfigError, ControllerConfig, OutputMapping, RobotConfig};

/// Raw measurements and commands for one control cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BalanceInput {
    /// Tilt angle (rad)
    pub angle: f32,
    /// Tilt angular rate (rad/s)
    pub angular_rate: f32,
    /// Measured linear speed (rev/s)
    pub speed: f32,
    pub throttle: f32,
    pub rotation: f32,
}

#[derive(Debug, Default)]
struct BalanceState {
    angle_filter: ExpFilter,
    speed_filter: ExpFilter,
    pid: PidRegulator,
    lqr: LqrRegulator,
}

#[derive(Debug)]
struct DriveState {
    enabled: bool,
    microstep: Microstep,
    target: WheelSpeeds,
    ramp: SpeedRamp,
}

/// High-level controller for the two wheel steppers.
///
/// All methods take `&self`; share it between the control loop and any
/// configuration or safety-stop thread with an `Arc`.
pub struct MotorsController<W: Write + Send = Channel> {
    config: RwLock<ControllerConfig>,
    balance: Mutex<BalanceState>,
    drive: Mutex<DriveState>,
    writer: FrameWriter<W>,
}

impl MotorsController<Channel> {
    /// Open the configured channel and build a controller around it
    pub fn open(config: &RobotConfig) -> Result<Self, MotorError> {
        let channel = config.channel.open()?;
        let controller = Self::with_config(channel, config.controller);
        controller.set_microstep(config.microstep);
        Ok(controller)
    }
}

impl<W: Write + Send> MotorsController<W> {
    pub fn new(channel: W) -> Self {
        Self::with_config(channel, ControllerConfig::default())
    }

    pub fn with_config(channel: W, config: ControllerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            balance: Mutex::new(BalanceState::default()),
            drive: Mutex::new(DriveState {
                enabled: false,
                microstep: Microstep::default(),
                target: WheelSpeeds::ZERO,
                ramp: SpeedRamp::new(Instant::now()),
            }),
            writer: FrameWriter::new(channel),
        }
    }

    /// Put the PRU into a known state: motors off, not stepping
    pub fn init(&self) -> Result<(), MotorError> {
        info!("Initializing motors controller");
        let drive = self.lock_drive();
        self.write_state(&drive, false, WheelSpeeds::ZERO)
    }

    // === Configuration ===

    /// Snapshot of the whole configuration
    pub fn config(&self) -> ControllerConfig {
        *self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the whole configuration; the next cycle picks it up
    pub fn set_config(&self, config: ControllerConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    fn update_config(&self, f: impl FnOnce(&mut ControllerConfig)) {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        f(&mut config);
    }

    pub fn set_balancing(&self, enabled: bool) {
        self.update_config(|c| c.balancing = enabled);
    }

    pub fn balancing(&self) -> bool {
        self.config().balancing
    }

    pub fn set_regulator_mode(&self, mode: RegulatorMode) {
        self.update_config(|c| c.mode = mode);
    }

    pub fn regulator_mode(&self) -> RegulatorMode {
        self.config().mode
    }

    pub fn set_lqr_enabled(&self, enabled: bool) {
        let mode = if enabled {
            RegulatorMode::Lqr
        } else {
            RegulatorMode::Pid
        };
        self.set_regulator_mode(mode);
    }

    pub fn lqr_enabled(&self) -> bool {
        self.regulator_mode() == RegulatorMode::Lqr
    }

    pub fn set_speed_filter_factor(&self, factor: f32) -> Result<(), ConfigError> {
        let factor = FilterFactor::new(factor)?;
        self.update_config(|c| c.speed_filter_factor = factor);
        Ok(())
    }

    pub fn speed_filter_factor(&self) -> f32 {
        self.config().speed_filter_factor.get()
    }

    pub fn set_angle_filter_factor(&self, factor: f32) -> Result<(), ConfigError> {
        let factor = FilterFactor::new(factor)?;
        self.update_config(|c| c.angle_filter_factor = factor);
        Ok(())
    }

    pub fn angle_filter_factor(&self) -> f32 {
        self.config().angle_filter_factor.get()
    }

    pub fn set_pid_speed_regulator_enabled(&self, enabled: bool) {
        self.update_config(|c| c.pid_speed_regulator = enabled);
    }

    pub fn pid_speed_regulator_enabled(&self) -> bool {
        self.config().pid_speed_regulator
    }

    pub fn set_pid_gains(&self, gains: PidGains) {
        self.update_config(|c| c.pid = gains);
    }

    pub fn pid_gains(&self) -> PidGains {
        self.config().pid
    }

    pub fn pid_angular_rate_factor(&self) -> f32 {
        self.config().pid.angular_rate_factor
    }

    pub fn set_lqr_gains(&self, gains: LqrGains) {
        self.update_config(|c| c.lqr = gains);
    }

    pub fn lqr_gains(&self) -> LqrGains {
        self.config().lqr
    }

    pub fn set_inverting(&self, invert_left: bool, invert_right: bool) {
        self.update_config(|c| {
            c.outputs.invert_left = invert_left;
            c.outputs.invert_right = invert_right;
        });
    }

    /// (left, right)
    pub fn inverting(&self) -> (bool, bool) {
        let outputs = self.config().outputs;
        (outputs.invert_left, outputs.invert_right)
    }

    pub fn set_motors_swapped(&self, swapped: bool) {
        self.update_config(|c| c.outputs.swapped = swapped);
    }

    pub fn motors_swapped(&self) -> bool {
        self.config().outputs.swapped
    }

    /// Microstep used by `enable_motors`/`disable_motors` frames until the
    /// next `set_motor_speeds`
    pub fn set_microstep(&self, microstep: Microstep) {
        self.lock_drive().microstep = microstep;
    }

    pub fn microstep(&self) -> Microstep {
        self.lock_drive().microstep
    }

    // === Regulation ===

    /// Clear the PID integrators and previous errors
    pub fn zero_regulators(&self) {
        let mut balance = self.lock_balance();
        balance.pid.reset();
        balance.lqr.reset();
    }

    /// Filter the measurements and run the selected regulator.
    ///
    /// `loop_time` (seconds) only feeds the PID integral and derivative terms.
    pub fn calculate_speeds(&self, input: BalanceInput, loop_time: f32) -> WheelSpeeds {
        let config = self.config();
        let mut balance = self.lock_balance();

        let angle = balance
            .angle_filter
            .update(input.angle, config.angle_filter_factor);
        let speed = balance
            .speed_filter
            .update(input.speed, config.speed_filter_factor);

        let filtered = RegulatorInput {
            angle,
            angular_rate: input.angular_rate,
            speed,
            throttle: input.throttle,
            rotation: input.rotation,
        };

        if !config.balancing {
            return passthrough(&filtered);
        }

        let state = &mut *balance;
        state.pid.configure(config.pid, config.pid_speed_regulator);
        state.lqr.configure(config.lqr);
        let regulator: &mut dyn Regulator = match config.mode {
            RegulatorMode::Pid => &mut state.pid,
            RegulatorMode::Lqr => &mut state.lqr,
        };
        regulator.compute(&filtered, loop_time)
    }

    pub fn filtered_angle(&self) -> f32 {
        self.lock_balance().angle_filter.value()
    }

    pub fn filtered_speed(&self) -> f32 {
        self.lock_balance().speed_filter.value()
    }

    // === Motor output ===

    /// Start forwarding speeds to the motors. Stored speeds are unchanged.
    pub fn enable_motors(&self) -> Result<(), MotorError> {
        let mut drive = self.lock_drive();
        let speeds = drive.ramp.current();
        self.write_state(&drive, true, speeds)?;
        if !drive.enabled {
            info!("Motors enabled");
        }
        drive.enabled = true;
        drive.ramp.restart(Instant::now());
        Ok(())
    }

    /// Stop the motors and forget the ramped speeds, so that a later enable
    /// starts from rest
    pub fn disable_motors(&self) -> Result<(), MotorError> {
        let mut drive = self.lock_drive();
        if drive.enabled {
            info!("Motors disabled");
        }
        drive.enabled = false;
        drive.ramp.stop(Instant::now());
        self.write_state(&drive, false, WheelSpeeds::ZERO)
    }

    pub fn motors_enabled(&self) -> bool {
        self.lock_drive().enabled
    }

    /// Ramp towards the target speeds (rev/s) and send the result to the PRU
    pub fn set_motor_speeds(
        &self,
        left: f32,
        right: f32,
        microstep: Microstep,
        ignore_acceleration: bool,
    ) -> Result<(), MotorError> {
        self.set_motor_speeds_at(left, right, microstep, ignore_acceleration, Instant::now())
    }

    /// `set_motor_speeds` with an explicit monotonic timestamp
    pub fn set_motor_speeds_at(
        &self,
        left: f32,
        right: f32,
        microstep: Microstep,
        ignore_acceleration: bool,
        now: Instant,
    ) -> Result<(), MotorError> {
        let mut drive = self.lock_drive();
        drive.target = WheelSpeeds::new(left, right);
        drive.microstep = microstep;

        // Ramped speeds are stored whether or not the motors are enabled;
        // the enabled flag only goes into the frame
        let target = drive.target;
        let ramped = drive.ramp.step(target, now, ignore_acceleration);
        self.write_state(&drive, drive.enabled, ramped)
    }

    /// Last requested (unramped) left speed
    pub fn motor_speed_left_raw(&self) -> f32 {
        self.lock_drive().target.left
    }

    pub fn motor_speed_right_raw(&self) -> f32 {
        self.lock_drive().target.right
    }

    /// Current ramped left speed
    pub fn motor_speed_left(&self) -> f32 {
        self.lock_drive().ramp.current().left
    }

    pub fn motor_speed_right(&self) -> f32 {
        self.lock_drive().ramp.current().right
    }

    fn write_state(
        &self,
        drive: &DriveState,
        enabled: bool,
        speeds: WheelSpeeds,
    ) -> Result<(), MotorError> {
        let config = self.config();
        let physical = physical_speeds(&config.outputs, speeds);
        let frame = DataFrame::encode(
            enabled,
            drive.microstep,
            physical.left,
            physical.right,
            config.idle_step_delay,
        );
        debug!(
            "PRU speeds: left={} right={} rev/s",
            step_delay_to_speed(frame.speed_left, frame.microstep, config.idle_step_delay),
            step_delay_to_speed(frame.speed_right, frame.microstep, config.idle_step_delay)
        );
        self.writer.write_frame(&frame)
    }

    fn lock_drive(&self) -> MutexGuard<'_, DriveState> {
        // Drive state is plain values, always consistent between statements
        self.drive.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_balance(&self) -> MutexGuard<'_, BalanceState> {
        self.balance.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn physical_speeds(outputs: &OutputMapping, logical: WheelSpeeds) -> WheelSpeeds {
    let physical = outputs.apply(logical);
    debug!(
        "Wheel speeds: logical=({}, {}), physical=({}, {})",
        logical.left, logical.right, physical.left, physical.right
    );
    physical
}

impl<W: Write + Send> Drop for MotorsController<W> {
    fn drop(&mut self) {
        if self.motors_enabled() {
            warn!("Motors controller dropped with motors enabled, disabling");
            if let Err(e) = self.disable_motors() {
                warn!("Failed to disable motors on drop: {}", e);
            }
        }
    }
}
