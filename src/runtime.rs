// Odometry speed test: drive both wheels at a constant speed for a fixed
// time, integrate the pose from the reported wheel speeds, then stop.

use std::path::PathBuf;
use std::thread::sleep;
use std::time::Instant;

use clap::Parser;
use tracing::info;

use crate::config::{RUNNER_PERIOD, RobotConfig};
use crate::motor::{ChannelConfig, Microstep, MotorsController};
use crate::odometry::{Pose, wheel_ground_speed};

#[derive(Debug, Clone, Parser)]
#[command(about = "Drive both wheels at a constant speed and report odometry")]
pub struct Args {
    /// How long to command the speed, in seconds
    pub time: f32,
    /// Microstep divisor (1, 2, 4, 8, 16 or 32)
    pub microstep: u8,
    /// Wheel speed in rev/s
    pub speed: f32,
    /// Wheel radius in meters
    pub wheel_radius: f32,
    /// Distance between the wheels in meters
    pub base_width: f32,
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override the output device path
    #[arg(long)]
    pub device: Option<PathBuf>,
}

/// Result of a finished run
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub elapsed: f32,
    pub pose: Pose,
}

pub fn run(args: Args) -> Result<RunReport, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    if let Some(path) = &args.device {
        config.channel = ChannelConfig::Device { path: path.clone() };
    }
    let microstep = Microstep::new(args.microstep)?;

    info!("Initializing motors...");
    let controller = MotorsController::open(&config)?;
    controller.init()?;
    info!("Enabling motors...");
    controller.enable_motors()?;

    let result = drive(&controller, &args, microstep);

    // Disable even if the run failed; the run error takes precedence
    info!("Disabling motors");
    let disabled = controller.disable_motors();
    let report = result?;
    disabled?;

    info!("Time elapsed: {:.3}s", report.elapsed);
    info!("Position: x={:.4}m y={:.4}m", report.pose.x, report.pose.y);
    info!("Heading: {:.4}rad", report.pose.heading);
    Ok(report)
}

fn drive<W: std::io::Write + Send>(
    controller: &MotorsController<W>,
    args: &Args,
    microstep: Microstep,
) -> Result<RunReport, Box<dyn std::error::Error + Send + Sync>> {
    info!(
        "Running: {} rev/s for {}s at 1/{} microstep",
        args.speed,
        args.time,
        microstep.divisor()
    );

    let start = Instant::now();
    let mut previous = start;
    let mut pose = Pose::default();
    let mut speed = args.speed;

    loop {
        // Speeds the wheels actually ran at since the previous iteration
        let left = wheel_ground_speed(controller.motor_speed_left(), args.wheel_radius);
        let right = wheel_ground_speed(controller.motor_speed_right(), args.wheel_radius);

        controller.set_motor_speeds(speed, speed, microstep, false)?;

        let now = Instant::now();
        let loop_time = now.duration_since(previous).as_secs_f32();
        previous = now;
        pose.integrate(left, right, args.base_width, loop_time);

        let elapsed = now.duration_since(start).as_secs_f32();
        if elapsed > args.time {
            speed = 0.0;
            if left == 0.0 && right == 0.0 {
                return Ok(RunReport { elapsed, pose });
            }
        }

        sleep(RUNNER_PERIOD);
    }
}
