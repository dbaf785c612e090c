// Keyboard wheel test with balancing off: W/S throttle, A/D rotate, R/F speed, Q quit
//
// Usage: cargo run --example wheel_teleop -- [config.json]
//
// Keep the wheels OFF THE GROUND: there is no balancing in this mode.

use balancebot_motors::config::RobotConfig;
use balancebot_motors::motor::{BalanceInput, MotorsController};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

const THROTTLES: [f32; 3] = [0.2, 0.6, 1.2]; // rev/s
const ROTATIONS: [f32; 3] = [0.1, 0.3, 0.6]; // rev/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset commands after this much time with no input
const POLL_MS: u64 = 10;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = match std::env::args().nth(1) {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };

    let controller = MotorsController::open(&config)?;
    controller.set_balancing(false);
    controller.init()?;
    controller.enable_motors()?;

    info!("Controls: W/S=throttle, A/D=rotate, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&controller, &config);
    disable_raw_mode()?;

    controller.disable_motors()?;
    result
}

fn run_teleop(
    controller: &MotorsController,
    config: &RobotConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    let mut throttle = 0.0;
    let mut rotation = 0.0;
    let mut last_movement_input = Instant::now();
    let mut previous = Instant::now();

    loop {
        if event::poll(Duration::from_millis(POLL_MS))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        throttle = THROTTLES[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        throttle = -THROTTLES[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        rotation = -ROTATIONS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        rotation = ROTATIONS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            throttle = 0.0;
            rotation = 0.0;
        }

        let now = Instant::now();
        let loop_time = now.duration_since(previous).as_secs_f32();
        previous = now;

        let input = BalanceInput {
            throttle,
            rotation,
            ..Default::default()
        };
        let speeds = controller.calculate_speeds(input, loop_time);
        controller.set_motor_speeds(speeds.left, speeds.right, config.microstep, false)?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
