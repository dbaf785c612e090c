// Motor output for the balancing robot
//
// Provides:
// - PRU frame format and speed <-> step delay conversion
// - Acceleration-limited speed ramp
// - Mutex-guarded output channel (rpmsg device, serial port or discard)
// - High-level motors controller API

pub mod channel;
mod controller;
pub mod frame;
pub mod ramp;

pub use channel::{Channel, ChannelConfig, FrameWriter, MotorError};
pub use controller::{BalanceInput, MotorsController};
pub use frame::{DataFrame, Microstep, FRAME_LEN};
pub use ramp::SpeedRamp;
