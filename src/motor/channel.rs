// Output channel to the PRU and the mutex-guarded frame writer

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tracing::{debug, info};

use super::frame::DataFrame;
use crate::config::{ConfigError, DEVICE_PATH};

pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Error types for the motor output path
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Output channel lock poisoned by a failed writer")]
    ChannelPoisoned,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Boxed output channel used by the real controller
pub type Channel = Box<dyn Write + Send>;

/// Where frames are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// rpmsg character device
    Device { path: PathBuf },
    /// UART-attached step generator
    Serial {
        path: String,
        #[serde(default = "default_baudrate")]
        baud_rate: u32,
    },
    /// Drop every frame (dry run)
    Discard,
}

fn default_baudrate() -> u32 {
    DEFAULT_BAUDRATE
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::Device {
            path: PathBuf::from(DEVICE_PATH),
        }
    }
}

impl ChannelConfig {
    pub fn open(&self) -> Result<Channel, MotorError> {
        match self {
            Self::Device { path } => {
                info!("Opening PRU channel {}", path.display());
                let file = OpenOptions::new().write(true).open(path)?;
                Ok(Box::new(file))
            }
            Self::Serial { path, baud_rate } => {
                info!("Opening serial channel {} at {} baud", path, baud_rate);
                let port = serialport::new(path, *baud_rate)
                    .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
                    .open()?;
                Ok(Box::new(SerialChannel(port)))
            }
            Self::Discard => {
                info!("Frames will be discarded");
                Ok(Box::new(io::sink()))
            }
        }
    }
}

/// Adapts a serial port to the plain `Write` channel interface
struct SerialChannel(Box<dyn SerialPort>);

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Serializes frames onto the channel, one whole frame per lock
pub struct FrameWriter<W> {
    channel: Mutex<W>,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(channel: W) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    /// Write one frame. Failures are returned to the caller, never retried.
    pub fn write_frame(&self, frame: &DataFrame) -> Result<(), MotorError> {
        let bytes = frame.to_bytes();
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| MotorError::ChannelPoisoned)?;
        channel.write_all(&bytes)?;
        channel.flush()?;
        debug!("Wrote frame {:?}", frame);
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> Result<W, MotorError> {
        self.channel
            .into_inner()
            .map_err(|_| MotorError::ChannelPoisoned)
    }
}
