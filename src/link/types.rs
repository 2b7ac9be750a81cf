//! Device protocol and error types for the serial link.

use std::io;
use std::time::Duration;

/// Fixed baud rate of the sensor device.
pub const BAUD_RATE: u32 = 19_200;

/// How long a single line read may block before giving up.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Time the board needs to reset after the port is opened.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Single-byte control commands understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Begin streaming samples (`'s'`).
    Start,
    /// Stop streaming samples (`'p'`).
    Stop,
}

impl DeviceCommand {
    /// The byte sent on the wire.
    pub fn byte(self) -> u8 {
        match self {
            DeviceCommand::Start => b's',
            DeviceCommand::Stop => b'p',
        }
    }
}

impl std::fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceCommand::Start => write!(f, "start ('s')"),
            DeviceCommand::Stop => write!(f, "stop ('p')"),
        }
    }
}

/// Timing parameters used when opening a link.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Errors opening or commanding the device. These always reach the operator.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to send {command} to {port}: {source}")]
    Write {
        port: String,
        command: DeviceCommand,
        #[source]
        source: io::Error,
    },

    #[error("link to {port} is closed")]
    Closed { port: String },
}

/// A single failed read attempt. Absorbed by the reader loop.
#[derive(Debug, thiserror::Error)]
pub enum TransientReadError {
    #[error("serial read failed: {0}")]
    Io(#[from] io::Error),

    #[error("line is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("discarded {0} bytes without a line terminator")]
    Overflow(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(DeviceCommand::Start.byte(), b's');
        assert_eq!(DeviceCommand::Stop.byte(), b'p');
    }

    #[test]
    fn test_default_settings_use_fixed_baud() {
        let settings = LinkSettings::default();
        assert_eq!(settings.baud_rate, 19_200);
        assert_eq!(settings.read_timeout, Duration::from_secs(5));
    }
}
