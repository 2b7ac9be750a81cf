//! Serial link to the sensor device.
//!
//! This module owns the port handle, the single-byte device protocol and the
//! line reader used by the background collection thread.

pub mod serial;
pub mod types;

// Re-export commonly used types
pub use serial::{list_available_ports, LineReader, SerialLink, MAX_LINE_BYTES};
pub use types::{
    ConnectionError, DeviceCommand, LinkSettings, TransientReadError, BAUD_RATE,
    DEFAULT_READ_TIMEOUT, DEFAULT_SETTLE_DELAY,
};
