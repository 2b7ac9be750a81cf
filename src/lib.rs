//! Accelerometer Data Collector - serial sample capture to CSV.
//!
//! This library drives a dual-IMU accelerometer board over a serial port.
//! The device streams tab-separated readings once it receives `'s'` and stops
//! on `'p'`. Every received line is timestamped on arrival and buffered until
//! the run is paused, when it is written to a fresh CSV file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Accelerometer Data Collector               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │ SerialLink  │──▶│   Reader    │──▶│   Sample    │        │
//! │  │ (19200 bd)  │   │  (thread)   │   │   Buffer    │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │         ▲                 │                  │              │
//! │         │                 ▼                  ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Session   │   │ Collection  │   │  Exporter   │        │
//! │  │ (start/stop)│   │   Stats     │   │   (CSV)     │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use accel_data_collector::{core, link};
//!
//! let link = link::SerialLink::open("/dev/ttyUSB0", &link::LinkSettings::default())
//!     .expect("Failed to open port");
//! let mut session = core::Session::new(link, core::Exporter::default());
//!
//! session.start().expect("Failed to start collection");
//! // ... later
//! let report = session.pause(&mut |default: &str| Some(default.to_string()));
//! ```

pub mod config;
pub mod core;
pub mod link;
pub mod prompt;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    establish, ConnectOutcome, ExportError, ExportOutcome, Exporter, PauseReport, Sample,
    SampleBuffer, Session, SessionError, SessionState, StartOutcome, TransientReadPolicy,
};
pub use link::{ConnectionError, DeviceCommand, LinkSettings, SerialLink, TransientReadError};
pub use prompt::{FilenamePrompt, PortEnumerator, PortSelector, RetryPrompt};
pub use stats::{CollectionStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commands accepted by the interactive `collect` loop.
pub const COMMAND_HELP: &str = r#"
Commands:
  start, s      Begin collecting samples
  pause, p      Stop collecting and save the samples to CSV
  status        Show the session state and statistics
  reconnect     Close the port and choose a device again
  help          Show this help
  quit, q       Close the port and exit (unsaved samples are discarded)
"#;
