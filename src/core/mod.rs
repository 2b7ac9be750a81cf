//! Core collection logic.
//!
//! This module contains:
//! - Samples and the per-run sample buffer
//! - CSV export with collision-free file naming
//! - The start/pause session state machine
//! - The interactive connection workflow

pub mod connect;
pub mod exporter;
pub mod sample;
pub mod session;

// Re-export commonly used types
pub use connect::{establish, ConnectOutcome};
pub use exporter::{
    is_valid_base_name, ExportError, Exporter, CSV_HEADER, DEFAULT_BASE_NAME, DEFAULT_OUTPUT_DIR,
};
pub use sample::{Sample, SampleBuffer, TIMESTAMP_FORMAT};
pub use session::{
    ExportOutcome, PauseReport, Session, SessionError, SessionState, StartOutcome,
    TransientReadPolicy,
};
