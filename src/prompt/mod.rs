//! Operator-facing collaborators of the collection core.
//!
//! The session and connection workflow only talk to these traits; a
//! cancelled prompt is `None` (or `false`), never an error.

pub mod console;

use crate::link::{list_available_ports, ConnectionError};
use tracing::warn;

pub use console::{Console, ConsoleInput, InputPoll};

/// Lists the serial ports that could be connected to.
pub trait PortEnumerator {
    fn list_available_ports(&self) -> Vec<String>;
}

/// Chooses one port out of the enumerated ones.
pub trait PortSelector {
    /// Returns `None` when the operator cancels.
    fn select_port(&mut self, ports: &[String]) -> Option<String>;
}

/// Asks whether a failed connection attempt should be retried.
pub trait RetryPrompt {
    fn confirm_retry(&mut self, port: &str, error: &ConnectionError) -> bool;
}

/// Asks for the base name of an export file.
pub trait FilenamePrompt {
    /// Returns `None` when the operator declines to save.
    fn prompt_filename(&mut self, default: &str) -> Option<String>;
}

/// Ports reported by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn list_available_ports(&self) -> Vec<String> {
        match list_available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Could not enumerate serial ports: {e}");
                Vec::new()
            }
        }
    }
}

impl<F> FilenamePrompt for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn prompt_filename(&mut self, default: &str) -> Option<String> {
        self(default)
    }
}
