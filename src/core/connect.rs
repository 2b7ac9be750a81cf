//! Establishing a connection: enumerate, select, open, retry.

use crate::link::{ConnectionError, SerialLink};
use crate::prompt::{PortEnumerator, PortSelector, RetryPrompt};
use tracing::{info, warn};

/// Result of [`establish`].
pub enum ConnectOutcome {
    Connected(SerialLink),
    /// No ports were found, or the operator did not choose one.
    NoPort,
    /// Opening failed and the operator declined to retry.
    GaveUp(ConnectionError),
}

/// Connect to an operator-selected port.
///
/// Each failed attempt asks `retry` whether to try again; ports are
/// re-enumerated before every attempt so a device plugged in meanwhile shows
/// up. Retries continue for as long as the operator accepts them.
pub fn establish<O>(
    ports: &dyn PortEnumerator,
    selector: &mut dyn PortSelector,
    retry: &mut dyn RetryPrompt,
    mut open: O,
) -> ConnectOutcome
where
    O: FnMut(&str) -> Result<SerialLink, ConnectionError>,
{
    loop {
        let available = ports.list_available_ports();
        info!(ports = ?available, "Available serial ports");
        if available.is_empty() {
            warn!("No serial ports available");
            return ConnectOutcome::NoPort;
        }

        let Some(port) = selector.select_port(&available) else {
            info!("No serial port was selected");
            return ConnectOutcome::NoPort;
        };

        match open(&port) {
            Ok(link) => {
                info!(port = %port, "Connected");
                return ConnectOutcome::Connected(link);
            }
            Err(e) => {
                warn!("Serial connection failed: {e}");
                if !retry.confirm_retry(&port, &e) {
                    return ConnectOutcome::GaveUp(e);
                }
            }
        }
    }
}
