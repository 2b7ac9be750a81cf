//! Terminal implementation of the operator prompts.
//!
//! Standard input is read on a dedicated thread and forwarded line by line
//! over a channel, so the command loop can keep checking for Ctrl+C while it
//! waits for the operator.

use crate::core::exporter::is_valid_base_name;
use crate::link::ConnectionError;
use crate::prompt::{FilenamePrompt, PortSelector, RetryPrompt};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of waiting briefly for a line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum InputPoll {
    Line(String),
    Idle,
    Closed,
}

/// Lines typed by the operator. Clones share the same input stream.
#[derive(Clone)]
pub struct ConsoleInput {
    lines: Receiver<String>,
    running: Arc<AtomicBool>,
}

impl ConsoleInput {
    /// Start forwarding standard input. Reading stops at EOF.
    pub fn spawn(running: Arc<AtomicBool>) -> Self {
        let (sender, receiver) = unbounded();

        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        Self::from_receiver(receiver, running)
    }

    /// Read lines from an existing channel.
    pub fn from_receiver(lines: Receiver<String>, running: Arc<AtomicBool>) -> Self {
        Self { lines, running }
    }

    /// Wait up to `timeout` for the next line.
    pub fn poll(&self, timeout: Duration) -> InputPoll {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => InputPoll::Line(line),
            Err(RecvTimeoutError::Timeout) => InputPoll::Idle,
            Err(RecvTimeoutError::Disconnected) => InputPoll::Closed,
        }
    }

    /// Block until a line arrives. `None` at EOF or once Ctrl+C was pressed.
    pub fn next_line(&self) -> Option<String> {
        while self.running.load(Ordering::SeqCst) {
            match self.poll(POLL_INTERVAL) {
                InputPoll::Line(line) => return Some(line),
                InputPoll::Idle => continue,
                InputPoll::Closed => return None,
            }
        }
        None
    }
}

/// Console prompts for port selection, retries and file names.
#[derive(Clone)]
pub struct Console {
    input: ConsoleInput,
    preferred_port: Option<String>,
}

impl Console {
    pub fn new(input: ConsoleInput) -> Self {
        Self {
            input,
            preferred_port: None,
        }
    }

    /// Port offered as the default selection when present.
    pub fn set_preferred_port(&mut self, port: Option<String>) {
        self.preferred_port = port;
    }

    pub fn input(&self) -> &ConsoleInput {
        &self.input
    }

    fn ask(&self, question: &str) -> Option<String> {
        print!("{question}");
        let _ = io::stdout().flush();
        self.input.next_line().map(|line| line.trim().to_string())
    }
}

impl PortSelector for Console {
    fn select_port(&mut self, ports: &[String]) -> Option<String> {
        let default = match &self.preferred_port {
            Some(p) if ports.contains(p) => Some(p.clone()),
            _ if ports.len() == 1 => Some(ports[0].clone()),
            _ => None,
        };

        println!("Select a serial port:");
        for (i, port) in ports.iter().enumerate() {
            let marker = if default.as_ref() == Some(port) {
                " (default)"
            } else {
                ""
            };
            println!("  {}) {port}{marker}", i + 1);
        }

        loop {
            let answer = self.ask("Port number or name, 'q' to cancel: ")?;

            if answer.eq_ignore_ascii_case("q") {
                return None;
            }
            if answer.is_empty() {
                if default.is_some() {
                    return default;
                }
                continue;
            }
            if let Ok(n) = answer.parse::<usize>() {
                if let Some(port) = n.checked_sub(1).and_then(|i| ports.get(i)) {
                    return Some(port.clone());
                }
            } else if ports.contains(&answer) {
                return Some(answer);
            }
            println!("Invalid selection: {answer}");
        }
    }
}

impl RetryPrompt for Console {
    fn confirm_retry(&mut self, port: &str, error: &ConnectionError) -> bool {
        println!("Failed to connect to {port}: {error}");
        matches!(
            self.ask("Would you like to try again? [y/N]: ")
                .map(|a| a.to_ascii_lowercase())
                .as_deref(),
            Some("y") | Some("yes")
        )
    }
}

impl FilenamePrompt for Console {
    fn prompt_filename(&mut self, default: &str) -> Option<String> {
        loop {
            let answer = self.ask(&format!(
                "Enter filename (without .csv) [{default}], '-' to discard: "
            ))?;

            if answer == "-" {
                return None;
            }
            let name = if answer.is_empty() {
                default.to_string()
            } else {
                answer
            };
            if is_valid_base_name(&name) {
                return Some(name);
            }
            println!("Please enter a plain file name");
        }
    }
}
