//! The start/pause collection session.
//!
//! A [`Session`] is either idle or collecting. Starting sends the device its
//! start command and lends the link's read half to a background thread that
//! turns every non-empty line into a [`Sample`]. Pausing sends the stop
//! command, joins that thread, hands the samples to the [`Exporter`] and clears
//! the buffer.
//!
//! Samples travel from the reader thread over a channel whose sender is owned
//! by the thread; once the join returns, no sample can be added to the run
//! that was just handed off.

use crate::core::exporter::{ExportError, Exporter, DEFAULT_BASE_NAME};
use crate::core::sample::{Sample, SampleBuffer, TIMESTAMP_FORMAT};
use crate::link::{ConnectionError, DeviceCommand, LineReader, SerialLink};
use crate::prompt::FilenamePrompt;
use crate::stats::{create_shared_stats, SharedStats};
use chrono::Local;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Collection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Collecting,
}

/// What the reader does when a single read attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransientReadPolicy {
    /// Skip the failed read and keep collecting.
    #[default]
    ContinueOnTransientReadError,
    /// End the reader on the first failed read. Samples already read are kept.
    Abort,
}

/// Result of [`Session::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyCollecting,
}

/// What happened to the samples of a paused run.
#[derive(Debug)]
pub enum ExportOutcome {
    Written { path: PathBuf, rows: usize },
    /// The operator declined to name a file.
    Skipped,
    Failed(ExportError),
}

/// Result of [`Session::pause`].
#[derive(Debug)]
pub struct PauseReport {
    /// Samples collected during the run.
    pub samples: usize,
    /// Whether the device received the stop command.
    pub stop_command: Result<(), ConnectionError>,
    pub export: ExportOutcome,
}

/// Errors starting a collection run.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Command(#[from] ConnectionError),

    #[error("serial link has no reader available; reconnect the device")]
    ReaderUnavailable,

    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

struct ReaderTask {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<LineReader>,
    samples: Receiver<Sample>,
}

/// Controls data collection from one device.
pub struct Session {
    link: SerialLink,
    exporter: Exporter,
    stats: SharedStats,
    policy: TransientReadPolicy,
    default_base_name: String,
    buffer: SampleBuffer,
    reader: Option<ReaderTask>,
}

impl Session {
    pub fn new(link: SerialLink, exporter: Exporter) -> Self {
        Self {
            link,
            exporter,
            stats: create_shared_stats(),
            policy: TransientReadPolicy::default(),
            default_base_name: DEFAULT_BASE_NAME.to_string(),
            buffer: SampleBuffer::new(),
            reader: None,
        }
    }

    /// Count activity into shared statistics.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_read_policy(mut self, policy: TransientReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Name offered by the filename prompt.
    pub fn with_default_base_name(mut self, name: impl Into<String>) -> Self {
        self.default_base_name = name.into();
        self
    }

    pub fn state(&self) -> SessionState {
        if self.reader.is_some() {
            SessionState::Collecting
        } else {
            SessionState::Idle
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.state() == SessionState::Collecting
    }

    pub fn port_name(&self) -> &str {
        self.link.port_name()
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// Whether the reader stopped on its own (see [`TransientReadPolicy::Abort`]).
    pub fn reader_finished(&self) -> bool {
        self.reader
            .as_ref()
            .map(|task| task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Begin a collection run.
    ///
    /// Input left over from an earlier run is discarded first. No-op while
    /// already collecting. If the device does not accept the start command
    /// the session stays idle and no reader is spawned.
    pub fn start(&mut self) -> Result<StartOutcome, SessionError> {
        if self.reader.is_some() {
            debug!("Start requested while already collecting");
            return Ok(StartOutcome::AlreadyCollecting);
        }

        let mut line_reader = self
            .link
            .take_reader()
            .ok_or(SessionError::ReaderUnavailable)?;

        // Leftovers of the previous run must not reach this one.
        self.link.clear_input();
        line_reader.reset();

        if let Err(e) = self.link.write_command(DeviceCommand::Start) {
            self.link.restore_reader(line_reader);
            warn!("Device did not receive start command: {e}");
            return Err(e.into());
        }

        self.buffer.clear();
        let (sender, samples) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = stop.clone();
            let stats = self.stats.clone();
            let policy = self.policy;
            thread::Builder::new()
                .name("serial-reader".to_string())
                .spawn(move || run_reader(line_reader, stop, sender, stats, policy))
        };

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                error!("Could not spawn reader thread: {e}");
                let _ = self.link.write_command(DeviceCommand::Stop);
                return Err(SessionError::Spawn(e));
            }
        };

        self.reader = Some(ReaderTask {
            stop,
            handle,
            samples,
        });
        info!(port = %self.link.port_name(), "Collection started");
        Ok(StartOutcome::Started)
    }

    /// End the current run and hand its samples to the exporter.
    ///
    /// Returns `None` when idle. Otherwise waits for the reader to exit, asks
    /// `prompt` for a base name, writes the file if one was given, and clears
    /// the buffer whatever the outcome. A failed stop command is reported but
    /// does not prevent the export.
    pub fn pause(&mut self, prompt: &mut dyn FilenamePrompt) -> Option<PauseReport> {
        let task = self.reader.take()?;

        task.stop.store(true, Ordering::SeqCst);
        let stop_command = self.link.write_command(DeviceCommand::Stop);
        if let Err(e) = &stop_command {
            warn!("Device did not receive stop command: {e}");
        }

        self.finish_reader(task);
        let samples = self.buffer.len();
        self.stats.record_run_completed();
        info!(samples, "Collection paused");

        let export = match prompt.prompt_filename(&self.default_base_name) {
            Some(name) => match self.exporter.export(&name, &self.buffer) {
                Ok(path) => {
                    self.stats.record_export(samples as u64);
                    ExportOutcome::Written {
                        path,
                        rows: samples,
                    }
                }
                Err(e) => {
                    warn!("Export failed: {e}");
                    ExportOutcome::Failed(e)
                }
            },
            None => {
                info!(samples, "Export skipped");
                ExportOutcome::Skipped
            }
        };

        self.buffer.clear();

        Some(PauseReport {
            samples,
            stop_command,
            export,
        })
    }

    /// Samples of the current run received so far.
    pub fn snapshot(&mut self) -> &SampleBuffer {
        if let Some(task) = &self.reader {
            self.buffer.extend(task.samples.try_iter());
        }
        &self.buffer
    }

    /// Stop any running collection without exporting, then close the link.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.reader.take() {
            task.stop.store(true, Ordering::SeqCst);
            if let Err(e) = self.link.write_command(DeviceCommand::Stop) {
                debug!("Stop command during shutdown failed: {e}");
            }
            self.finish_reader(task);
            if !self.buffer.is_empty() {
                warn!(
                    samples = self.buffer.len(),
                    "Discarding samples that were not exported"
                );
            }
            self.buffer.clear();
        }
        self.link.close();
    }

    /// Join the reader, take back the read half and collect its last samples.
    fn finish_reader(&mut self, task: ReaderTask) {
        match task.handle.join() {
            Ok(line_reader) => self.link.restore_reader(line_reader),
            Err(_) => error!("Reader thread panicked; reconnect to collect again"),
        }
        self.buffer.extend(task.samples.try_iter());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Background read loop. Returns the read half once stopped.
fn run_reader(
    mut reader: LineReader,
    stop: Arc<AtomicBool>,
    samples: Sender<Sample>,
    stats: SharedStats,
    policy: TransientReadPolicy,
) -> LineReader {
    let mut last_timestamp = None;

    while !stop.load(Ordering::SeqCst) {
        match reader.next_line() {
            Ok(Some(line)) => {
                // Wall-clock steps backwards must not reorder the run.
                let now = Local::now();
                let timestamp = match last_timestamp {
                    Some(prev) if prev > now => prev,
                    _ => now,
                };
                last_timestamp = Some(timestamp);

                debug!("{} - {line}", timestamp.format(TIMESTAMP_FORMAT));
                stats.record_sample();
                if samples.send(Sample::at(timestamp, &line)).is_err() {
                    break;
                }
            }
            Ok(None) => stats.record_empty_read(),
            Err(e) => {
                stats.record_read_error();
                match policy {
                    TransientReadPolicy::ContinueOnTransientReadError => {
                        trace!("Skipping failed read: {e}");
                    }
                    TransientReadPolicy::Abort => {
                        warn!("Reader stopped after failed read: {e}");
                        break;
                    }
                }
            }
        }
    }

    reader
}
