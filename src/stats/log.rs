//! Collection statistics.
//!
//! Counters are updated by the background reader and the foreground session
//! without locking. When a persistence path is set, totals accumulate across
//! invocations so `accel-collector status` can report them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Statistics for the current process.
#[derive(Debug)]
pub struct CollectionStats {
    /// Lines turned into samples
    samples_recorded: AtomicU64,
    /// Read attempts that produced no data
    empty_reads: AtomicU64,
    /// Read attempts that failed and were skipped
    read_errors: AtomicU64,
    /// Start/pause cycles completed
    runs_completed: AtomicU64,
    /// CSV files written
    files_exported: AtomicU64,
    /// Data rows written across all files
    rows_exported: AtomicU64,
    /// Process start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl CollectionStats {
    pub fn new() -> Self {
        Self {
            samples_recorded: AtomicU64::new(0),
            empty_reads: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            files_exported: AtomicU64::new(0),
            rows_exported: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create statistics that continue from totals saved at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            warn!("Could not load previous statistics: {e}");
        }

        stats
    }

    pub fn record_sample(&self) {
        self.samples_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_read(&self) {
        self.empty_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a written file and its data row count.
    pub fn record_export(&self, rows: u64) {
        self.files_exported.fetch_add(1, Ordering::Relaxed);
        self.rows_exported.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_recorded: self.samples_recorded.load(Ordering::Relaxed),
            empty_reads: self.empty_reads.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            files_exported: self.files_exported.load(Ordering::Relaxed),
            rows_exported: self.rows_exported.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Summary text for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Collection Statistics:\n\
             - Samples recorded: {}\n\
             - Skipped reads: {} (errors), {} (no data)\n\
             - Runs completed: {}\n\
             - Files exported: {} ({} rows)\n\
             - Session duration: {} seconds",
            stats.samples_recorded,
            stats.read_errors,
            stats.empty_reads,
            stats.runs_completed,
            stats.files_exported,
            stats.rows_exported,
            stats.session_duration_secs
        )
    }

    /// Save totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                samples_recorded: stats.samples_recorded,
                read_errors: stats.read_errors,
                runs_completed: stats.runs_completed,
                files_exported: stats.files_exported,
                rows_exported: stats.rows_exported,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_recorded
                    .store(persisted.samples_recorded, Ordering::Relaxed);
                self.read_errors
                    .store(persisted.read_errors, Ordering::Relaxed);
                self.runs_completed
                    .store(persisted.runs_completed, Ordering::Relaxed);
                self.files_exported
                    .store(persisted.files_exported, Ordering::Relaxed);
                self.rows_exported
                    .store(persisted.rows_exported, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.samples_recorded.store(0, Ordering::Relaxed);
        self.empty_reads.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.runs_completed.store(0, Ordering::Relaxed);
        self.files_exported.store(0, Ordering::Relaxed);
        self.rows_exported.store(0, Ordering::Relaxed);
    }
}

impl Default for CollectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub samples_recorded: u64,
    pub empty_reads: u64,
    pub read_errors: u64,
    pub runs_completed: u64,
    pub files_exported: u64,
    pub rows_exported: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk format. Empty reads are not worth keeping across runs.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub samples_recorded: u64,
    pub read_errors: u64,
    pub runs_completed: u64,
    pub files_exported: u64,
    pub rows_exported: u64,
    pub last_updated: DateTime<Utc>,
}

/// Statistics shared between the session and its reader thread.
pub type SharedStats = Arc<CollectionStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(CollectionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(CollectionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_counting() {
        let stats = CollectionStats::new();

        stats.record_sample();
        stats.record_sample();
        stats.record_read_error();
        stats.record_export(2);

        let snap = stats.snapshot();
        assert_eq!(snap.samples_recorded, 2);
        assert_eq!(snap.read_errors, 1);
        assert_eq!(snap.files_exported, 1);
        assert_eq!(snap.rows_exported, 2);
    }

    #[test]
    fn test_reset() {
        let stats = CollectionStats::new();
        stats.record_sample();
        stats.record_empty_read();
        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.samples_recorded, 0);
        assert_eq!(snap.empty_reads, 0);
    }

    #[test]
    fn test_totals_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");

        let stats = CollectionStats::with_persistence(path.clone());
        stats.record_sample();
        stats.record_run_completed();
        stats.save().unwrap();

        let reloaded = CollectionStats::with_persistence(path);
        let snap = reloaded.snapshot();
        assert_eq!(snap.samples_recorded, 1);
        assert_eq!(snap.runs_completed, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = CollectionStats::new().summary();
        assert!(summary.contains("Samples recorded"));
        assert!(summary.contains("Files exported"));
    }
}
