//! Timestamped device readings and the per-run buffer that holds them.
//!
//! Field values are kept as raw text exactly as the device sent them; the
//! collector never interprets or validates channel values.

use chrono::{DateTime, Local};

/// Rendering of sample timestamps (local time, millisecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Separator between fields in a device line.
pub const FIELD_SEPARATOR: char = '\t';

/// One line received from the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    timestamp: DateTime<Local>,
    fields: Vec<String>,
}

impl Sample {
    /// Stamp a line with the current wall-clock time.
    pub fn new(line: &str) -> Self {
        Self::at(Local::now(), line)
    }

    /// Build a sample with an explicit timestamp.
    pub fn at(timestamp: DateTime<Local>, line: &str) -> Self {
        Self {
            timestamp,
            fields: line.split(FIELD_SEPARATOR).map(str::to_string).collect(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Timestamp as written to the export file.
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Samples of one collection run, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample at the end of the buffer.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Drop all samples, keeping the allocation for the next run.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Extend<Sample> for SampleBuffer {
    fn extend<I: IntoIterator<Item = Sample>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}

impl<'a> IntoIterator for &'a SampleBuffer {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
