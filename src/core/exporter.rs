//! CSV export of collected samples.

use crate::core::sample::SampleBuffer;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Column titles of every export file.
pub const CSV_HEADER: [&str; 13] = [
    "Time",
    "Accel1_X [m/s^2]",
    "Accel1_Y [m/s^2]",
    "Accel1_Z [m/s^2]",
    "Rotation1_X [rad/s]",
    "Rotation1_Y [rad/s]",
    "Rotation1_Z [rad/s]",
    "Accel2_X [m/s^2]",
    "Accel2_Y [m/s^2]",
    "Accel2_Z [m/s^2]",
    "Rotation2_X [rad/s]",
    "Rotation2_Y [rad/s]",
    "Rotation2_Z [rad/s]",
];

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "AccelData";

/// Base name offered when the operator is asked to name an export.
pub const DEFAULT_BASE_NAME: &str = "collected_data";

const LINE_ENDING: &str = "\r\n";

/// Export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes sample buffers to uniquely named CSV files in one directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Find the first unused `<base>.csv`, `<base>_1.csv`, `<base>_2.csv`, ...
    ///
    /// Creates the output directory if needed. Not safe against other
    /// processes writing into the same directory concurrently.
    pub fn resolve_filename(&self, base_name: &str) -> Result<PathBuf, ExportError> {
        let base = validate_base_name(base_name)?;

        fs::create_dir_all(&self.output_dir).map_err(|source| ExportError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let mut counter = 0u32;
        loop {
            let name = if counter == 0 {
                format!("{base}.csv")
            } else {
                format!("{base}_{counter}.csv")
            };
            let path = self.output_dir.join(name);
            if !path.exists() {
                return Ok(path);
            }
            counter += 1;
        }
    }

    /// Write the header and one row per sample to a new file at `path`.
    ///
    /// Fails rather than overwrite an existing file.
    pub fn write(&self, path: &Path, buffer: &SampleBuffer) -> Result<(), ExportError> {
        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(io_err)?;
        let mut out = BufWriter::new(file);

        write_row(&mut out, CSV_HEADER.iter().copied()).map_err(io_err)?;
        for sample in buffer {
            let timestamp = sample.formatted_timestamp();
            let row = std::iter::once(timestamp.as_str())
                .chain(sample.fields().iter().map(String::as_str));
            write_row(&mut out, row).map_err(io_err)?;
        }
        out.flush().map_err(io_err)?;

        Ok(())
    }

    /// Resolve a fresh path for `base_name` and write `buffer` to it.
    pub fn export(&self, base_name: &str, buffer: &SampleBuffer) -> Result<PathBuf, ExportError> {
        let path = self.resolve_filename(base_name)?;
        self.write(&path, buffer)?;
        info!(path = %path.display(), rows = buffer.len(), "Data saved");
        Ok(path)
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

/// Whether `base_name` names a file directly inside the output directory.
pub fn is_valid_base_name(base_name: &str) -> bool {
    let base = base_name.trim();
    let has_separator = base.contains(|c: char| c == '/' || c == '\\');
    !(base.is_empty() || has_separator || base == "." || base == "..")
}

fn validate_base_name(base_name: &str) -> Result<&str, ExportError> {
    if !is_valid_base_name(base_name) {
        return Err(ExportError::InvalidName(base_name.to_string()));
    }
    Ok(base_name.trim())
}

fn write_row<'a, W: Write>(out: &mut W, fields: impl Iterator<Item = &'a str>) -> io::Result<()> {
    let mut first = true;
    for field in fields {
        if !first {
            out.write_all(b",")?;
        }
        first = false;
        out.write_all(escape_csv(field).as_bytes())?;
    }
    out.write_all(LINE_ENDING.as_bytes())
}

/// Quote a field if it contains a delimiter, quote or line break.
fn escape_csv(s: &str) -> String {
    if s.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sample::Sample;
    use tempfile::TempDir;

    fn buffer_of(lines: &[&str]) -> SampleBuffer {
        let mut buffer = SampleBuffer::new();
        for line in lines {
            buffer.push(Sample::new(line));
        }
        buffer
    }

    #[test]
    fn test_resolve_creates_directory() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path().join("AccelData"));

        let path = exporter.resolve_filename("run").unwrap();

        assert!(exporter.output_dir().is_dir());
        assert_eq!(path, dir.path().join("AccelData").join("run.csv"));
    }

    #[test]
    fn test_resolve_skips_existing_names() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        fs::write(dir.path().join("foo.csv"), "").unwrap();
        fs::write(dir.path().join("foo_1.csv"), "").unwrap();

        let path = exporter.resolve_filename("foo").unwrap();

        assert_eq!(path, dir.path().join("foo_2.csv"));
    }

    #[test]
    fn test_resolve_rejects_bad_names() {
        let exporter = Exporter::new(std::env::temp_dir());
        assert!(matches!(
            exporter.resolve_filename("  "),
            Err(ExportError::InvalidName(_))
        ));
        assert!(matches!(
            exporter.resolve_filename("../escape"),
            Err(ExportError::InvalidName(_))
        ));
    }

    #[test]
    fn test_write_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        let buffer = buffer_of(&["1\t2\t3", "4\t5"]);

        let path = exporter.export("run", &buffer).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        let first = buffer.as_slice()[0].formatted_timestamp();
        assert_eq!(lines[1], format!("{first},1,2,3"));
        // ragged rows are written as-is
        assert!(lines[2].ends_with(",4,5"));
    }

    #[test]
    fn test_write_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        let path = dir.path().join("taken.csv");
        fs::write(&path, "keep me").unwrap();

        let result = exporter.write(&path, &buffer_of(&["1"]));

        assert!(matches!(result, Err(ExportError::Io { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_empty_buffer_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());

        let path = exporter.export("empty", &SampleBuffer::new()).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("1.5"), "1.5");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
