//! Resting place for [MeasurementLog]

use crate::size_estimator::{Category, Measure};
use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};


/// The literal line marking a discontinuity -- a restart of the monitored function
pub const RESTART_MARKER: &str = "RESTART";

/// Append-only text record of every checkpoint & raw measurement of a session:
///   - `<elapsed seconds, 6 decimals>` opens a checkpoint;
///   - `<name>\t<bytes>` records one measurement of the preceding checkpoint;
///   - [RESTART_MARKER] separates invocations.
#[derive(Debug)]
pub struct MeasurementLog {
    path:   PathBuf,
    writer: BufWriter<File>,
}

impl MeasurementLog {

    /// Creates (or truncates) the log at `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        log::debug!("measurement log '{}' created", path.display());
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    /// Opens the log at `path` for appending -- creating it if needed
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::debug!("measurement log '{}' reopened for appending", path.display());
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    pub fn write_checkpoint(&mut self, elapsed_secs: f64) -> io::Result<()> {
        writeln!(self.writer, "{elapsed_secs:.6}")
    }

    /// Records `bytes` for `name`. Tabs & line breaks in `name` would break the format, so they become `_`
    pub fn write_measurement(&mut self, name: &str, bytes: usize) -> io::Result<()> {
        writeln!(self.writer, "{}\t{bytes}", sanitize(name))
    }

    pub fn write_restart(&mut self) -> io::Result<()> {
        writeln!(self.writer, "{RESTART_MARKER}")
    }

    /// Flushes & closes the log
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        log::debug!("measurement log '{}' closed", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Measure for MeasurementLog {
    fn category(&self) -> Category {
        Category::ProfilerMarker
    }
}

fn sanitize(name: &str) -> String {
    name.replace(['\t', '\n', '\r'], "_")
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [writer](super) module

    use super::*;


    #[test]
    fn line_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("format.log");
        let mut log = MeasurementLog::create(&path).unwrap();
        log.write_checkpoint(0.0).unwrap();
        log.write_measurement("numbers", 4024).unwrap();
        log.write_measurement("odd\tname\n", 8).unwrap();
        log.write_restart().unwrap();
        log.write_checkpoint(1.25).unwrap();
        log.close().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "0.000000\nnumbers\t4024\nodd_name_\t8\nRESTART\n1.250000\n");
    }

    #[test]
    fn create_truncates_and_append_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modes.log");
        std::fs::write(&path, "stale contents\n").unwrap();
        let mut log = MeasurementLog::create(&path).unwrap();
        log.write_checkpoint(1.0).unwrap();
        log.close().unwrap();
        let mut log = MeasurementLog::append(&path).unwrap();
        assert_eq!(log.path(), path.as_path());
        log.write_restart().unwrap();
        log.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1.000000\nRESTART\n");
    }
}
