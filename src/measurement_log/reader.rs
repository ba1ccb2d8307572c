//! Reads back logs written by [MeasurementLog](super::MeasurementLog) -- the counterpart a chart generator relies on

use super::writer::RESTART_MARKER;
use std::{collections::BTreeMap, path::{Path, PathBuf}};


#[derive(Debug, thiserror::Error)]
pub enum LogParseError {
    #[error("couldn't read measurement log '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("line {line}: unrecognized record '{content}'")]
    Malformed { line: usize, content: String },
    #[error("line {line}: measurement found before any checkpoint")]
    OrphanMeasurement { line: usize },
}

/// One line of a measurement log
#[derive(Debug, PartialEq, Clone)]
pub enum LogRecord {
    Checkpoint(f64),
    Measurement { name: String, bytes: u64 },
    Restart,
}

/// A point of a reconstructed series
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SeriesPoint {
    Sample { elapsed: f64, bytes: u64 },
    /// the monitored function was restarted: samples before & after shouldn't be joined
    Break,
}

/// The records of a whole measurement log, in file order
#[derive(Debug, Default, Clone)]
pub struct ParsedLog {
    records: Vec<LogRecord>,
}

/// Reads & parses the log at `path`
pub fn read_log(path: impl AsRef<Path>) -> Result<ParsedLog, LogParseError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|source| LogParseError::Io { path: path.to_path_buf(), source })?;
    ParsedLog::parse(&text)
}

impl ParsedLog {

    pub fn parse(text: &str) -> Result<Self, LogParseError> {
        let mut records = Vec::new();
        let mut inside_checkpoint = false;
        for (index, content) in text.lines().enumerate() {
            let line = index + 1;
            if content.trim().is_empty() {
                continue
            }
            let record = parse_line(content).ok_or_else(|| LogParseError::Malformed { line, content: content.to_string() })?;
            match record {
                LogRecord::Checkpoint(_) => inside_checkpoint = true,
                LogRecord::Measurement { .. } if !inside_checkpoint => return Err(LogParseError::OrphanMeasurement { line }),
                LogRecord::Measurement { .. } => (),
                LogRecord::Restart => inside_checkpoint = false,
            }
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Elapsed seconds of every checkpoint, bridging ones included
    pub fn checkpoints(&self) -> Vec<f64> {
        self.records.iter()
            .filter_map(|record| match record {
                LogRecord::Checkpoint(elapsed) => Some(*elapsed),
                _ => None,
            })
            .collect()
    }

    /// How many times the monitored function was restarted
    pub fn restarts(&self) -> usize {
        self.records.iter().filter(|record| matches!(record, LogRecord::Restart)).count()
    }

    /// Per variable, the measurements above `threshold` in the order they were taken, with a
    /// [SeriesPoint::Break] after each restart that interrupted a variable's series
    pub fn series(&self, threshold: u64) -> BTreeMap<String, Vec<SeriesPoint>> {
        let mut series: BTreeMap<String, Vec<SeriesPoint>> = BTreeMap::new();
        let mut elapsed = 0.0;
        for record in &self.records {
            match record {
                LogRecord::Checkpoint(at) => elapsed = *at,
                LogRecord::Measurement { name, bytes } if *bytes > threshold => {
                    series.entry(name.clone()).or_default().push(SeriesPoint::Sample { elapsed, bytes: *bytes })
                },
                LogRecord::Measurement { .. } => (),
                LogRecord::Restart => {
                    for points in series.values_mut() {
                        if matches!(points.last(), Some(SeriesPoint::Sample { .. })) {
                            points.push(SeriesPoint::Break);
                        }
                    }
                },
            }
        }
        series
    }
}

fn parse_line(content: &str) -> Option<LogRecord> {
    if content == RESTART_MARKER {
        return Some(LogRecord::Restart)
    }
    match content.rsplit_once('\t') {
        Some((name, bytes)) => bytes.trim().parse().ok()
            .map(|bytes| LogRecord::Measurement { name: name.to_string(), bytes }),
        None => content.trim().parse().ok()
            .map(LogRecord::Checkpoint),
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [reader](super) module

    use super::*;


    const TWO_INVOCATIONS: &str = "\
0.000000
numbers\t4024
small\t24
0.500000
numbers\t8024
small\t24
0.500000
2.000000
RESTART
2.000000
numbers\t8024
";

    #[test]
    fn records_and_checkpoints() {
        let parsed = ParsedLog::parse(TWO_INVOCATIONS).unwrap();
        assert_eq!(parsed.records().len(), 11);
        assert_eq!(parsed.records()[1], LogRecord::Measurement { name: "numbers".to_string(), bytes: 4024 });
        assert_eq!(parsed.checkpoints(), vec![0.0, 0.5, 0.5, 2.0, 2.0]);
        assert_eq!(parsed.restarts(), 1);
    }

    #[test]
    fn series_are_filtered_and_broken_at_restarts() {
        let series = ParsedLog::parse(TWO_INVOCATIONS).unwrap().series(100);
        assert_eq!(series.len(), 1, "`small` never goes above the threshold");
        assert_eq!(series["numbers"], vec![
            SeriesPoint::Sample { elapsed: 0.0, bytes: 4024 },
            SeriesPoint::Sample { elapsed: 0.5, bytes: 8024 },
            SeriesPoint::Break,
            SeriesPoint::Sample { elapsed: 2.0, bytes: 8024 },
        ]);
    }

    #[test]
    fn errors_carry_line_numbers() {
        match ParsedLog::parse("0.1\nnumbers\tmany\n") {
            Err(LogParseError::Malformed { line, content }) => assert_eq!((line, content.as_str()), (2, "numbers\tmany")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match ParsedLog::parse("numbers\t10\n") {
            Err(LogParseError::OrphanMeasurement { line }) => assert_eq!(line, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(read_log("/nonexistent/memprof.log"), Err(LogParseError::Io { .. })));
    }
}
