//! Resting place for [Recording] -- what happens on each checkpoint

use crate::{
    features::OUTPUT,
    measurement_log::MeasurementLog,
    sampling::{CandidateSet, Checkpointer},
    series_cache::SeriesCache,
    size_estimator::{Category, Measure, SizeEstimator},
    utils::presentable_measurements::{size_delta_measurement, size_measurement, SizeUnit},
};
use std::{io, path::Path, time::Instant};


/// How far after the last checkpoint of the previous invocation the first restart bridging checkpoint is placed, in seconds
pub const RESTART_EPSILON: f64 = 1e-8;

const BANNER_RULE: &str = "************";

/// Time references of a session, once started
#[derive(Debug, Clone, Copy)]
struct Clock {
    start:           Instant,
    last_checkpoint: Instant,
}

/// The measuring side of a session: opens & closes the log around each invocation and,
/// on every checkpoint, measures the candidates, logging & reporting them
#[derive(Debug)]
pub struct Recording {
    threshold:      u64,
    unit:           SizeUnit,
    clock:          Option<Clock>,
    log:            Option<MeasurementLog>,
    cache:          SeriesCache,
    estimator:      SizeEstimator,
    restarts:       u64,
    write_failures: u64,
}

impl Recording {

    pub fn new(threshold: u64, unit: SizeUnit) -> Self {
        Self {
            threshold,
            unit,
            clock:          None,
            log:            None,
            cache:          SeriesCache::new(),
            estimator:      SizeEstimator::new(),
            restarts:       0,
            write_failures: 0,
        }
    }

    /// Prepares for an invocation of the monitored function: the first one creates the log & starts the clock;
    /// later ones -- restarts -- reopen the log for appending and record the discontinuity
    pub fn begin(&mut self, log_path: &Path) -> io::Result<()> {
        match self.clock {
            None => {
                self.log = Some(MeasurementLog::create(log_path)?);
                let now = Instant::now();
                self.clock = Some(Clock { start: now, last_checkpoint: now });
            },
            Some(clock) => {
                self.log = Some(MeasurementLog::append(log_path)?);
                let resumed_at = clock.last_checkpoint.duration_since(clock.start).as_secs_f64() + RESTART_EPSILON;
                let restarted_at = clock.start.elapsed().as_secs_f64();
                for elapsed in [resumed_at, restarted_at] {
                    self.cache.push_checkpoint(elapsed);
                    self.write_log(|log| log.write_checkpoint(elapsed));
                }
                self.write_log(MeasurementLog::write_restart);
                self.cache.pad_restart();
                self.restarts += 1;
                log::debug!("restart #{} recorded at {restarted_at:.6}s", self.restarts);
            },
        }
        Ok(())
    }

    /// Closes the log of the current invocation
    pub fn finish(&mut self) -> io::Result<()> {
        match self.log.take() {
            Some(log) => log.close(),
            None => Ok(()),
        }
    }

    pub fn series(&self) -> &SeriesCache {
        &self.cache
    }

    /// how many log writes failed since the session started
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// how many times the monitored function was restarted
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Runs `op` on the open log. Failures are reported but never interrupt the sampling
    fn write_log(&mut self, op: impl FnOnce(&mut MeasurementLog) -> io::Result<()>) {
        let Some(log) = self.log.as_mut() else {
            return
        };
        if let Err(err) = op(log) {
            log::error!("couldn't write to measurement log '{}': {err}", log.path().display());
            if self.write_failures == 0 {
                OUTPUT(&format!("memprof: WARNING: couldn't write to '{}' ({err}) -- the log will be incomplete\n", log.path().display()));
            }
            self.write_failures += 1;
        }
    }
}

impl Checkpointer for Recording {

    fn checkpoint(&mut self, candidates: &CandidateSet<'_>) {
        let Some(clock) = self.clock.as_mut() else {
            log::warn!("checkpoint requested before the session started: ignored");
            return
        };
        let now = Instant::now();
        let from_start = now.duration_since(clock.start).as_secs_f64();
        let since_previous = now.duration_since(clock.last_checkpoint).as_secs_f64();
        clock.last_checkpoint = now;

        OUTPUT(&format!("\n\n{BANNER_RULE}\n{}s (+{}s)\n{BANNER_RULE}\n", from_start as u64, since_previous as u64));
        self.cache.push_checkpoint(from_start);
        self.write_log(|log| log.write_checkpoint(from_start));

        for (name, value) in candidates.interesting() {
            let bytes = self.estimator.estimate(value);
            self.write_log(|log| log.write_measurement(name, bytes));
            if bytes as u64 <= self.threshold {
                continue
            }
            let size = self.unit.scaled(bytes as f64);
            let previous = self.cache.latest(name).unwrap_or(0.0);
            if let Err(err) = self.cache.record(name, size) {
                log::error!("sample of '{name}' not kept: {err}");
            }
            let delta = if previous > 0.0 {
                format!("\t({})", size_delta_measurement(size - previous, self.unit))
            } else {
                String::new()
            };
            OUTPUT(&format!("{name}: {}{delta}\n", size_measurement(size, self.unit)));
        }
    }
}

impl Measure for Recording {
    fn category(&self) -> Category {
        Category::ProfilerMarker
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [recording](super) module

    use super::*;
    use crate::{
        measurement_log::{read_log, LogRecord},
        sampling::{CodeId, Frame, Globals},
        utils::presentable_measurements::size_unit_for,
    };


    const SAMPLED: CodeId = CodeId::new("sampled");

    #[test]
    fn checkpoints_log_every_candidate_and_keep_the_big_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sampled.log");
        let mut recording = Recording::new(100, size_unit_for(100));
        recording.begin(&path).unwrap();
        let globals = Globals::new().with("small", 1u8);
        let big = vec![0u64; 100];
        let stream = std::io::stdout();
        let frame = Frame::new(SAMPLED, &globals)
            .local("big", &big)
            .local("stream", &stream);
        recording.checkpoint(&frame.candidates());
        recording.checkpoint(&frame.candidates());
        recording.finish().unwrap();

        let parsed = read_log(&path).unwrap();
        let names: Vec<&str> = parsed.records().iter()
            .filter_map(|record| match record {
                LogRecord::Measurement { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["big", "small", "big", "small"], "every interesting candidate must be logged -- streams are not");
        assert_eq!(parsed.checkpoints().len(), 2);
        let expected_size = std::mem::size_of::<Vec<u64>>() as f64 + 800.0;
        assert_eq!(recording.series().series("big"), Some(&[expected_size, expected_size][..]));
        assert_eq!(recording.series().series("small"), None, "below the threshold");
    }

    #[test]
    fn restarts_bridge_the_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restarted.log");
        let mut recording = Recording::new(0, size_unit_for(0));
        let globals = Globals::new();
        let numbers = vec![1u32, 2, 3];
        let frame = Frame::new(SAMPLED, &globals).local("numbers", &numbers);

        recording.begin(&path).unwrap();
        recording.checkpoint(&frame.candidates());
        recording.finish().unwrap();
        recording.begin(&path).unwrap();
        recording.checkpoint(&frame.candidates());
        recording.finish().unwrap();

        let cache = recording.series();
        assert_eq!(cache.checkpoints().len(), 4, "1 checkpoint + 2 bridging ones + 1 checkpoint");
        let bridge_gap = cache.checkpoints()[1] - cache.checkpoints()[0];
        assert!((bridge_gap - RESTART_EPSILON).abs() < 1e-12, "the first bridging checkpoint must follow the last one closely -- gap: {bridge_gap}");
        assert_eq!(recording.restarts(), 1);
        let samples = cache.series("numbers").unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(&samples[1..3], &[0.0, 0.0]);
        let parsed = read_log(&path).unwrap();
        assert_eq!(parsed.restarts(), 1);
        assert_eq!(parsed.records()[4], LogRecord::Restart, "checkpoint, measurement, 2 bridging checkpoints, then the marker");
    }

    #[cfg(unix)]
    #[test]
    fn write_failures_do_not_stop_the_sampling() {
        let mut recording = Recording::new(0, size_unit_for(0));
        recording.begin(Path::new("/dev/full")).unwrap();
        let globals = Globals::new();
        let numbers = vec![7u32; 16];
        let frame = Frame::new(SAMPLED, &globals).local("numbers", &numbers);
        // enough lines to overflow the log's buffer a few times
        for _ in 0..2000 {
            recording.checkpoint(&frame.candidates());
        }
        assert!(recording.write_failures() > 0, "a full device must make writes fail");
        assert_eq!(recording.series().checkpoints().len(), 2000, "every checkpoint must still be taken");
        assert_eq!(recording.series().series("numbers").map(<[f64]>::len), Some(2000));
        assert!(recording.finish().is_err(), "the final flush fails as well");
    }

    #[test]
    fn unopenable_logs_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut recording = Recording::new(0, size_unit_for(0));
        assert!(recording.begin(&dir.path().join("missing_dir").join("x.log")).is_err());
        assert_eq!(recording.write_failures(), 0);
    }
}
