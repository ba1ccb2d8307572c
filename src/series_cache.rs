//! Resting place for [SeriesCache]

use crate::size_estimator::{Category, Measure};
use std::collections::BTreeMap;


/// Number of zero samples every existing series receives when the monitored function is restarted
pub const RESTART_PADDING: usize = 2;

/// Errors when feeding a [SeriesCache]
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("no checkpoint was registered yet -- a sample for '{name}' has no slot to go")]
    NoCheckpoint { name: String },
    #[error("'{name}' already has a sample for checkpoint #{checkpoint}")]
    AlreadySampled { name: String, checkpoint: usize },
}

/// The checkpoint timeline and, per variable, the samples above the report threshold, aligned to it.\
/// Invariant: no series is ever longer than the timeline -- variables that were silent for some checkpoints
/// get zero samples for those before their next real sample.
#[derive(Debug, Default, Clone)]
pub struct SeriesCache {
    /// elapsed seconds since the session started, for each checkpoint
    checkpoints: Vec<f64>,
    series:      BTreeMap<String, Vec<f64>>,
}

impl SeriesCache {

    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new slot in the timeline
    pub fn push_checkpoint(&mut self, elapsed_secs: f64) {
        self.checkpoints.push(elapsed_secs);
    }

    /// Records `sample` for the latest checkpoint, backfilling with zeros the checkpoints `name` missed
    pub fn record(&mut self, name: &str, sample: f64) -> Result<(), SeriesError> {
        if self.checkpoints.is_empty() {
            return Err(SeriesError::NoCheckpoint { name: name.to_string() })
        }
        let series = self.series.entry(name.to_string()).or_default();
        if series.len() >= self.checkpoints.len() {
            return Err(SeriesError::AlreadySampled { name: name.to_string(), checkpoint: self.checkpoints.len() - 1 })
        }
        series.resize(self.checkpoints.len() - 1, 0.0);
        series.push(sample);
        Ok(())
    }

    /// Marks a restart of the monitored function: [RESTART_PADDING] zeros are appended to every series.
    /// The matching bridging checkpoints are expected to be registered through [Self::push_checkpoint()]
    pub fn pad_restart(&mut self) {
        for series in self.series.values_mut() {
            series.extend([0.0; RESTART_PADDING]);
        }
    }

    /// The last sample of `name` -- if the variable was ever above the threshold
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.series.get(name)?.last().copied()
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item=&str> {
        self.series.keys().map(String::as_str)
    }

    pub fn checkpoints(&self) -> &[f64] {
        &self.checkpoints
    }

    pub fn last_checkpoint(&self) -> Option<f64> {
        self.checkpoints.last().copied()
    }
}

impl Measure for SeriesCache {
    fn category(&self) -> Category {
        Category::ProfilerMarker
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [series_cache](super) module

    use super::*;


    #[test]
    fn silent_checkpoints_are_backfilled() {
        let mut cache = SeriesCache::new();
        cache.push_checkpoint(0.0);
        cache.record("buffer", 1.5).unwrap();
        for elapsed in [1.0, 2.0, 3.0] {
            cache.push_checkpoint(elapsed);
        }
        cache.record("buffer", 4.0).unwrap();
        assert_eq!(cache.series("buffer"), Some(&[1.5, 0.0, 0.0, 4.0][..]), "2 silent checkpoints => 2 zeros before the new sample");
        assert_eq!(cache.latest("buffer"), Some(4.0));
    }

    #[test]
    fn late_comers_are_aligned() {
        let mut cache = SeriesCache::new();
        for elapsed in [0.0, 0.5, 1.0] {
            cache.push_checkpoint(elapsed);
        }
        cache.record("late", 9.0).unwrap();
        assert_eq!(cache.series("late"), Some(&[0.0, 0.0, 9.0][..]));
    }

    #[test]
    fn series_never_outgrow_the_timeline() {
        let mut cache = SeriesCache::new();
        assert_eq!(cache.record("early", 1.0), Err(SeriesError::NoCheckpoint { name: "early".to_string() }));
        cache.push_checkpoint(0.0);
        cache.record("twice", 1.0).unwrap();
        assert_eq!(cache.record("twice", 2.0), Err(SeriesError::AlreadySampled { name: "twice".to_string(), checkpoint: 0 }));
        for (index, name) in ["a", "b", "c"].iter().enumerate() {
            cache.push_checkpoint(index as f64 + 1.0);
            cache.record(name, 1.0).unwrap();
        }
        let timeline = cache.checkpoints().len();
        assert!(cache.names().all(|name| cache.series(name).unwrap().len() <= timeline));
    }

    #[test]
    fn restarts_pad_every_series_with_two_zeros() {
        let mut cache = SeriesCache::new();
        cache.push_checkpoint(0.0);
        cache.record("kept", 3.0).unwrap();
        cache.push_checkpoint(1.0);
        cache.record("other", 2.0).unwrap();
        cache.push_checkpoint(1.00000001);
        cache.push_checkpoint(5.0);
        cache.pad_restart();
        assert_eq!(cache.series("kept"),  Some(&[3.0, 0.0, 0.0][..]));
        assert_eq!(cache.series("other"), Some(&[0.0, 2.0, 0.0, 0.0][..]));
        cache.push_checkpoint(5.5);
        cache.record("kept", 7.0).unwrap();
        assert_eq!(cache.series("kept"),  Some(&[3.0, 0.0, 0.0, 0.0, 7.0][..]), "alignment must survive the restart");
        assert_eq!(cache.latest("missing"), None, "no history means no previous sample");
    }
}
