//! Resting place for [ProfilerSession]

use super::{
    config::{Config, Settings},
    recording::Recording,
};
use crate::{
    charts::{ChartGenerator, ExternalPlotter},
    features::OUTPUT,
    sampling::{CodeId, Globals, InstrumentationHandle, SamplingDriver},
    series_cache::SeriesCache,
    size_estimator::{Category, Measure},
};
use std::{
    cell::{Ref, RefCell},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    rc::Rc,
};


/// Errors preventing a monitored function from being run
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("couldn't open the measurement log '{path}': {source}")]
    OpenLog { path: PathBuf, source: std::io::Error },
}

/// Profiles the memory used by the variables of one function, across all of its invocations through [Self::call()].\
/// Each call measures the function's frames -- as emitted through [crate::trace] -- on entry, on exit and,
/// for long running calls, periodically, reporting the variables above the threshold & logging all of them.
/// ```
///     use memprof::{trace, CodeId, Config, Frame, Globals, ProfilerSession};
///     const GROW: CodeId = CodeId::new("grow");
///     fn grow(globals: &Globals) -> usize {
///         let mut numbers = Vec::<u64>::new();
///         trace::call(&Frame::new(GROW, globals).local("numbers", &numbers));
///         numbers.extend(0..1000);
///         trace::ret(&Frame::new(GROW, globals).local("numbers", &numbers));
///         numbers.len()
///     }
///     let dir = std::env::temp_dir();
///     let globals = Globals::new();
///     let mut session = ProfilerSession::new(GROW, &globals, Config::default()
///         .threshold(0)
///         .log_path(dir.join("memprof_doc_grow.log")));
///     let len = session.call(|| grow(&globals)).expect("log couldn't be opened");
///     assert_eq!(len, 1000);
///     assert_eq!(session.series().checkpoints().len(), 2);
/// ```
pub struct ProfilerSession {
    code:            CodeId,
    settings:        Settings,
    recording:       Rc<RefCell<Recording>>,
    chart_generator: Box<dyn ChartGenerator>,
    invocations:     u64,
}

impl ProfilerSession {

    /// Sets up a session for the function identified by `code`, whose program globals are `globals`.
    /// Nothing is measured nor written before the first [Self::call()]
    pub fn new(code: CodeId, globals: &Globals, config: Config) -> Self {
        let settings = Settings::resolve(code, globals, config);
        log::debug!("profiling '{code}' with {settings:?}");
        Self {
            code,
            recording:       Rc::new(RefCell::new(Recording::new(settings.threshold, settings.unit))),
            settings,
            chart_generator: Box::new(ExternalPlotter::default()),
            invocations:     0,
        }
    }

    /// Replaces the [ExternalPlotter] used when charts are enabled
    pub fn with_chart_generator(mut self, chart_generator: impl ChartGenerator + 'static) -> Self {
        self.chart_generator = Box::new(chart_generator);
        self
    }

    /// Runs `monitored` -- an invocation of the profiled function -- with sampling armed in the current thread.\
    /// Whatever `monitored` returns is given back untouched; if it panics, the panic resumes once
    /// the previous [TraceHook](crate::sampling::TraceHook) is back and the log is closed.\
    /// Fails, without running `monitored`, only if the log can't be opened.
    pub fn call<R>(&mut self, monitored: impl FnOnce() -> R) -> Result<R, ProfileError> {
        OUTPUT(&format!("memprof starting (min. size: {})\n", self.settings.threshold));
        self.recording.borrow_mut().begin(&self.settings.log_path)
            .map_err(|source| ProfileError::OpenLog { path: self.settings.log_path.clone(), source })?;
        self.invocations += 1;

        let driver = SamplingDriver::new(self.code, self.settings.refresh_events, Rc::clone(&self.recording));
        let handle = InstrumentationHandle::acquire(Box::new(driver));
        let outcome = panic::catch_unwind(AssertUnwindSafe(monitored));
        handle.release();
        self.finish();

        match outcome {
            Ok(returned) => Ok(returned),
            Err(panic_payload) => panic::resume_unwind(panic_payload),
        }
    }

    /// Closes the log & generates the charts, if asked to. Nothing here may fail the call
    fn finish(&mut self) {
        if let Err(err) = self.recording.borrow_mut().finish() {
            log::error!("couldn't close the measurement log '{}': {err}", self.settings.log_path.display());
            OUTPUT(&format!("memprof: WARNING: measurement log '{}' may be incomplete: {err}\n", self.settings.log_path.display()));
        }
        if self.settings.charts {
            if let Err(err) = self.chart_generator.generate(&self.settings.log_path, self.settings.threshold) {
                log::warn!("charts for '{}' not generated: {err}", self.code);
                OUTPUT(&format!("memprof: WARNING: {err} -- the log '{}' was kept\n", self.settings.log_path.display()));
            }
        }
        OUTPUT("memprof done\n");
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn log_path(&self) -> &Path {
        &self.settings.log_path
    }

    /// The checkpoint timeline & the above-threshold series gathered so far
    pub fn series(&self) -> Ref<'_, SeriesCache> {
        Ref::map(self.recording.borrow(), Recording::series)
    }

    /// How many times [Self::call()] ran the monitored function
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// How many writes to the measurement log failed -- sampling goes on regardless
    pub fn log_write_failures(&self) -> u64 {
        self.recording.borrow().write_failures()
    }
}

impl Measure for ProfilerSession {
    fn category(&self) -> Category {
        Category::ProfilerMarker
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [profiler_session](super) module

    use super::*;
    use crate::{
        charts::ChartError,
        sampling::{instrumentation, Frame},
    };
    use std::cell::Cell;


    const WORKER: CodeId = CodeId::new("worker");

    /// remembers what it was asked to plot
    #[derive(Clone, Default)]
    struct FakePlotter {
        requests: Rc<RefCell<Vec<(PathBuf, u64)>>>,
    }
    impl ChartGenerator for FakePlotter {
        fn generate(&self, log: &Path, threshold: u64) -> Result<(), ChartError> {
            self.requests.borrow_mut().push((log.to_path_buf(), threshold));
            Ok(())
        }
    }

    fn worker(globals: &Globals, items: usize) -> Vec<u32> {
        let mut values = Vec::new();
        instrumentation::call(&Frame::new(WORKER, globals).local("values", &values));
        for item in 0..items as u32 {
            values.push(item);
            instrumentation::line(&Frame::new(WORKER, globals).local("values", &values));
        }
        instrumentation::ret(&Frame::new(WORKER, globals).local("values", &values));
        values
    }

    #[test]
    fn entries_exits_and_refreshes_are_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let globals = Globals::new();
        let mut session = ProfilerSession::new(WORKER, &globals, Config::default()
            .threshold(0)
            .refresh_events(10)
            .log_path(dir.path().join("worker.log")));
        let values = session.call(|| worker(&globals, 25)).unwrap();
        assert_eq!(values.len(), 25);
        // 27 events: call, 25 lines & ret -- the call & ret checkpoints reset the counter
        assert_eq!(session.series().checkpoints().len(), 4, "entry, 2 refreshes & exit");
        assert_eq!(session.invocations(), 1);
        assert!(!instrumentation::is_armed(), "the hook must not outlive the call");
    }

    #[test]
    fn charts_are_requested_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("charted.log");
        let plotter = FakePlotter::default();
        let globals = Globals::new();
        let mut session = ProfilerSession::new(WORKER, &globals, Config::default()
            .threshold(512)
            .charts(true)
            .log_path(&log_path))
            .with_chart_generator(plotter.clone());
        session.call(|| worker(&globals, 3)).unwrap();
        assert_eq!(*plotter.requests.borrow(), vec![(log_path, 512)]);
    }

    #[test]
    fn missing_plotter_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("uncharted.log");
        let globals = Globals::new();
        let mut session = ProfilerSession::new(WORKER, &globals, Config::default()
            .charts(true)
            .log_path(&log_path))
            .with_chart_generator(ExternalPlotter::new("memprof-no-such-plotter"));
        assert_eq!(session.call(|| worker(&globals, 1)).unwrap().len(), 1);
        assert!(log_path.exists(), "the log must be kept");
    }

    #[cfg(unix)]
    #[test]
    fn log_write_failures_never_mask_the_outcome() {
        let globals = Globals::new();
        let mut session = ProfilerSession::new(WORKER, &globals, Config::default()
            .threshold(0)
            .refresh_events(1)
            .log_path("/dev/full"));
        let values = session.call(|| worker(&globals, 2000)).unwrap();
        assert_eq!(values.len(), 2000, "the monitored function's result must come back untouched");
        // call, 2000 lines & ret -- each one a checkpoint
        assert_eq!(session.series().checkpoints().len(), 2002);
        assert!(session.log_write_failures() > 0);
        assert!(!instrumentation::is_armed());
    }

    #[test]
    fn unopenable_log_prevents_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let globals = Globals::new();
        let mut session = ProfilerSession::new(WORKER, &globals, Config::default()
            .log_path(dir.path().join("no").join("such").join("dir.log")));
        let ran = Cell::new(false);
        let result = session.call(|| ran.set(true));
        assert!(matches!(result, Err(ProfileError::OpenLog { .. })));
        assert!(!ran.get(), "the monitored function must not run");
        assert_eq!(session.invocations(), 0);
    }
}
