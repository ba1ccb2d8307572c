//! Resting place for [SamplingDriver]

use super::{
    frame::{CandidateSet, CodeId, Frame},
    instrumentation::{Event, TraceHook},
};
use crate::size_estimator::{Category, Measure};
use std::{cell::RefCell, rc::Rc};


/// Number of events after which a checkpoint is triggered even if the monitored function didn't enter nor exit
pub const DEFAULT_REFRESH_EVENTS: u64 = 500_000;

/// Whatever takes the measurements when the [SamplingDriver] decides it is time to
pub trait Checkpointer {
    fn checkpoint(&mut self, candidates: &CandidateSet<'_>);
}

/// The [TraceHook] deciding when to measure: on every entry & exit of the monitored function
/// and, to cover long running calls, once every `refresh_events` events.\
/// Only [Event::Call], [Event::Line] & [Event::Return] are considered -- other events are not even counted.
pub struct SamplingDriver<C: Checkpointer> {
    target:         CodeId,
    refresh_events: u64,
    ticks:          u64,
    checkpointer:   Rc<RefCell<C>>,
}

impl<C: Checkpointer> SamplingDriver<C> {

    pub fn new(target: CodeId, refresh_events: u64, checkpointer: Rc<RefCell<C>>) -> Self {
        Self {
            target,
            refresh_events: refresh_events.max(1),
            ticks: 0,
            checkpointer,
        }
    }

    /// The trigger policy: counts the event and tells if a checkpoint is due
    pub fn should_trigger(&mut self, code: CodeId, event: Event) -> bool {
        if !matches!(event, Event::Call | Event::Line | Event::Return) {
            return false
        }
        self.ticks += 1;
        let boundary = matches!(event, Event::Call | Event::Return) && code == self.target;
        if boundary || self.ticks >= self.refresh_events {
            self.ticks = 0;
            true
        } else {
            false
        }
    }

    /// events counted since the last checkpoint
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl<C: Checkpointer> TraceHook for SamplingDriver<C> {
    fn on_event(&mut self, frame: &Frame<'_>, event: Event) {
        if !self.should_trigger(frame.code(), event) {
            return
        }
        let candidates = frame.candidates();
        match self.checkpointer.try_borrow_mut() {
            Ok(mut checkpointer) => checkpointer.checkpoint(&candidates),
            Err(_) => log::warn!("checkpoint for '{}' skipped: the recording state is in use", self.target),
        }
    }
}

impl<C: Checkpointer> Measure for SamplingDriver<C> {
    fn category(&self) -> Category {
        Category::ProfilerMarker
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [driver](super) module

    use super::*;
    use crate::sampling::{Globals, instrumentation::{self, InstrumentationHandle}};


    const MONITORED: CodeId = CodeId::new("monitored");
    const HELPER:    CodeId = CodeId::new("helper");

    /// keeps the candidate names seen on each checkpoint
    #[derive(Default)]
    struct Recorder {
        checkpoints: Vec<Vec<String>>,
    }
    impl Checkpointer for Recorder {
        fn checkpoint(&mut self, candidates: &CandidateSet<'_>) {
            self.checkpoints.push(candidates.iter().map(|(name, _)| name.to_string()).collect());
        }
    }

    #[test]
    fn entries_and_exits_trigger() {
        let mut driver = SamplingDriver::new(MONITORED, 1000, Rc::new(RefCell::new(Recorder::default())));
        assert!(driver.should_trigger(MONITORED, Event::Call),    "entering the monitored function");
        assert!(!driver.should_trigger(MONITORED, Event::Line),   "a plain line");
        assert!(!driver.should_trigger(HELPER, Event::Call),      "entering another function");
        assert!(!driver.should_trigger(HELPER, Event::Return),    "leaving another function");
        assert!(driver.should_trigger(MONITORED, Event::Return),  "leaving the monitored function");
        assert_eq!(driver.ticks(), 0, "checkpoints reset the counter");
    }

    #[test]
    fn refresh_cadence() {
        let mut driver = SamplingDriver::new(MONITORED, 3, Rc::new(RefCell::new(Recorder::default())));
        let triggered: Vec<bool> = (0..7).map(|_| driver.should_trigger(HELPER, Event::Line)).collect();
        assert_eq!(triggered, vec![false, false, true, false, false, true, false]);
        assert!(!driver.should_trigger(HELPER, Event::Exception), "exceptions are ignored");
        assert_eq!(driver.ticks(), 1, "ignored events must not be counted");
    }

    /// the driver, installed as the thread's hook, must take the candidates from the frame of the triggering event
    #[test]
    fn installed_driver_checkpoints_frames() {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let globals = Globals::new().with("total", 0u64);
        let handle = InstrumentationHandle::acquire(Box::new(SamplingDriver::new(MONITORED, 2, Rc::clone(&recorder))));
        let items = vec![1, 2, 3];
        instrumentation::call(&Frame::new(MONITORED, &globals).local("items", &items));
        let scratch = String::from("helper data");
        instrumentation::call(&Frame::new(HELPER, &globals).local("scratch", &scratch));
        instrumentation::line(&Frame::new(HELPER, &globals).local("scratch", &scratch));
        instrumentation::ret(&Frame::new(MONITORED, &globals).local("items", &items));
        handle.release();
        let recorder = recorder.borrow();
        assert_eq!(recorder.checkpoints, vec![
            vec!["items".to_string(), "total".to_string()],
            vec!["scratch".to_string(), "total".to_string()],
            vec!["items".to_string(), "total".to_string()],
        ]);
    }
}
