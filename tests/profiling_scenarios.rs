//! Profiles small instrumented functions end to end, checking the reports' counterparts: the log & the series

use memprof::{
    measurement_log::{LogRecord, SeriesPoint},
    sampling::{CHARTS_ENV, CHARTS_GLOBAL, THRESHOLD_ENV, THRESHOLD_GLOBAL},
    trace::{self, TraceHook},
    *,
};
use serial_test::serial;
use std::{
    cell::Cell,
    collections::HashMap,
    rc::Rc,
    time::Duration,
};


const GROW: CodeId = CodeId::new("scenarios::grow");

/// Fills a vector with `n` numbers -- a [trace::line()] event per number -- next to a small map
fn grow(globals: &Globals, n: u32) -> usize {
    let mut numbers: Vec<u64> = Vec::new();
    let mut lookup: HashMap<String, u64> = HashMap::new();
    lookup.insert(String::from("one"), 1);
    lookup.insert(String::from("two"), 2);
    lookup.insert(String::from("three"), 3);
    trace::call(&Frame::new(GROW, globals).local("numbers", &numbers).local("lookup", &lookup));
    for i in 0..n {
        numbers.push(i as u64);
        trace::line(&Frame::new(GROW, globals).local("numbers", &numbers).local("lookup", &lookup));
    }
    trace::ret(&Frame::new(GROW, globals).local("numbers", &numbers).local("lookup", &lookup));
    numbers.len()
}

/// the sizes logged for `name`, in order
fn logged_sizes(parsed: &ParsedLog, name: &str) -> Vec<u64> {
    parsed.records().iter()
        .filter_map(|record| match record {
            LogRecord::Measurement { name: logged, bytes } if logged == name => Some(*bytes),
            _ => None,
        })
        .collect()
}


#[test]
fn growing_vector_and_small_map() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("grow.log");
    let globals = Globals::new();
    let mut session = ProfilerSession::new(GROW, &globals, Config::default()
        .threshold(0)
        .refresh_events(100)
        .log_path(&log_path));
    assert_eq!(session.call(|| grow(&globals, 1000)).unwrap(), 1000);

    let parsed = read_log(&log_path).unwrap();
    // entry, every 100 lines, exit
    assert_eq!(parsed.checkpoints().len(), 12);
    let numbers = logged_sizes(&parsed, "numbers");
    let lookup = logged_sizes(&parsed, "lookup");
    assert_eq!((numbers.len(), lookup.len()), (12, 12), "each checkpoint must log each candidate once");
    assert!(numbers.windows(2).all(|pair| pair[0] <= pair[1]), "the vector only grows: {numbers:?}");
    assert!(numbers[11] >= 1000 * 8, "the final vector holds 1000 `u64`s");
    assert!(lookup.windows(2).all(|pair| pair[0] == pair[1]), "the map never changes: {lookup:?}");

    let series = session.series();
    assert_eq!(series.checkpoints().len(), 12);
    assert_eq!(series.series("numbers").map(<[f64]>::len), Some(12));
    assert!(parsed.checkpoints().windows(2).all(|pair| pair[0] <= pair[1]), "checkpoints are in time order");
}

#[test]
fn restarts_are_separated_in_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("restarted.log");
    let globals = Globals::new();
    let mut session = ProfilerSession::new(GROW, &globals, Config::default()
        .threshold(0)
        .refresh_events(10)
        .log_path(&log_path));
    session.call(|| grow(&globals, 20)).unwrap();
    let first_invocation_checkpoints = session.series().checkpoints().len();
    spin_sleep::sleep(Duration::from_millis(20));
    session.call(|| grow(&globals, 20)).unwrap();
    assert_eq!(session.invocations(), 2);

    let parsed = read_log(&log_path).unwrap();
    assert_eq!(parsed.restarts(), 1);
    let restart_position = parsed.records().iter().position(|record| *record == LogRecord::Restart).unwrap();
    let (before, after) = parsed.records().split_at(restart_position);
    let times = |records: &[LogRecord]| records.iter()
        .filter_map(|record| match record {
            LogRecord::Checkpoint(elapsed) => Some(*elapsed),
            _ => None,
        })
        .collect::<Vec<f64>>();
    let (before, after) = (times(before), times(after));
    assert_eq!(before.len(), first_invocation_checkpoints + 2, "2 bridging checkpoints right before the marker");
    assert!(matches!(parsed.records()[restart_position - 2], LogRecord::Checkpoint(_)));
    assert!(matches!(parsed.records()[restart_position - 1], LogRecord::Checkpoint(_)));
    assert!(before.last().unwrap() <= after.first().unwrap(), "the marker must lie between the invocations' time ranges");
    assert!(after.first().unwrap() - before[first_invocation_checkpoints - 1] >= 0.015, "the pause between the invocations must show");

    let series = session.series();
    let numbers = series.series("numbers").unwrap();
    assert_eq!(&numbers[first_invocation_checkpoints..first_invocation_checkpoints+2], &[0.0, 0.0], "restart padding");
    assert_eq!(numbers.len(), series.checkpoints().len());

    let reconstructed = parsed.series(0);
    let breaks = reconstructed["numbers"].iter().filter(|point| matches!(point, SeriesPoint::Break)).count();
    assert_eq!(breaks, 1);
}

/// counts the events it sees while installed
struct OuterHook {
    events: Rc<Cell<u32>>,
}
impl TraceHook for OuterHook {
    fn on_event(&mut self, _frame: &Frame<'_>, _event: trace::Event) {
        self.events.set(self.events.get() + 1);
    }
}

#[test]
fn panics_propagate_after_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("panicking.log");
    let globals = Globals::new();
    let outer_events = Rc::new(Cell::new(0));
    let outer = InstrumentationHandle::acquire(Box::new(OuterHook { events: Rc::clone(&outer_events) }));
    let mut session = ProfilerSession::new(GROW, &globals, Config::default()
        .threshold(0)
        .log_path(&log_path));

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        session.call(|| {
            let doomed = vec![1u8; 64];
            trace::call(&Frame::new(GROW, &globals).local("doomed", &doomed));
            panic!("monitored function failed");
        })
    }));
    let payload = outcome.expect_err("the panic must not be swallowed");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"monitored function failed"), "the panic must resume unchanged");
    assert_eq!(outer_events.get(), 0, "the session's hook was the one installed during the call");

    trace::line(&Frame::new(GROW, &globals));
    assert_eq!(outer_events.get(), 1, "the previous hook must be back");
    outer.release();

    let parsed = read_log(&log_path).unwrap();
    assert_eq!(logged_sizes(&parsed, "doomed").len(), 1, "the log must have been flushed & closed");
}

#[test]
fn results_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let globals = Globals::new();
    let mut session = ProfilerSession::new(GROW, &globals, Config::default().log_path(dir.path().join("failing.log")));
    let returned: Result<(), String> = session.call(|| Err(String::from("business failure"))).unwrap();
    assert_eq!(returned, Err(String::from("business failure")));
    assert!(!trace::is_armed());
}

#[test]
#[serial]
fn launcher_environment_overrides_the_config() {
    std::env::set_var(THRESHOLD_ENV, "2048");
    std::env::set_var(CHARTS_ENV, "false");
    let globals = Globals::from_env();
    std::env::remove_var(THRESHOLD_ENV);
    std::env::remove_var(CHARTS_ENV);
    assert_eq!(globals.integer(THRESHOLD_GLOBAL), Some(2048));
    assert_eq!(globals.boolean(CHARTS_GLOBAL), Some(false));

    let session = ProfilerSession::new(GROW, &globals, Config::default().threshold(1).charts(true));
    assert_eq!(session.settings().threshold, 2048);
    assert!(!session.settings().charts);
    assert_eq!(session.log_path(), std::path::Path::new("grow.log"), "named after the function, without its module path");
}

#[test]
fn variables_below_the_threshold_are_only_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("quiet.log");
    let globals = Globals::new().with("settings", vec![String::from("verbose")]);
    let mut session = ProfilerSession::new(GROW, &globals, Config::default()
        .threshold(1 << 20)
        .log_path(&log_path));
    session.call(|| grow(&globals, 10)).unwrap();
    let parsed = read_log(&log_path).unwrap();
    assert_eq!(logged_sizes(&parsed, "settings").len(), 2, "globals are candidates as well");
    assert!(parsed.series(1 << 20).is_empty());
    assert_eq!(session.series().names().count(), 0);
}
