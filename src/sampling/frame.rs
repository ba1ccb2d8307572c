//! Execution scopes as seen by the profiler: [CodeId]s, [Frame]s, [Globals] and the [CandidateSet]s built from them.

use crate::size_estimator::{Category, Measure};
use std::{
    any::Any,
    collections::BTreeMap,
    fmt::{Display, Formatter},
};


/// Name of the global binding that overrides the configured report threshold
pub const THRESHOLD_GLOBAL: &str = "memprof_threshold";
/// Name of the global binding that overrides the configured chart generation flag
pub const CHARTS_GLOBAL: &str = "memprof_charts";
/// Environment variable the `memprof` launcher uses to inject [THRESHOLD_GLOBAL] into the target program
pub const THRESHOLD_ENV: &str = "MEMPROF_THRESHOLD";
/// Environment variable the `memprof` launcher uses to inject [CHARTS_GLOBAL] into the target program
pub const CHARTS_ENV: &str = "MEMPROF_CHARTS";


/// Identifies the code of a function -- events whose frame carries the monitored function's
/// [CodeId] are the function's own entries & exits
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct CodeId(&'static str);

impl CodeId {

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }

    /// the name without any leading module path -- `"grow"` for `"app::model::grow"`
    pub fn short_name(&self) -> &'static str {
        self.0.rsplit("::").next().unwrap_or(self.0)
    }
}

impl Display for CodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}


/// A value that may be bound in [Globals]: measurable and, for the profiler's own settings, readable back
pub trait GlobalValue: Measure + Any {
    fn as_measure(&self) -> &dyn Measure;
    fn as_any(&self) -> &dyn Any;
}
impl<T: Measure + Any> GlobalValue for T {
    fn as_measure(&self) -> &dyn Measure {
        self
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The global bindings of the program being profiled -- part of every [CandidateSet] and
/// the place where [THRESHOLD_GLOBAL] & [CHARTS_GLOBAL] may override the profiler's configuration
#[derive(Default)]
pub struct Globals {
    bindings: BTreeMap<String, Box<dyn GlobalValue>>,
}

impl Globals {

    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the globals injected by the `memprof` launcher through [THRESHOLD_ENV] & [CHARTS_ENV].
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut globals = Self::new();
        if let Ok(threshold) = std::env::var(THRESHOLD_ENV) {
            match threshold.trim().parse::<u64>() {
                Ok(threshold) => globals.define(THRESHOLD_GLOBAL, threshold),
                Err(err) => log::warn!("ignoring {THRESHOLD_ENV}='{threshold}': {err}"),
            }
        }
        if let Ok(charts) = std::env::var(CHARTS_ENV) {
            match charts.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on"  => globals.define(CHARTS_GLOBAL, true),
                "0" | "false" | "no" | "off" => globals.define(CHARTS_GLOBAL, false),
                _ => log::warn!("ignoring {CHARTS_ENV}='{charts}': expected a boolean"),
            }
        }
        globals
    }

    /// Binds `value` to `name`, replacing any previous binding
    pub fn define(&mut self, name: impl Into<String>, value: impl GlobalValue) {
        self.bindings.insert(name.into(), Box::new(value));
    }

    /// Builder version of [Self::define()]
    pub fn with(mut self, name: impl Into<String>, value: impl GlobalValue) -> Self {
        self.define(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Measure> {
        self.binding(name).map(|value| value.as_measure())
    }

    pub fn iter(&self) -> impl Iterator<Item=(&str, &dyn Measure)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), (**value).as_measure()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Reads back an integer binding -- any of the std integer types -- as long as it is not negative nor above `u64::MAX`.\
    /// Bindings that exist but can't be read back are ignored with a warning.
    pub fn integer(&self, name: &str) -> Option<u64> {
        let value = self.binding(name)?.as_any();
        macro_rules! read_as {
            ($($type:ty),*) => {
                $(
                    if let Some(&n) = value.downcast_ref::<$type>() {
                        let read = u64::try_from(n).ok();
                        if read.is_none() {
                            log::warn!("ignoring global '{name}' = {n}: out of the accepted range");
                        }
                        return read
                    }
                )*
            };
        }
        read_as!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);
        log::warn!("ignoring global '{name}': not an integer");
        None
    }

    /// Reads back a `bool` binding. Bindings of other types are ignored with a warning
    pub fn boolean(&self, name: &str) -> Option<bool> {
        let read = self.binding(name)?.as_any().downcast_ref::<bool>().copied();
        if read.is_none() {
            log::warn!("ignoring global '{name}': not a bool");
        }
        read
    }

    /// the bound value itself -- `Box<dyn GlobalValue>` is a [GlobalValue] as well, so the box must not be used directly
    fn binding(&self, name: &str) -> Option<&dyn GlobalValue> {
        self.bindings.get(name).map(|value| &**value)
    }
}

impl Measure for Globals {
    fn category(&self) -> Category {
        Category::ProfilerMarker
    }
}


/// One execution scope at the moment an event is emitted: the code it runs, its local bindings and the program's [Globals].\
/// Frames only borrow: build a fresh one for each event.
/// ```
///     use memprof::sampling::{CodeId, Frame, Globals};
///     const FILL: CodeId = CodeId::new("fill");
///     let globals = Globals::new();
///     let numbers = vec![1u32, 2, 3];
///     let frame = Frame::new(FILL, &globals).local("numbers", &numbers);
///     assert_eq!(frame.candidates().len(), 1);
/// ```
pub struct Frame<'a> {
    code:    CodeId,
    locals:  Vec<(&'a str, &'a dyn Measure)>,
    globals: &'a Globals,
}

impl<'a> Frame<'a> {

    pub fn new(code: CodeId, globals: &'a Globals) -> Self {
        Self { code, locals: Vec::new(), globals }
    }

    /// Adds a local binding
    pub fn local(mut self, name: &'a str, value: &'a dyn Measure) -> Self {
        self.locals.push((name, value));
        self
    }

    pub fn code(&self) -> CodeId {
        self.code
    }

    pub fn globals(&self) -> &'a Globals {
        self.globals
    }

    /// Union of the local & global bindings -- locals shadow globals of the same name
    pub fn candidates(&self) -> CandidateSet<'_> {
        let mut bindings: BTreeMap<&str, &dyn Measure> = self.globals.iter().collect();
        bindings.extend(self.locals.iter().map(|&(name, value)| (name, value)));
        CandidateSet { bindings }
    }
}


/// Names & values visible in a scope at a checkpoint, iterated in name order
pub struct CandidateSet<'a> {
    bindings: BTreeMap<&'a str, &'a dyn Measure>,
}

impl<'a> CandidateSet<'a> {

    pub fn iter(&self) -> impl Iterator<Item=(&'a str, &'a dyn Measure)> + '_ {
        self.bindings.iter().map(|(&name, &value)| (name, value))
    }

    /// The candidates eligible for measurement -- see [Category::is_interesting()]
    pub fn interesting(&self) -> impl Iterator<Item=(&'a str, &'a dyn Measure)> + '_ {
        self.iter().filter(|(_name, value)| value.category().is_interesting())
    }

    pub fn get(&self, name: &str) -> Option<&'a dyn Measure> {
        self.bindings.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [frame](super) module

    use super::*;
    use serial_test::serial;


    #[test]
    fn locals_shadow_globals() {
        let globals = Globals::new()
            .with("shared", String::from("global"))
            .with("config", vec![1u8, 2, 3]);
        let shared = 7u8;
        let frame = Frame::new(CodeId::new("shadowing"), &globals).local("shared", &shared);
        let candidates = frame.candidates();
        assert_eq!(candidates.len(), 2, "`shared` must appear once");
        let names: Vec<&str> = candidates.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["config", "shared"], "candidates are iterated in name order");
        let estimated = crate::size_estimator::SizeEstimator::new().estimate(candidates.get("shared").unwrap());
        assert_eq!(estimated, 1, "the local `u8` must win over the global `String`");
    }

    #[test]
    fn uninteresting_candidates_are_filtered() {
        let globals = Globals::new();
        let handle = std::io::stderr();
        let nothing: Option<String> = None;
        let values = vec![0u64; 3];
        let frame = Frame::new(CodeId::new("filtering"), &globals)
            .local("handle", &handle)
            .local("nothing", &nothing)
            .local("values", &values);
        let candidates = frame.candidates();
        let interesting: Vec<&str> = candidates.interesting().map(|(name, _)| name).collect();
        assert_eq!(interesting, vec!["values"]);
    }

    #[test]
    fn settings_are_read_back() {
        let globals = Globals::new()
            .with(THRESHOLD_GLOBAL, 2048)
            .with(CHARTS_GLOBAL, true);
        assert_eq!(globals.integer(THRESHOLD_GLOBAL), Some(2048), "`i32` literals must be accepted");
        assert_eq!(globals.boolean(CHARTS_GLOBAL),    Some(true));
        let negative = Globals::new().with(THRESHOLD_GLOBAL, -1i64);
        assert_eq!(negative.integer(THRESHOLD_GLOBAL), None, "negative thresholds must be ignored");
    }

    #[test]
    fn every_integer_type_is_read_back() {
        let read = |globals: Globals| globals.integer(THRESHOLD_GLOBAL);
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 200u8)),    Some(200));
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 2048u16)),  Some(2048));
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 4096u128)), Some(4096));
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 100i8)),    Some(100));
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 1024i16)),  Some(1024));
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 8192isize)), Some(8192));
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 1i128 << 70)), None, "beyond u64 can't be a threshold");
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, -5i16)),    None);
        assert_eq!(read(Globals::new().with(THRESHOLD_GLOBAL, 2.5f64)),   None, "floats are not integers");
        assert_eq!(Globals::new().with(CHARTS_GLOBAL, 1u8).boolean(CHARTS_GLOBAL), None, "integers are not booleans");
    }

    #[test]
    #[serial]
    fn settings_from_env() {
        std::env::set_var(THRESHOLD_ENV, "4096");
        std::env::set_var(CHARTS_ENV, "yes");
        let globals = Globals::from_env();
        assert_eq!(globals.integer(THRESHOLD_GLOBAL), Some(4096));
        assert_eq!(globals.boolean(CHARTS_GLOBAL),    Some(true));
        std::env::set_var(THRESHOLD_ENV, "a lot");
        std::env::remove_var(CHARTS_ENV);
        let globals = Globals::from_env();
        assert!(globals.is_empty(), "invalid or missing variables must not define anything");
        std::env::remove_var(THRESHOLD_ENV);
    }

    #[test]
    fn short_names() {
        assert_eq!(CodeId::new("app::model::grow").short_name(), "grow");
        assert_eq!(CodeId::new("grow").short_name(), "grow");
    }
}
