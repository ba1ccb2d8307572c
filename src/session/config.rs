//! Resting place for [Config] & [Settings]

use crate::{
    sampling::{CodeId, Globals, DEFAULT_REFRESH_EVENTS, THRESHOLD_GLOBAL, CHARTS_GLOBAL},
    utils::presentable_measurements::{size_unit_for, SizeUnit},
};
use std::path::PathBuf;


/// Sizes (in bytes) must be above this to be reported, if nothing else is configured -- 1 MiB
pub const DEFAULT_THRESHOLD: u64 = 1 << 20;

/// What the user asks for when creating a [ProfilerSession](super::ProfilerSession).\
/// Anything left unset falls back to the built-in defaults -- and the threshold & charts flag
/// may still be overridden by the monitored program's [Globals]. See [Settings::resolve()].
/// ```
///     use memprof::Config;
///     let config = Config::default()
///         .threshold(64 * 1024)
///         .refresh_events(10_000);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Config {
    threshold:      Option<u64>,
    charts:         Option<bool>,
    refresh_events: Option<u64>,
    log_path:       Option<PathBuf>,
}

impl Config {

    /// minimum size, in bytes, for a variable to be reported & to enter the in-memory series
    pub fn threshold(mut self, bytes: u64) -> Self {
        self.threshold = Some(bytes);
        self
    }

    /// whether charts should be generated once the monitored function finishes
    pub fn charts(mut self, enabled: bool) -> Self {
        self.charts = Some(enabled);
        self
    }

    /// how many events may go by, inside a long running call, before a checkpoint is forced
    pub fn refresh_events(mut self, events: u64) -> Self {
        self.refresh_events = Some(events);
        self
    }

    /// where the measurement log goes -- `<function name>.log`, in the working directory, if not set
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}


/// The effective settings of a session
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub threshold:      u64,
    pub charts:         bool,
    pub refresh_events: u64,
    pub log_path:       PathBuf,
    /// the unit sizes are reported in -- derived from `threshold`
    pub unit:           SizeUnit,
}

impl Settings {

    /// Applies the precedence `globals` > `config` > defaults
    pub fn resolve(code: CodeId, globals: &Globals, config: Config) -> Self {
        let threshold = globals.integer(THRESHOLD_GLOBAL)
            .or(config.threshold)
            .unwrap_or(DEFAULT_THRESHOLD);
        let charts = globals.boolean(CHARTS_GLOBAL)
            .or(config.charts)
            .unwrap_or(false);
        let refresh_events = config.refresh_events.unwrap_or(DEFAULT_REFRESH_EVENTS).max(1);
        let log_path = config.log_path
            .unwrap_or_else(|| PathBuf::from(format!("{}.log", code.short_name())));
        Self { threshold, charts, refresh_events, log_path, unit: size_unit_for(threshold) }
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [config](super) module

    use super::*;


    const GROW: CodeId = CodeId::new("model::grow");

    #[test]
    fn defaults() {
        let settings = Settings::resolve(GROW, &Globals::new(), Config::default());
        assert_eq!(settings.threshold,      DEFAULT_THRESHOLD);
        assert!(!settings.charts);
        assert_eq!(settings.refresh_events, DEFAULT_REFRESH_EVENTS);
        assert_eq!(settings.log_path,       PathBuf::from("grow.log"));
        assert_eq!(settings.unit.suffix,    "MB");
    }

    #[test]
    fn config_overrides_defaults() {
        let config = Config::default()
            .threshold(2048)
            .charts(true)
            .refresh_events(0)
            .log_path("/tmp/custom.log");
        let settings = Settings::resolve(GROW, &Globals::new(), config);
        assert_eq!(settings.threshold,      2048);
        assert!(settings.charts);
        assert_eq!(settings.refresh_events, 1, "a zero cadence would trigger on every event anyway");
        assert_eq!(settings.log_path,       PathBuf::from("/tmp/custom.log"));
        assert_eq!(settings.unit.suffix,    "KB");
    }

    #[test]
    fn globals_override_config() {
        let globals = Globals::new()
            .with(THRESHOLD_GLOBAL, 100u64)
            .with(CHARTS_GLOBAL, false);
        let settings = Settings::resolve(GROW, &globals, Config::default().threshold(2048).charts(true));
        assert_eq!(settings.threshold, 100);
        assert!(!settings.charts);
        assert_eq!(settings.unit.suffix, "B");
    }

    #[test]
    fn narrow_integer_globals_override_config() {
        let globals = Globals::new().with(THRESHOLD_GLOBAL, 2048u16);
        let settings = Settings::resolve(GROW, &globals, Config::default().threshold(7));
        assert_eq!(settings.threshold, 2048, "a `u16` binding must win over the configured threshold");
    }
}
