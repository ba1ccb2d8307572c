#![doc = include_str!("../README.md")]

pub mod size_estimator;
pub mod sampling;
pub mod series_cache;
pub mod measurement_log;
pub mod session;
pub mod charts;
pub mod utils;
pub mod features;


/// Shorthand for the event emitting functions instrumented code calls -- `trace::call(&frame)`, `trace::ret(&frame)`, ...
pub use sampling::instrumentation as trace;

// exported symbols
pub use {
    features::OUTPUT,
    size_estimator::{Category, Measure, Shape, Identity, SizeEstimator},
    sampling::{CodeId, Frame, Globals, InstrumentationHandle},
    series_cache::SeriesCache,
    measurement_log::{read_log, MeasurementLog, ParsedLog},
    session::{Config, ProfileError, ProfilerSession, Settings},
    charts::{ChartGenerator, ExternalPlotter},
};
