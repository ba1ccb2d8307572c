//! Ties everything together: a [ProfilerSession] arms the sampling around each invocation of the
//! monitored function, measuring through a [Recording] configured by a [Config].

mod config;
pub use config::*;
mod recording;
pub use recording::*;
mod profiler_session;
pub use profiler_session::*;
