//! Decides *when* measurements are taken. See:
//!   - [frame] for the scopes instrumented code exposes -- [CodeId], [Frame], [Globals];
//!   - [instrumentation] for the events & the thread-wide hook slot;
//!   - [SamplingDriver] for the trigger policy.

pub mod frame;
pub use frame::*;
pub mod instrumentation;
pub use instrumentation::{Event, TraceHook, InstrumentationHandle};
mod driver;
pub use driver::*;
