//! The durable record of a profiling session: [MeasurementLog] writes it, [read_log()] / [ParsedLog] read it back.

mod writer;
pub use writer::*;
mod reader;
pub use reader::*;
