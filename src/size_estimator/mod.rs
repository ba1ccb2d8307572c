//! Deep memory footprint estimation. See:
//!   - [measure] for the [Measure] capability values expose -- and the `measure_fields!` macro for user structs;
//!   - [SizeEstimator] for the cycle-safe traversal.
//!
//! Usage example:
//! ```rust
//!     use memprof::size_estimator::SizeEstimator;
//!     let words = vec![String::from("profiling"), String::from("memory")];
//!     let bytes = SizeEstimator::new().estimate(&words);
//!     assert!(bytes >= std::mem::size_of::<Vec<String>>() + "profiling".len() + "memory".len());
//! ```

pub mod measure;
pub use measure::*;
mod estimator;
pub use estimator::*;
mod std_impls;
