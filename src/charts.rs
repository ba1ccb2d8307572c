//! Resting place for [ChartGenerator] & [ExternalPlotter]

use std::{
    io,
    path::Path,
    process::{Command, ExitStatus},
};


/// The plotting program [ExternalPlotter] runs if none other is given
pub const DEFAULT_PLOTTER: &str = "mp_plot";

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("chart generator '{program}' not found")]
    NotFound { program: String },
    #[error("chart generator '{program}' failed with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("couldn't run chart generator '{program}': {source}")]
    Io { program: String, source: io::Error },
}

/// Turns a measurement log into charts -- called once the monitored function is done, if charts are enabled
pub trait ChartGenerator {
    fn generate(&self, log: &Path, threshold: u64) -> Result<(), ChartError>;
}

/// Delegates chart generation to an external program, invoked as `<program> -t <threshold> <log>`
#[derive(Debug, Clone)]
pub struct ExternalPlotter {
    program: String,
}

impl ExternalPlotter {

    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for ExternalPlotter {
    fn default() -> Self {
        Self::new(DEFAULT_PLOTTER)
    }
}

impl ChartGenerator for ExternalPlotter {
    fn generate(&self, log: &Path, threshold: u64) -> Result<(), ChartError> {
        log::debug!("running '{} -t {threshold} {}'", self.program, log.display());
        let status = Command::new(&self.program)
            .arg("-t").arg(threshold.to_string())
            .arg(log)
            .status()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => ChartError::NotFound { program: self.program.clone() },
                _ => ChartError::Io { program: self.program.clone(), source },
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ChartError::Failed { program: self.program.clone(), status })
        }
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [charts](super) module

    use super::*;


    #[test]
    fn missing_program() {
        let plotter = ExternalPlotter::new("memprof-no-such-plotter");
        let result = plotter.generate(Path::new("whatever.log"), 1024);
        assert!(matches!(result, Err(ChartError::NotFound { .. })), "got {result:?}");
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_is_checked() {
        assert!(ExternalPlotter::new("true").generate(Path::new("whatever.log"), 0).is_ok());
        let result = ExternalPlotter::new("false").generate(Path::new("whatever.log"), 0);
        assert!(matches!(result, Err(ChartError::Failed { .. })), "got {result:?}");
    }

    #[test]
    fn default_program() {
        assert_eq!(ExternalPlotter::default().program(), DEFAULT_PLOTTER);
    }
}
