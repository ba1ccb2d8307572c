//! The `memprof` launcher: runs a program instrumented with this crate, injecting the
//! report threshold & the chart generation flag through its environment.

use clap::Parser;
use memprof::{
    sampling::{CHARTS_ENV, THRESHOLD_ENV},
    session::DEFAULT_THRESHOLD,
};
use std::process::{Command, ExitCode};


#[derive(Parser, Debug)]
#[command(name = "memprof")]
#[command(about = "Runs <PROGRAM>, profiling the memory of its instrumented functions")]
#[command(version)]
struct Cli {
    /// Minimum size, in bytes, for a variable to be reported
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: u64,

    /// Generate charts once each profiled function finishes
    #[arg(short, long)]
    plot: bool,

    /// The instrumented program & its arguments -- options are only read before it:
    /// everything from the program on goes to the program untouched
    #[arg(value_name = "PROGRAM", required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Cli {
    /// the program to run & the arguments for it
    fn program(&self) -> Option<(&String, &[String])> {
        self.command.split_first()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Some((program, args)) = cli.program() else {
        eprintln!("memprof: no program given");
        return ExitCode::FAILURE
    };
    let status = Command::new(program)
        .args(args)
        .env(THRESHOLD_ENV, cli.threshold.to_string())
        .env(CHARTS_ENV, cli.plot.to_string())
        .status();
    match status {
        Ok(status) => match status.code() {
            Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
            // killed by a signal
            None => ExitCode::FAILURE,
        },
        Err(err) => {
            eprintln!("memprof: couldn't run '{program}': {err}");
            ExitCode::FAILURE
        },
    }
}


#[cfg(test)]
mod tests {

    //! Unit tests for the `memprof` launcher

    use super::*;


    #[test]
    fn command_line() {
        let cli = Cli::try_parse_from(["memprof", "-t", "4096", "-p", "./target_program", "--its-own-flag", "value"]).unwrap();
        assert_eq!(cli.threshold, 4096);
        assert!(cli.plot);
        let (program, args) = cli.program().unwrap();
        assert_eq!(program, "./target_program");
        assert_eq!(args, ["--its-own-flag", "value"]);
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["memprof", "./target_program"]).unwrap();
        assert_eq!(cli.threshold, DEFAULT_THRESHOLD);
        assert!(!cli.plot);
        assert_eq!(cli.program(), Some((&String::from("./target_program"), &[][..])));
        assert!(Cli::try_parse_from(["memprof"]).is_err(), "the program is mandatory");
    }

    /// options sharing names with the launcher's, once after the program, belong to the program
    #[test]
    fn options_after_the_program_are_its_own() {
        let cli = Cli::try_parse_from(["memprof", "./target_program", "-t", "5", "--plot"]).unwrap();
        assert_eq!(cli.threshold, DEFAULT_THRESHOLD, "the program's `-t` must not reach the launcher");
        assert!(!cli.plot);
        let (program, args) = cli.program().unwrap();
        assert_eq!(program, "./target_program");
        assert_eq!(args, ["-t", "5", "--plot"]);
    }
}
