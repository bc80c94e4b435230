//! `enter [OPTIONS] [BINARY]` or `enter [OPTIONS] <PID> <BINARY> [ARGS]...`
//!
//! Opens BINARY, moves into the namespaces and root of PID (default 1), and executes BINARY
//! there, even if that root has no such file.

use clap::Parser;
use std::process::ExitCode;

use enter::cli::Cli;
use tracing::debug;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version end up here too.
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    enter::logging::configure_logging(cli.verbose);

    let command = match cli.into_command() {
        Ok(command) => command,
        Err(err) => {
            eprintln!("enter: {err}");
            return ExitCode::FAILURE;
        }
    };

    let err = command.enter();
    debug!(?err, "entry sequence failed");
    eprintln!("enter: {err}");
    ExitCode::FAILURE
}
