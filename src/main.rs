//! # mq - Main Entry Point
//!
//! Parses the command line, sets up logging and hands the command to the
//! dispatcher. Exits with status 0 on success and 1 on any failure, argument
//! errors included. The failure report always goes to stderr, independent of
//! the log filter.

use clap::Parser;
use colored::Colorize;
use mqtool::{cli::Args, logging, Dispatcher, MqError};
use std::io::Write;
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version are reported as "errors" too
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    logging::init(args.verbose);
    debug!("Configuration: {:?}", args);

    let stdout = std::io::stdout();
    let mut dispatcher = Dispatcher::new(stdout.lock(), args.format, args.mqueue_dir.clone());
    match dispatcher.run(&args.command) {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            debug!("Command failed: {:?}", e);
            report(&e);
            ExitCode::FAILURE
        }
    }
}

/// Print the failure to stderr whatever the log filter says
fn report(e: &MqError) {
    let mut stderr = std::io::stderr().lock();
    let _ = match e {
        MqError::Probe(e) => writeln!(stderr, "{}", format!("{:#}", e).red()),
        e => writeln!(stderr, "{}", e.to_string().red()),
    };
}
