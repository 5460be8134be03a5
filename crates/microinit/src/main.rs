//! microinit
//!
//! Runs as PID 1 (or any container entrypoint), starts one child per
//! descriptor, relays the termination signal to them and reaps every one.

use std::ffi::OsString;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use clap::builder::{OsStringValueParser, TypedValueParser};
use nix::sys::signal::Signal;
use tracing::{error, info};

use microinit_core::tracing_init::{default_filter, init_tracing};
use microinit_core::{OsProcesses, Outcome, ProcessTable, Supervisor, SupervisorConfig};

const AFTER_HELP: &str = "\
  CMD: /path/to/bin:arg1:arg2:...
  Example: microinit /bin/ls:-la /bin/ps:aux";

#[derive(Parser, Debug)]
#[command(name = "microinit")]
#[command(version, about = "microinit - minimal PID 1 process supervisor")]
#[command(after_help = AFTER_HELP)]
struct Args {
    /// Commands to supervise, each `/path/to/bin:arg1:arg2:...`
    #[arg(
        value_name = "CMD",
        required = true,
        value_parser = OsStringValueParser::new().try_map(non_empty)
    )]
    descriptors: Vec<OsString>,

    /// Signal relayed to every live child when the supervisor receives it.
    #[arg(
        long,
        default_value = "SIGINT",
        env = "MICROINIT_RELAY_SIGNAL",
        value_parser = parse_signal
    )]
    relay_signal: Signal,

    /// Signal sent to already started children when a later fork fails.
    #[arg(
        long,
        default_value = "SIGTERM",
        env = "MICROINIT_CLEANUP_SIGNAL",
        value_parser = parse_signal
    )]
    cleanup_signal: Signal,

    /// Log level filter for the supervisor (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "MICROINIT_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "MICROINIT_LOG_JSON")]
    log_json: bool,
}

/// Descriptors are raw bytes handed to execve, but never empty.
fn non_empty(value: OsString) -> Result<OsString, &'static str> {
    if value.is_empty() {
        Err("a value is required, got an empty descriptor")
    } else {
        Ok(value)
    }
}

/// Accept `SIGINT`, `INT`, `int` or a signal number.
fn parse_signal(value: &str) -> Result<Signal, String> {
    if let Ok(number) = value.parse::<i32>() {
        return Signal::try_from(number)
            .map_err(|e| format!("invalid signal number {number}: {e}"));
    }
    let upper = value.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&name).map_err(|_| format!("unknown signal {value:?}"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(&default_filter(&args.log_level), args.log_json);

    match run(args) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!("supervisor aborted: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<Outcome> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = %nix::unistd::getpid(),
        children = args.descriptors.len(),
        relay_signal = %args.relay_signal,
        "starting supervisor"
    );

    let table =
        ProcessTable::parse(&args.descriptors).context("failed to set up process table")?;
    let config = SupervisorConfig {
        relay_signal: args.relay_signal,
        cleanup_signal: args.cleanup_signal,
    };

    let outcome = Supervisor::new(table, OsProcesses, config)
        .run()
        .context("supervision failed")?;

    info!(outcome = ?outcome, "supervisor exiting");
    Ok(outcome)
}
