//! Supervisor: launch, relay and reap, wired together.

use std::process::ExitCode;
use std::sync::Arc;

use nix::sys::signal::Signal;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::launcher::{self, LaunchOutcome};
use crate::process::ProcessControl;
use crate::reaper::Reaper;
use crate::relay;
use crate::table::ProcessTable;

/// Signals the supervisor works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Received by the supervisor and forwarded, unchanged, to live children.
    pub relay_signal: Signal,
    /// Sent to already started children when a later fork fails.
    pub cleanup_signal: Signal,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            relay_signal: Signal::SIGINT,
            cleanup_signal: Signal::SIGTERM,
        }
    }
}

/// Aggregate result once every started child has been reaped.
///
/// Children's own exit statuses are only logged and never folded in here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All children were launched and reaped.
    Clean,
    /// A fork failed; whatever had started was cleaned up and reaped.
    ForkFailed,
}

impl Outcome {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Clean)
    }

    pub fn exit_code(self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Owns the process table and drives it through launch and reap.
pub struct Supervisor<P> {
    table: Arc<ProcessTable>,
    procs: P,
    config: SupervisorConfig,
}

impl<P: ProcessControl> Supervisor<P> {
    pub fn new(table: ProcessTable, procs: P, config: SupervisorConfig) -> Self {
        Self {
            table: Arc::new(table),
            procs,
            config,
        }
    }

    pub const fn table(&self) -> &Arc<ProcessTable> {
        &self.table
    }

    pub const fn procs(&self) -> &P {
        &self.procs
    }

    /// Run to completion.
    ///
    /// Errors are the fatal cases: a missing executable (nothing started), a
    /// failed cleanup after a fork failure, or a broken wait. In the last two
    /// cases children may be left unreaped.
    pub fn run(&mut self) -> Result<Outcome> {
        launcher::preflight(&self.table)?;

        let launch = launcher::launch_all(&self.table, &mut self.procs);
        let outcome = match launch {
            LaunchOutcome::Complete { .. } => {
                self.install_relay();
                Outcome::Clean
            }
            LaunchOutcome::ForkFailed { started, .. } => {
                self.cleanup_after_fork_failure(started)?;
                Outcome::ForkFailed
            }
        };

        Reaper::new(&self.table, launch.started()).run(&mut self.procs)?;
        Ok(outcome)
    }

    fn install_relay(&mut self) {
        let signal = self.config.relay_signal;
        match self.procs.install_relay(&self.table, signal) {
            Ok(()) => info!(signal = %signal, "signal relay installed"),
            Err(e) => warn!(signal = %signal, error = %e, "failed to install signal relay"),
        }
    }

    /// Signal everything started so far. Skips the relay handler: the
    /// children already got their termination request.
    fn cleanup_after_fork_failure(&mut self, started: usize) -> Result<()> {
        let signal = self.config.cleanup_signal;
        info!(signal = %signal, started, "terminating started children after fork failure");

        let procs = &mut self.procs;
        let report =
            relay::notify_children(&self.table, signal, |pid, signal| procs.signal(pid, signal));
        relay::log_relay_outcomes(&self.table);

        if report.failed > 0 {
            error!(failed = report.failed, "hard fail occurred, zombies expected");
            return Err(Error::CleanupFailed {
                failed: report.failed,
            });
        }
        Ok(())
    }
}
