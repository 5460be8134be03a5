//! Signal relay: forward the supervisor's termination signal to its children.
//!
//! The handler runs in signal context. It touches nothing but atomics in the
//! process table and kill(2), and it never logs or allocates. Each attempt is
//! recorded on its entry as a [`RelayOutcome`]; the main flow later drains
//! those records with [`log_relay_outcomes`].

use std::ffi::c_int;
use std::sync::{Arc, OnceLock};

use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, kill, sigaction};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::command::CommandSpec;
use crate::error::{Error, Result};
use crate::table::ProcessTable;

/// Table the installed handler relays to.
static RELAY_TABLE: OnceLock<Arc<ProcessTable>> = OnceLock::new();

/// Result of one relay attempt against one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered { pid: Pid, signal: Signal },
    Failed { pid: Pid, errno: Errno },
}

impl RelayOutcome {
    /// Pack into one word: pid in the high half, signal number (delivered)
    /// or negated errno (failed) in the low half. Never zero.
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn pack(self) -> u64 {
        let (pid, code) = match self {
            Self::Delivered { pid, signal } => (pid.as_raw(), signal as i32),
            Self::Failed { pid, errno } => (pid.as_raw(), -(errno as i32)),
        };
        (u64::from(pid as u32) << 32) | u64::from(code as u32)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn unpack(raw: u64) -> Option<Self> {
        if raw == 0 {
            return None;
        }
        let pid = Pid::from_raw((raw >> 32) as i32);
        let code = raw as u32 as i32;
        if code >= 0 {
            Signal::try_from(code)
                .ok()
                .map(|signal| Self::Delivered { pid, signal })
        } else {
            Some(Self::Failed {
                pid,
                errno: Errno::from_raw(-code),
            })
        }
    }
}

/// Counters from one pass over the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Send `signal` to every live entry through `send`.
///
/// Cleared entries are skipped. A failed send is recorded on its entry and
/// the remaining entries are still tried. Safe to call from signal context
/// as long as `send` is.
pub fn notify_children<F>(table: &ProcessTable, signal: Signal, mut send: F) -> RelayReport
where
    F: FnMut(Pid, Signal) -> nix::Result<()>,
{
    let mut report = RelayReport::default();
    for entry in table {
        let Some(pid) = entry.pid() else {
            continue;
        };
        report.attempted += 1;
        let outcome = match send(pid, signal) {
            Ok(()) => RelayOutcome::Delivered { pid, signal },
            Err(errno) => {
                report.failed += 1;
                RelayOutcome::Failed { pid, errno }
            }
        };
        entry.record_relay(outcome);
    }
    report
}

/// Install the process-wide handler that relays `signal` to `table`.
///
/// The handler is installed without `SA_RESTART`, so a blocking wait(2)
/// returns `EINTR` after each relay and the reaper gets a chance to log.
pub fn install(table: Arc<ProcessTable>, signal: Signal) -> Result<()> {
    RELAY_TABLE
        .set(table)
        .map_err(|_| Error::RelayAlreadyInstalled)?;

    let action = SigAction::new(
        SigHandler::Handler(relay_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: relay_handler only performs atomic loads/stores on the table
    // published above and calls kill(2), all async-signal-safe. It saves and
    // restores errno around its work.
    #[allow(unsafe_code)]
    let previous = unsafe { sigaction(signal, &action) };
    previous.map_err(Error::RelayInstall)?;
    Ok(())
}

extern "C" fn relay_handler(signo: c_int) {
    let saved_errno = Errno::last_raw();
    if let (Some(table), Ok(signal)) = (RELAY_TABLE.get(), Signal::try_from(signo)) {
        notify_children(table, signal, |pid, signal| kill(pid, signal));
    }
    Errno::set_raw(saved_errno);
}

/// Log and clear every recorded relay attempt. Returns how many were logged.
pub fn log_relay_outcomes(table: &ProcessTable) -> usize {
    let mut logged = 0;
    for entry in table {
        if let Some(outcome) = entry.take_relay_outcome() {
            log_relay_outcome(entry.spec(), outcome);
            logged += 1;
        }
    }
    logged
}

pub(crate) fn log_relay_outcome(spec: &CommandSpec, outcome: RelayOutcome) {
    match outcome {
        RelayOutcome::Delivered { pid, signal } => {
            info!(command = %spec, pid = %pid, signal = %signal, "relayed signal to child");
        }
        RelayOutcome::Failed { pid, errno } => {
            warn!(command = %spec, pid = %pid, error = %errno, "failed to send signal to child");
        }
    }
}
