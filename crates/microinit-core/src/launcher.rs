//! Launch phase: existence checks, then one fork per entry in table order.

use nix::errno::Errno;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::process::ProcessControl;
use crate::table::ProcessTable;

/// How the launch phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Every entry was started.
    Complete { started: usize },
    /// Starting entry `index` failed. Entries before it are running, entries
    /// from it on never got a pid.
    ForkFailed {
        started: usize,
        index: usize,
        errno: Errno,
    },
}

impl LaunchOutcome {
    /// Children that were started and must be reaped.
    pub const fn started(self) -> usize {
        match self {
            Self::Complete { started } | Self::ForkFailed { started, .. } => started,
        }
    }
}

/// Check that every executable exists, in table order.
///
/// Runs before anything is forked, so a failure here leaves no children
/// behind.
pub fn preflight(table: &ProcessTable) -> Result<()> {
    for entry in table {
        let path = entry.spec().executable_path();
        if let Err(source) = std::fs::metadata(path) {
            error!(path = %path.display(), error = %source, "file does not exist");
            return Err(Error::ExecutableNotFound {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    Ok(())
}

/// Start every entry of `table` in order, recording pids as they come.
///
/// Stops at the first fork failure; cleanup of what was already started is
/// the caller's job.
pub fn launch_all<P: ProcessControl>(table: &ProcessTable, procs: &mut P) -> LaunchOutcome {
    let mut started = 0;
    for (index, entry) in table.iter().enumerate() {
        match procs.spawn(entry.spec()) {
            Ok(pid) => {
                entry.set_pid(pid);
                started += 1;
                info!(
                    command = %entry.spec(),
                    pid = %pid,
                    "child process started"
                );
            }
            Err(errno) => {
                error!(command = %entry.spec(), error = %errno, "fork failed");
                return LaunchOutcome::ForkFailed {
                    started,
                    index,
                    errno,
                };
            }
        }
    }
    LaunchOutcome::Complete { started }
}
