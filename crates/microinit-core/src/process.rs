//! Operating-system seam used by the supervisor.
//!
//! [`ProcessControl`] groups the four primitives the supervisor needs: start a
//! child, signal a pid, wait for any child, and install the relay handler.
//! [`OsProcesses`] is the real implementation on top of `nix`.

use std::ffi::c_int;
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::{ForkResult, Pid, execv, fork};
use tracing::error;

use crate::command::CommandSpec;
use crate::error::Result;
use crate::relay;
use crate::table::ProcessTable;

/// Exit status of a child whose program image could not be replaced.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Primitives the supervisor drives its children with.
pub trait ProcessControl {
    /// Start `spec` as a new child process and return its pid.
    ///
    /// Only the supervisor returns from this call; the child either becomes
    /// the new program or exits with [`EXEC_FAILURE_STATUS`].
    fn spawn(&mut self, spec: &CommandSpec) -> nix::Result<Pid>;

    /// Send `signal` to `pid`.
    fn signal(&mut self, pid: Pid, signal: Signal) -> nix::Result<()>;

    /// Block until any child changes state.
    fn wait_any(&mut self) -> nix::Result<ChildStatus>;

    /// Relay `signal`, when the supervisor receives it, to every live entry of
    /// `table`.
    fn install_relay(&mut self, table: &Arc<ProcessTable>, signal: Signal) -> Result<()>;
}

/// State change of one child as reported by waitpid(2).
///
/// Signal numbers are kept raw: a child may die from a signal, such as a
/// real-time one, that has no [`Signal`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Exited { pid: Pid, code: i32 },
    Signaled { pid: Pid, signo: i32, core_dumped: bool },
    /// Stopped or continued; only possible with tracing or `WUNTRACED`.
    Other { pid: Pid, raw: i32 },
}

impl ChildStatus {
    /// Decode a raw wait status for `pid`.
    pub fn from_raw(pid: Pid, status: c_int) -> Self {
        if libc::WIFEXITED(status) {
            Self::Exited {
                pid,
                code: libc::WEXITSTATUS(status),
            }
        } else if libc::WIFSIGNALED(status) {
            Self::Signaled {
                pid,
                signo: libc::WTERMSIG(status),
                core_dumped: libc::WCOREDUMP(status),
            }
        } else {
            Self::Other { pid, raw: status }
        }
    }

    pub const fn pid(self) -> Pid {
        match self {
            Self::Exited { pid, .. } | Self::Signaled { pid, .. } | Self::Other { pid, .. } => pid,
        }
    }
}

/// [`ProcessControl`] backed by fork/exec, kill(2), waitpid(2) and sigaction(2).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcesses;

impl ProcessControl for OsProcesses {
    fn spawn(&mut self, spec: &CommandSpec) -> nix::Result<Pid> {
        // SAFETY: the supervisor runs a single thread, so the child cannot
        // inherit a lock held by another thread. The child branch never
        // returns into supervisor code: it execs or exits.
        #[allow(unsafe_code)]
        let forked = unsafe { fork() }?;
        match forked {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => exec_child(spec),
        }
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> nix::Result<()> {
        kill(pid, signal)
    }

    fn wait_any(&mut self) -> nix::Result<ChildStatus> {
        let mut status: c_int = 0;
        // SAFETY: `status` is a live, writable c_int for the whole call.
        #[allow(unsafe_code)]
        let pid = unsafe { libc::waitpid(-1, &mut status, 0) };
        let pid = Errno::result(pid)?;
        Ok(ChildStatus::from_raw(Pid::from_raw(pid), status))
    }

    fn install_relay(&mut self, table: &Arc<ProcessTable>, signal: Signal) -> Result<()> {
        relay::install(Arc::clone(table), signal)
    }
}

/// Replace the freshly forked child with `spec`. Never returns.
fn exec_child(spec: &CommandSpec) -> ! {
    // execv keeps the inherited environment as is
    let Err(errno) = execv(spec.executable(), spec.argv());
    log_exec_failure(spec, errno);
    exit_now(EXEC_FAILURE_STATUS)
}

/// Terminate the forked child without running the supervisor's exit
/// handlers or flushing buffers it inherited.
#[allow(unsafe_code)]
fn exit_now(status: i32) -> ! {
    // SAFETY: _exit(2) takes no pointers and never returns.
    unsafe { libc::_exit(status) }
}

fn log_exec_failure(spec: &CommandSpec, errno: Errno) {
    error!(
        command = %spec,
        pid = %nix::unistd::getpid(),
        error = %errno,
        "execve failed"
    );
}
