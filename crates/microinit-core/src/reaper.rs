//! Reaper: the wait loop that collects every started child exactly once.
//!
//! The loop stays in `WAITING` while any entry is live and blocks in a
//! system-wide wait. An interrupted wait is retried; any other wait error is
//! fatal and leaves the remaining children unreaped.

use std::borrow::Cow;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::process::{ChildStatus, ProcessControl};
use crate::relay;
use crate::table::ProcessTable;

/// How a child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Normal exit with a status code.
    Exited(i32),
    /// Killed by signal `signo`. `signal` is `None` for numbers nix has no
    /// name for, such as real-time signals.
    Signaled {
        signo: i32,
        signal: Option<Signal>,
        core_dumped: bool,
    },
}

impl Termination {
    /// Printable name of the terminating signal, if any.
    pub fn signal_name(self) -> Option<Cow<'static, str>> {
        match self {
            Self::Exited(_) => None,
            Self::Signaled { signo, signal, .. } => Some(signal.map_or_else(
                || Cow::Owned(format!("signal {signo}")),
                |signal| Cow::Borrowed(signal.as_str()),
            )),
        }
    }
}

/// One reaped, supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub index: usize,
    pub pid: Pid,
    pub termination: Termination,
}

/// Wait-loop state over a launched table.
#[derive(Debug)]
pub struct Reaper<'a> {
    table: &'a ProcessTable,
    live: usize,
}

impl<'a> Reaper<'a> {
    /// `live` is the number of children the launch phase started.
    pub const fn new(table: &'a ProcessTable, live: usize) -> Self {
        Self { table, live }
    }

    pub const fn live(&self) -> usize {
        self.live
    }

    pub const fn is_done(&self) -> bool {
        self.live == 0
    }

    /// Wait until every live child has been reaped.
    pub fn run<P: ProcessControl>(&mut self, procs: &mut P) -> Result<()> {
        while !self.is_done() {
            relay::log_relay_outcomes(self.table);

            match procs.wait_any() {
                Ok(status) => {
                    self.handle(status);
                }
                Err(Errno::EINTR) => {
                    info!("wait() interrupted by signal, retrying");
                    relay::log_relay_outcomes(self.table);
                }
                Err(errno) => {
                    error!(
                        error = %errno,
                        live = self.live,
                        "wait() failed, zombies expected"
                    );
                    return Err(Error::Wait(errno));
                }
            }
        }

        relay::log_relay_outcomes(self.table);
        info!(children = self.table.len(), "all children complete");
        Ok(())
    }

    /// Account for one wait status.
    ///
    /// Returns the reaped entry when the status is a termination of a live
    /// supervised child. Anything else leaves the live count untouched.
    pub fn handle(&mut self, status: ChildStatus) -> Option<Reaped> {
        let (pid, termination) = match status {
            ChildStatus::Exited { pid, code } => {
                info!(pid = %pid, status = code, "child process exited");
                (pid, Termination::Exited(code))
            }
            ChildStatus::Signaled {
                pid,
                signo,
                core_dumped,
            } => {
                let termination = Termination::Signaled {
                    signo,
                    signal: Signal::try_from(signo).ok(),
                    core_dumped,
                };
                let name = termination.signal_name().unwrap_or_default();
                warn!(
                    pid = %pid,
                    signal = %name,
                    signo,
                    core_dumped,
                    "child process killed by signal"
                );
                (pid, termination)
            }
            ChildStatus::Other { pid, raw } => {
                debug!(pid = %pid, raw, "ignoring non-terminal wait status");
                return None;
            }
        };

        let Some((index, entry)) = self.table.find_live(pid) else {
            warn!(pid = %pid, "reaped process is not a supervised child, ignoring");
            return None;
        };

        if let Some(outcome) = entry.take_relay_outcome() {
            relay::log_relay_outcome(entry.spec(), outcome);
        }
        entry.clear_pid();
        self.live = self.live.saturating_sub(1);
        info!(
            command = %entry.spec(),
            pid = %pid,
            live = self.live,
            "child process cleaned up"
        );

        Some(Reaped {
            index,
            pid,
            termination,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{FakeProcesses, exited, signaled};

    fn launched(pids: &[i32]) -> ProcessTable {
        let descriptors: Vec<String> = (0..pids.len()).map(|i| format!("/bin/c{i}")).collect();
        let table = ProcessTable::parse(&descriptors).unwrap();
        for (entry, pid) in table.iter().zip(pids) {
            entry.set_pid(Pid::from_raw(*pid));
        }
        table
    }

    #[test]
    fn exit_and_signal_are_reported_distinctly() {
        let table = launched(&[10, 11]);
        let mut reaper = Reaper::new(&table, 2);

        let exit = reaper.handle(exited(10, 1)).unwrap();
        assert_eq!(exit.termination, Termination::Exited(1));
        assert_eq!(exit.termination.signal_name(), None);
        assert_eq!(reaper.live(), 1);

        let kill = reaper.handle(signaled(11, Signal::SIGKILL as i32)).unwrap();
        assert_eq!(
            kill.termination,
            Termination::Signaled {
                signo: Signal::SIGKILL as i32,
                signal: Some(Signal::SIGKILL),
                core_dumped: false,
            }
        );
        assert_eq!(kill.termination.signal_name().unwrap(), "SIGKILL");
        assert_eq!(kill.index, 1);
        assert!(reaper.is_done());
    }

    #[test]
    fn same_pid_is_reaped_only_once() {
        let table = launched(&[20, 21]);
        let mut reaper = Reaper::new(&table, 2);

        assert!(reaper.handle(exited(20, 0)).is_some());
        assert!(reaper.handle(exited(20, 0)).is_none());
        assert_eq!(reaper.live(), 1);
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn unknown_pid_is_ignored() {
        let table = launched(&[30]);
        let mut reaper = Reaper::new(&table, 1);

        assert!(reaper.handle(exited(999, 0)).is_none());
        assert_eq!(reaper.live(), 1);
        assert!(table.get(0).unwrap().is_live());
    }

    #[test]
    fn stop_and_continue_do_not_count() {
        let table = launched(&[40]);
        let mut reaper = Reaper::new(&table, 1);

        let stopped = ChildStatus::Other {
            pid: Pid::from_raw(40),
            raw: ((Signal::SIGSTOP as i32) << 8) | 0x7f,
        };
        assert!(reaper.handle(stopped).is_none());
        let continued = ChildStatus::Other {
            pid: Pid::from_raw(40),
            raw: 0xffff,
        };
        assert!(reaper.handle(continued).is_none());
        assert_eq!(reaper.live(), 1);
    }

    #[test]
    fn unnamed_signal_death_is_reaped() {
        let table = launched(&[45, 46]);
        let mut procs = FakeProcesses::new(0)
            .script_wait(Ok(signaled(45, 34)))
            .script_wait(Ok(exited(46, 0)));

        let mut reaper = Reaper::new(&table, 2);
        reaper.run(&mut procs).unwrap();

        assert!(reaper.is_done());
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn unnamed_signal_keeps_its_number() {
        let table = launched(&[47]);
        let mut reaper = Reaper::new(&table, 1);

        let reaped = reaper.handle(signaled(47, 34)).unwrap();
        assert_eq!(
            reaped.termination,
            Termination::Signaled {
                signo: 34,
                signal: None,
                core_dumped: false,
            }
        );
        assert_eq!(reaped.termination.signal_name().unwrap(), "signal 34");
    }

    #[test]
    fn run_retries_interrupted_waits_until_done() {
        let table = launched(&[50, 51]);
        let mut procs = FakeProcesses::new(0)
            .script_wait(Err(Errno::EINTR))
            .script_wait(Ok(exited(51, 0)))
            .script_wait(Err(Errno::EINTR))
            .script_wait(Ok(exited(777, 3)))
            .script_wait(Ok(signaled(50, Signal::SIGTERM as i32)));

        let mut reaper = Reaper::new(&table, 2);
        reaper.run(&mut procs).unwrap();

        assert!(reaper.is_done());
        assert_eq!(table.live_count(), 0);
        assert_eq!(procs.waits_left(), 0);
    }

    #[test]
    fn wait_failure_is_fatal() {
        let table = launched(&[60, 61]);
        let mut procs = FakeProcesses::new(0)
            .script_wait(Ok(exited(60, 0)))
            .script_wait(Err(Errno::ECHILD));

        let mut reaper = Reaper::new(&table, 2);
        let err = reaper.run(&mut procs).unwrap_err();

        assert!(matches!(err, Error::Wait(Errno::ECHILD)));
        assert_eq!(reaper.live(), 1);
        assert!(table.get(1).unwrap().is_live());
    }

    #[test]
    fn nothing_to_reap_returns_immediately() {
        let table = launched(&[]);
        let mut procs = FakeProcesses::new(0);
        Reaper::new(&table, 0).run(&mut procs).unwrap();
        assert_eq!(procs.wait_calls, 0);
    }
}
