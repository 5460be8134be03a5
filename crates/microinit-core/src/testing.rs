//! Test doubles for the OS seam.

use std::collections::VecDeque;
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tempfile::TempDir;

use crate::command::CommandSpec;
use crate::error::{Error, Result};
use crate::process::{ChildStatus, ProcessControl};
use crate::table::ProcessTable;

/// Scripted [`ProcessControl`]: pids are handed out sequentially, waits are
/// replayed from a queue and an exhausted queue reports `ECHILD`.
#[derive(Debug, Default)]
pub struct FakeProcesses {
    next_pid: i32,
    spawn_failure: Option<(usize, Errno)>,
    signal_failures: Vec<(Pid, Errno)>,
    waits: VecDeque<nix::Result<ChildStatus>>,
    relay_fails: bool,
    pub spawned: Vec<String>,
    pub signals: Vec<(Pid, Signal)>,
    pub relay_installs: Vec<Signal>,
    pub wait_calls: usize,
}

impl FakeProcesses {
    pub fn new(first_pid: i32) -> Self {
        Self {
            next_pid: first_pid,
            ..Self::default()
        }
    }

    /// Fail the spawn with zero-based position `index`.
    pub const fn fail_spawn_at(mut self, index: usize, errno: Errno) -> Self {
        self.spawn_failure = Some((index, errno));
        self
    }

    pub fn fail_signal_to(mut self, pid: Pid, errno: Errno) -> Self {
        self.signal_failures.push((pid, errno));
        self
    }

    pub const fn fail_relay_install(mut self) -> Self {
        self.relay_fails = true;
        self
    }

    pub fn script_wait(mut self, result: nix::Result<ChildStatus>) -> Self {
        self.waits.push_back(result);
        self
    }

    pub fn waits_left(&self) -> usize {
        self.waits.len()
    }
}

impl ProcessControl for FakeProcesses {
    fn spawn(&mut self, spec: &CommandSpec) -> nix::Result<Pid> {
        if let Some((index, errno)) = self.spawn_failure {
            if index == self.spawned.len() {
                return Err(errno);
            }
        }
        self.spawned.push(spec.to_string());
        let pid = Pid::from_raw(self.next_pid);
        self.next_pid += 1;
        Ok(pid)
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> nix::Result<()> {
        self.signals.push((pid, signal));
        match self.signal_failures.iter().find(|(p, _)| *p == pid) {
            Some((_, errno)) => Err(*errno),
            None => Ok(()),
        }
    }

    fn wait_any(&mut self) -> nix::Result<ChildStatus> {
        self.wait_calls += 1;
        self.waits.pop_front().unwrap_or(Err(Errno::ECHILD))
    }

    fn install_relay(&mut self, _table: &Arc<ProcessTable>, signal: Signal) -> Result<()> {
        if self.relay_fails {
            return Err(Error::RelayInstall(Errno::EINVAL));
        }
        self.relay_installs.push(signal);
        Ok(())
    }
}

pub fn exited(pid: i32, code: i32) -> ChildStatus {
    ChildStatus::Exited {
        pid: Pid::from_raw(pid),
        code,
    }
}

pub fn signaled(pid: i32, signo: i32) -> ChildStatus {
    ChildStatus::Signaled {
        pid: Pid::from_raw(pid),
        signo,
        core_dumped: false,
    }
}

/// Create empty files named `names` in a fresh temp dir and return a
/// descriptor for each.
#[allow(clippy::unwrap_used)]
pub fn existing_files(names: &[&str]) -> (TempDir, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let descriptors = names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, b"").unwrap();
            path.display().to_string()
        })
        .collect();
    (dir, descriptors)
}
