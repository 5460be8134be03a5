//! Process table shared between the main flow and the signal relay.
//!
//! The table is allocated once, sized to the number of descriptors, and never
//! resized. Every mutable field is an atomic so the relay handler can read it
//! while it interrupts the main flow:
//!
//! - `pid` is written only by the main flow (launch and reap). The relay only
//!   loads it, and a loaded value may already be stale by the time the signal
//!   is sent. No lock is involved.
//! - `relay` is written by whoever relays a signal and drained by the main
//!   flow, which is the only place that logs.

use std::ffi::OsStr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use nix::unistd::Pid;

use crate::command::CommandSpec;
use crate::error::{Error, Result};
use crate::relay::RelayOutcome;

/// Raw pid value meaning "not running".
const NO_PID: i32 = 0;

/// Raw relay slot value meaning "nothing recorded".
const NO_OUTCOME: u64 = 0;

/// One supervised process.
#[derive(Debug)]
pub struct ChildEntry {
    spec: CommandSpec,
    pid: AtomicI32,
    relay: AtomicU64,
}

impl ChildEntry {
    fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            pid: AtomicI32::new(NO_PID),
            relay: AtomicU64::new(NO_OUTCOME),
        }
    }

    pub const fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Pid of the running child, `None` before launch and after reaping.
    pub fn pid(&self) -> Option<Pid> {
        let raw = self.pid.load(Ordering::Acquire);
        (raw > NO_PID).then(|| Pid::from_raw(raw))
    }

    pub fn is_live(&self) -> bool {
        self.pid().is_some()
    }

    pub(crate) fn set_pid(&self, pid: Pid) {
        self.pid.store(pid.as_raw(), Ordering::Release);
    }

    /// Mark the entry reaped, returning the pid it held.
    pub(crate) fn clear_pid(&self) -> Option<Pid> {
        let raw = self.pid.swap(NO_PID, Ordering::AcqRel);
        (raw > NO_PID).then(|| Pid::from_raw(raw))
    }

    pub(crate) fn record_relay(&self, outcome: RelayOutcome) {
        self.relay.store(outcome.pack(), Ordering::Release);
    }

    /// Take the last relay attempt recorded for this entry, if any.
    pub fn take_relay_outcome(&self) -> Option<RelayOutcome> {
        RelayOutcome::unpack(self.relay.swap(NO_OUTCOME, Ordering::AcqRel))
    }
}

/// Fixed-size, ordered table of supervised children.
#[derive(Debug)]
pub struct ProcessTable {
    entries: Box<[ChildEntry]>,
}

impl ProcessTable {
    /// Build the table from already parsed commands, keeping their order.
    pub fn new(specs: Vec<CommandSpec>) -> Result<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(specs.len())
            .map_err(|source| Error::Allocation {
                context: "allocating the process table",
                source,
            })?;
        entries.extend(specs.into_iter().map(ChildEntry::new));

        Ok(Self {
            entries: entries.into_boxed_slice(),
        })
    }

    /// Parse every descriptor and build the table. The first bad descriptor
    /// aborts the whole table.
    pub fn parse<I, S>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let specs = descriptors
            .into_iter()
            .map(|d| CommandSpec::parse(&d))
            .collect::<Result<Vec<_>>>()?;
        Self::new(specs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChildEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ChildEntry> {
        self.entries.get(index)
    }

    /// Find the live entry holding `pid`. Cleared entries never match.
    pub fn find_live(&self, pid: Pid) -> Option<(usize, &ChildEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.pid() == Some(pid))
    }

    /// Number of entries currently holding a pid.
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_live()).count()
    }
}

impl<'a> IntoIterator for &'a ProcessTable {
    type Item = &'a ChildEntry;
    type IntoIter = std::slice::Iter<'a, ChildEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
