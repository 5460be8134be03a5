//! microinit Core Library
//!
//! A minimal process supervisor meant to run as PID 1 of a container or
//! sandbox:
//! - Descriptor parsing (`/path/to/bin:arg1:arg2`)
//! - Fixed-size process table shared with the signal relay
//! - Launch phase with pre-flight existence checks and fork-failure cleanup
//! - Relay of the supervisor's termination signal to live children
//! - Zombie-free reaping with an aggregate outcome

pub mod command;
pub mod error;
pub mod launcher;
pub mod process;
pub mod reaper;
pub mod relay;
pub mod supervisor;
pub mod table;
pub mod tracing_init;

#[cfg(test)]
mod testing;

pub use command::CommandSpec;
pub use error::{Error, Result};
pub use launcher::LaunchOutcome;
pub use process::{ChildStatus, EXEC_FAILURE_STATUS, OsProcesses, ProcessControl};
pub use reaper::{Reaped, Reaper, Termination};
pub use relay::{RelayOutcome, RelayReport};
pub use supervisor::{Outcome, Supervisor, SupervisorConfig};
pub use table::{ChildEntry, ProcessTable};
