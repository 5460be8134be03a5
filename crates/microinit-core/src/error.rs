//! Error types for the microinit core library.

use std::collections::TryReserveError;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Result type alias using the microinit `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Conditions that abort the supervisor, or that its callers must handle.
///
/// Fork failures and per-child signal delivery failures are not listed here:
/// they are handled where they happen and surface as `LaunchOutcome` and
/// `RelayOutcome` values instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Descriptor cannot be turned into a command.
    #[error("invalid descriptor {descriptor:?}: {reason}")]
    InvalidDescriptor {
        descriptor: String,
        reason: &'static str,
    },

    /// Backing storage for a descriptor or the process table is unavailable.
    #[error("allocation failed while {context}")]
    Allocation {
        context: &'static str,
        #[source]
        source: TryReserveError,
    },

    /// Pre-flight existence check failed; nothing has been forked.
    #[error("file does not exist: {}", path.display())]
    ExecutableNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cleanup after a fork failure could not signal every started child.
    #[error("failed to signal {failed} child(ren) after fork failure, zombies expected")]
    CleanupFailed { failed: usize },

    /// The blocking wait failed for a reason other than signal interruption.
    #[error("wait() failed, zombies expected")]
    Wait(#[source] Errno),

    /// A relay handler already owns the process-wide relay table.
    #[error("signal relay is already installed")]
    RelayAlreadyInstalled,

    /// `sigaction` rejected the relay handler.
    #[error("failed to install signal relay")]
    RelayInstall(#[source] Errno),
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    /// Message chain the way `anyhow`'s `{:#}` walks it.
    fn chain(err: &Error) -> String {
        let mut parts = vec![err.to_string()];
        let mut source = err.source();
        while let Some(cause) = source {
            parts.push(cause.to_string());
            source = cause.source();
        }
        parts.join(": ")
    }

    #[test]
    fn errno_sources_appear_once_in_the_chain() {
        for err in [Error::Wait(Errno::EINVAL), Error::RelayInstall(Errno::EINVAL)] {
            let text = chain(&err);
            assert_eq!(text.matches("Invalid argument").count(), 1, "{text}");
        }
        assert_eq!(
            chain(&Error::Wait(Errno::ECHILD)),
            format!("wait() failed, zombies expected: {}", Errno::ECHILD)
        );
    }

    #[test]
    fn allocation_source_appears_once_in_the_chain() {
        let source = Vec::<u8>::new().try_reserve_exact(usize::MAX).unwrap_err();
        let expected = format!("allocation failed while parsing: {source}");
        let err = Error::Allocation {
            context: "parsing",
            source,
        };
        assert_eq!(chain(&err), expected);
    }
}
