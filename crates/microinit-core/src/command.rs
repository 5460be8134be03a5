//! Command descriptor parsing.
//!
//! A descriptor is one command-line argument of the form
//! `/path/to/bin:arg1:arg2:...`. Fields are split on `:` and kept verbatim,
//! so empty fields (`/bin/echo::x`) become empty arguments. Descriptors are
//! raw OS strings and need not be valid UTF-8.

use std::borrow::Cow;
use std::ffi::{CStr, CString, OsStr};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator between the executable path and its arguments.
pub const FIELD_SEPARATOR: u8 = b':';

/// Launch descriptor for one supervised child.
///
/// `argv[0]` is the executable path. The vector is never empty and is not
/// modified after parsing. The terminating null pointer `execv` needs is
/// appended by the exec call itself and is never a visible argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<CString>,
}

impl CommandSpec {
    /// Parse a descriptor without touching the caller's string.
    pub fn parse<S: AsRef<OsStr> + ?Sized>(descriptor: &S) -> Result<Self> {
        let descriptor = descriptor.as_ref();
        let bytes = descriptor.as_bytes();
        if bytes.is_empty() {
            return Err(Error::InvalidDescriptor {
                descriptor: String::new(),
                reason: "descriptor is empty, expected at least an executable path",
            });
        }

        let fields = bytes.iter().filter(|&&b| b == FIELD_SEPARATOR).count() + 1;
        let mut argv = Vec::new();
        argv.try_reserve_exact(fields)
            .map_err(|source| Error::Allocation {
                context: "parsing a command descriptor",
                source,
            })?;

        for field in bytes.split(|&b| b == FIELD_SEPARATOR) {
            let arg = CString::new(field).map_err(|_| Error::InvalidDescriptor {
                descriptor: descriptor.to_string_lossy().into_owned(),
                reason: "descriptor contains a NUL byte",
            })?;
            argv.push(arg);
        }

        Ok(Self { argv })
    }

    /// Executable path as handed to `execv`.
    pub fn executable(&self) -> &CStr {
        // argv always holds at least the executable
        &self.argv[0]
    }

    /// Executable path for filesystem checks.
    pub fn executable_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(self.executable().to_bytes()))
    }

    /// Full argument vector, `argv[0]` included.
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Arguments for display, lossily decoded.
    pub fn args(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.argv.iter().map(|arg| arg.to_string_lossy())
    }
}

impl FromStr for CommandSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.executable().to_string_lossy())
    }
}
