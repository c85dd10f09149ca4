//! Error types for the daemon's startup and control paths.
//!
//! Per-event and per-write failures are recoverable and are handled inline
//! with `log::warn!`/`log::debug!` rather than propagated as `Error` -- only
//! failures that should abort construction or trigger a restart flow through
//! here.

use std::{fmt, io};

/// Errors that can occur while standing up or operating the privileged
/// control surfaces (netlink socket, control files, config bus, log sink).
#[derive(Debug)]
pub enum Error {
    /// The kernel control directory (`/sys/kernel/.../anything` or similar)
    /// does not exist -- the kernel module is not currently loaded.
    ModuleNotPresent,
    /// A netlink family or multicast group could not be resolved.
    FamilyResolve(String),
    /// A raw I/O failure from a syscall (socket, bind, setsockopt, write...).
    Io(io::Error),
    /// The external configuration bus could not be reached.
    ConfigBus(String),
    /// The process does not run as root, which every control surface requires.
    NotRoot,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ModuleNotPresent => {
                write!(f, "kernel module control directory is absent")
            }
            Error::FamilyResolve(name) => {
                write!(f, "failed to resolve netlink family/group '{name}'")
            }
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::ConfigBus(msg) => write!(f, "configuration bus error: {msg}"),
            Error::NotRoot => write!(f, "this daemon must run as root"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
