//! The `FileEvent` data model shared by the listener, worker and sink.

use crate::action::Action;
use std::path::PathBuf;

/// Kernel-assigned device identifier, `(major, minor)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Device {
    pub major: u16,
    pub minor: u8,
}

/// A single logical filesystem event, fully correlated from the `NOTIFY` and
/// `NOTIFY_PROCESS_INFO` halves.
///
/// Bounds from the wire protocol (paths are NUL-terminated, at most 4096
/// bytes) are enforced at decode time in the listener; by the time a
/// `FileEvent` reaches the worker its paths are plain owned `PathBuf`s.
#[derive(Clone, Debug)]
pub struct FileEvent {
    pub action: Action,
    pub cookie: u32,
    pub device: Device,
    pub event_path: PathBuf,
    pub uid: u32,
    pub pid: i32,
    pub process_path: PathBuf,
}

impl FileEvent {
    /// A `FileEvent` is valid for hand-off to the worker iff its path fields
    /// are non-empty and its pid is positive (tgid from `NOTIFY_PROCESS_INFO`).
    pub fn is_valid(&self) -> bool {
        !self.event_path.as_os_str().is_empty()
            && !self.process_path.as_os_str().is_empty()
            && self.pid > 0
    }
}

/// Message carried on the worker's queue: either a real event or the
/// sentinel used to unblock the worker's blocking pop on shutdown.
pub enum WorkerMessage {
    Event(FileEvent),
    Terminate,
}
