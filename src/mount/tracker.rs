//! Mount/device tracker: diffs the unnamed-device minor set against
//! what was last published to the kernel module and emits the delta.

use super::table::read_mount_table;
use crate::control::KernelControl;
use log::warn;
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;

/// Filesystem types whose mounts can present as "unnamed devices" (major 0)
/// that the kernel module needs to know about individually.
const TRACKED_FSTYPES: &[&str] = &["overlay", "btrfs", "fuse.dlnfs", "ulnfs"];

/// Blocks on `/proc/self/mountinfo` becoming readable-with-error, the
/// standard Linux signal that the mount table changed. Runs on its own loop,
/// independent of the event worker, so a slow sink flush can never delay a
/// mount-table update.
pub struct MountWatcher {
    file: File,
}

impl MountWatcher {
    pub fn open() -> io::Result<MountWatcher> {
        let file = File::open("/proc/self/mountinfo")?;
        Ok(MountWatcher { file })
    }

    /// Block until the mount table changes, or return `false` once
    /// `still_running` reports the daemon is shutting down. Polls in 1 Hz
    /// slices so the caller's shutdown flag is never stale for long.
    pub fn wait_for_change(&self, still_running: impl Fn() -> bool) -> bool {
        let fd = self.file.as_raw_fd();
        while still_running() {
            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLERR | libc::POLLPRI,
                revents: 0,
            };
            let rc = unsafe { libc::poll(&mut pfd, 1, 1000) };
            if rc > 0 && pfd.revents & libc::POLLERR != 0 {
                return true;
            }
        }
        false
    }
}

/// Tracks the set of unnamed-device minors last published to the kernel
/// module and emits `a<minor>`/`r<minor>` deltas on each refresh.
pub struct MountTracker<'a> {
    control: &'a KernelControl,
    published: BTreeSet<u8>,
}

impl<'a> MountTracker<'a> {
    pub fn new(control: &'a KernelControl) -> MountTracker<'a> {
        let published = control
            .read_unnamed_devices()
            .unwrap_or_default()
            .into_iter()
            .collect();
        MountTracker { control, published }
    }

    /// Re-read the mount table and publish any additions/removals against
    /// the previously published minor set. Removals are always sent before
    /// additions, per the kernel side's single-operation atomicity contract.
    pub fn refresh(&mut self) {
        let rows = match read_mount_table() {
            Ok(rows) => rows,
            Err(err) => {
                warn!("failed to read mount table: {err}");
                return;
            }
        };

        let current: BTreeSet<u8> = rows
            .iter()
            .filter(|row| TRACKED_FSTYPES.contains(&row.fs_type.as_str()))
            .filter(|row| row.major == 0)
            .filter_map(|row| u8::try_from(row.minor).ok())
            .collect();

        let removals: Vec<u8> = self.published.difference(&current).copied().collect();
        let additions: Vec<u8> = current.difference(&self.published).copied().collect();

        for minor in removals {
            match self.control.publish_unnamed_device_delta(false, minor) {
                Ok(()) => {
                    self.published.remove(&minor);
                }
                Err(err) => warn!("failed to publish removal of minor {minor}: {err}"),
            }
        }
        for minor in additions {
            match self.control.publish_unnamed_device_delta(true, minor) {
                Ok(()) => {
                    self.published.insert(minor);
                }
                Err(err) => warn!("failed to publish addition of minor {minor}: {err}"),
            }
        }
    }
}
