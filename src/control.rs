//! Kernel control channel.
//!
//! Owns the multicast netlink socket joined to the kernel module's `dentry`
//! and `process-info` groups, and write access to the three control
//! pseudo-files the module exposes for runtime tuning.

use crate::error::{Error, Result};
use crate::netlink::NetlinkSocket;
use log::{info, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

const FAMILY_NAME: &str = "vfs_anything";
const GROUP_DENTRY: &str = "dentry";
const GROUP_PROCESS_INFO: &str = "process-info";

/// The kernel module's control directory and the three write-only files
/// beneath it.
#[derive(Debug)]
pub struct KernelControl {
    control_dir: PathBuf,
    dir_inode: u64,
    socket: NetlinkSocket,
}

impl KernelControl {
    /// Connect to the kernel module: join the multicast groups and remember
    /// the control directory's inode so a later reload can be detected.
    ///
    /// Fails outright (no retry) if the socket cannot be allocated, the
    /// family/groups cannot be resolved, or either group cannot be joined.
    pub fn connect(control_dir: impl AsRef<Path>) -> Result<KernelControl> {
        let control_dir = control_dir.as_ref().to_path_buf();
        let dir_inode = Self::read_inode(&control_dir)?;

        let mut socket = NetlinkSocket::open()?;
        let (_family, group_ids) =
            socket.resolve_family(FAMILY_NAME, &[GROUP_DENTRY, GROUP_PROCESS_INFO])?;
        for group_id in &group_ids {
            socket.join_multicast_group(*group_id)?;
        }

        info!("connected to kernel module control directory {control_dir:?}");
        Ok(KernelControl {
            control_dir,
            dir_inode,
            socket,
        })
    }

    fn read_inode(control_dir: &Path) -> Result<u64> {
        let meta = std::fs::symlink_metadata(control_dir).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::ModuleNotPresent
            } else {
                Error::Io(err)
            }
        })?;
        Ok(meta.ino())
    }

    /// Poll for the kernel control directory to appear (1 Hz, as driven by
    /// the process lifecycle), returning once it exists.
    pub fn wait_for_module(control_dir: impl AsRef<Path>, still_running: impl Fn() -> bool) {
        let control_dir = control_dir.as_ref();
        while still_running() {
            if control_dir.is_dir() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }

    /// True if the control directory's inode has changed since connection
    /// (module reloaded) or if the directory is simply absent, which is
    /// treated as "not reloaded" -- the system may just be shutting down.
    pub fn reloaded(&self) -> bool {
        match Self::read_inode(&self.control_dir) {
            Ok(inode) => inode != self.dir_inode,
            Err(Error::ModuleNotPresent) => false,
            Err(_) => false,
        }
    }

    /// Raw fd the main loop should poll for readability.
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut NetlinkSocket {
        &mut self.socket
    }

    fn write_control_file(&self, name: &str, line: &str) -> Result<()> {
        let path = self.control_dir.join(name);
        let mut file = OpenOptions::new().write(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Write the current event mask as a decimal bitmask.
    pub fn set_event_mask(&self, mask: u32) {
        if let Err(err) = self.write_control_file("trace_event_mask", &mask.to_string()) {
            warn!("failed to write trace_event_mask: {err}");
        }
    }

    /// Write the merge-disable flag (`0` or `1`).
    pub fn set_disable_merge(&self, disable: bool) {
        let value = if disable { "1" } else { "0" };
        if let Err(err) = self.write_control_file("disable_event_merge", value) {
            warn!("failed to write disable_event_merge: {err}");
        }
    }

    /// Publish a single unnamed-device-set delta: `a<minor>` to add, or
    /// `r<minor>` to remove. One operation per write, per the kernel side's
    /// atomicity assumption -- batching is deliberately not supported.
    pub fn publish_unnamed_device_delta(&self, add: bool, minor: u8) -> Result<()> {
        let op = if add { 'a' } else { 'r' };
        self.write_control_file("vfs_unnamed_devices", &format!("{op}{minor}"))
    }

    /// Read back the comma-separated current unnamed-device set.
    pub fn read_unnamed_devices(&self) -> Result<Vec<u8>> {
        let path = self.control_dir.join("vfs_unnamed_devices");
        let content = std::fs::read_to_string(path)?;
        Ok(content
            .trim()
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<u8>().ok())
            .collect())
    }
}
