//! Mount-topology inspector: a read-side index over the mount table.
//!
//! Pure query, no kernel interaction -- rebuilt on demand from whatever the
//! mount table looks like at call time. Recommended strategy from the design
//! notes: an arena (the row slice itself) plus hash maps of indices, rather
//! than real pointers between records.

use super::table::{read_mount_table, MountRow};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// A kernel device identifier as it appears in the mount table (wider than
/// [`crate::event::Device`], which only needs to hold values already
/// filtered to the unnamed-device range).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DeviceId {
    pub major: i32,
    pub minor: i32,
}

/// The mount-id and device-id indexes, plus the `exist_lowerfs` flag.
pub struct MountTopology {
    pub device_mount_point: HashMap<DeviceId, PathBuf>,
    pub child_mount_points: HashMap<DeviceId, Vec<PathBuf>>,
    pub exist_lowerfs: bool,
}

impl MountTopology {
    /// Read the current mount table and build a fresh topology from it.
    pub fn build() -> io::Result<MountTopology> {
        let rows = read_mount_table()?;
        Ok(MountTopology::from_rows(&rows))
    }

    fn from_rows(rows: &[MountRow]) -> MountTopology {
        let by_mount_id: HashMap<i32, &MountRow> =
            rows.iter().map(|row| (row.mount_id, row)).collect();

        let mut device_mount_point: HashMap<DeviceId, PathBuf> = HashMap::new();
        let mut representative_mount_id: HashMap<DeviceId, i32> = HashMap::new();

        for row in rows {
            let device = DeviceId {
                major: row.major,
                minor: row.minor,
            };
            if device_mount_point.contains_key(&device) {
                log::debug!("duplicate mount for device {device:?}, ignoring {:?}", row.mount_point);
                continue;
            }
            if qualifies_as_device_root(row, &by_mount_id) {
                device_mount_point.insert(device, row.mount_point.clone());
                representative_mount_id.insert(device, row.mount_id);
            }
        }

        let mut child_mount_points: HashMap<DeviceId, Vec<PathBuf>> = HashMap::new();
        for row in rows {
            for (&device, &rep_id) in &representative_mount_id {
                if row.parent_id == rep_id {
                    child_mount_points
                        .entry(device)
                        .or_default()
                        .push(row.mount_point.clone());
                }
            }
        }

        let exist_lowerfs = rows
            .iter()
            .any(|row| row.fs_type == "fuse.dlnfs" || row.fs_type == "ulnfs");

        MountTopology {
            device_mount_point,
            child_mount_points,
            exist_lowerfs,
        }
    }
}

/// A row qualifies as the device-representative mount iff its own fs-root is
/// `/` and, walking parent mount ids, every ancestor found in the table also
/// has mount point `/` (i.e. is itself a root mount), up to either a
/// self-parented row or a parent id absent from the table (both denote the
/// real root of the mount namespace).
fn qualifies_as_device_root(row: &MountRow, by_mount_id: &HashMap<i32, &MountRow>) -> bool {
    if row.root != Path::new("/") {
        return false;
    }

    let mut current = row;
    loop {
        if current.parent_id == current.mount_id {
            return true;
        }
        let Some(parent) = by_mount_id.get(&current.parent_id) else {
            return true;
        };
        if parent.mount_point != Path::new("/") && parent.parent_id != parent.mount_id {
            return false;
        }
        current = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(mount_id: i32, parent_id: i32, major: i32, minor: i32, root: &str, mp: &str, fs_type: &str) -> MountRow {
        MountRow {
            mount_id,
            parent_id,
            major,
            minor,
            root: PathBuf::from(root),
            mount_point: PathBuf::from(mp),
            fs_type: fs_type.to_string(),
        }
    }

    #[test]
    fn root_mount_is_indexed_by_device() {
        let rows = vec![row(1, 1, 0, 0, "/", "/", "ext4")];
        let topo = MountTopology::from_rows(&rows);
        assert_eq!(
            topo.device_mount_point.get(&DeviceId { major: 0, minor: 0 }),
            Some(&PathBuf::from("/"))
        );
    }

    #[test]
    fn bind_mount_subpath_is_excluded() {
        let rows = vec![
            row(1, 1, 0, 0, "/", "/", "ext4"),
            row(2, 1, 0, 0, "/subdir", "/mnt/bind", "ext4"),
        ];
        let topo = MountTopology::from_rows(&rows);
        assert_eq!(topo.device_mount_point.len(), 1);
        assert_eq!(
            topo.device_mount_point.get(&DeviceId { major: 0, minor: 0 }),
            Some(&PathBuf::from("/"))
        );
    }

    #[test]
    fn child_mount_points_track_parent_id() {
        let rows = vec![
            row(1, 1, 8, 1, "/", "/", "ext4"),
            row(2, 1, 8, 2, "/", "/home", "ext4"),
        ];
        let topo = MountTopology::from_rows(&rows);
        let children = topo
            .child_mount_points
            .get(&DeviceId { major: 8, minor: 1 })
            .unwrap();
        assert_eq!(children, &vec![PathBuf::from("/home")]);
    }

    #[test]
    fn lowerfs_flag_detects_dlnfs() {
        let rows = vec![
            row(1, 1, 0, 0, "/", "/", "ext4"),
            row(2, 1, 0, 5, "/", "/data/lower", "fuse.dlnfs"),
        ];
        let topo = MountTopology::from_rows(&rows);
        assert!(topo.exist_lowerfs);
    }

    #[test]
    fn first_device_to_appear_wins_on_duplicate() {
        let rows = vec![
            row(1, 1, 8, 1, "/", "/first", "ext4"),
            row(2, 1, 8, 1, "/", "/second", "ext4"),
        ];
        let topo = MountTopology::from_rows(&rows);
        assert_eq!(
            topo.device_mount_point.get(&DeviceId { major: 8, minor: 1 }),
            Some(&PathBuf::from("/first"))
        );
    }
}
