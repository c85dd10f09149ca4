//! Mount table parsing, shared by the device tracker and the topology
//! inspector.

use procfs::process::Process;
use std::io;
use std::path::PathBuf;

/// One row of `/proc/self/mountinfo`, trimmed to the fields the tracker and
/// topology inspector need.
#[derive(Clone, Debug)]
pub struct MountRow {
    pub mount_id: i32,
    pub parent_id: i32,
    pub major: i32,
    pub minor: i32,
    pub root: PathBuf,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

/// Read and parse the current process's mount table.
pub fn read_mount_table() -> io::Result<Vec<MountRow>> {
    let process = Process::myself().map_err(proc_error_to_io)?;
    let mount_infos = process.mountinfo().map_err(proc_error_to_io)?;

    mount_infos
        .into_iter()
        .map(|mi| {
            let (major, minor) = parse_majmin(&mi.majmin)?;
            Ok(MountRow {
                mount_id: mi.mnt_id,
                parent_id: mi.pid,
                major,
                minor,
                root: PathBuf::from(mi.root),
                mount_point: mi.mount_point,
                fs_type: mi.fs_type,
            })
        })
        .collect()
}

/// Parse a `"major:minor"` device id pair, e.g. `"8:1"`.
fn parse_majmin(majmin: &str) -> io::Result<(i32, i32)> {
    let (major, minor) = majmin
        .split_once(':')
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("malformed majmin '{majmin}'")))?;
    let major = major
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("malformed majmin '{majmin}'")))?;
    let minor = minor
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("malformed majmin '{majmin}'")))?;
    Ok((major, minor))
}

fn proc_error_to_io(err: procfs::ProcError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}
