//! Minimal `NETLINK_GENERIC` socket plumbing.
//!
//! The daemon only ever needs to: resolve a family name and its multicast
//! group ids once at startup, join those groups, and then read datagrams off
//! the socket. That is a small enough slice of generic netlink that it is
//! implemented directly against `libc`, the same way the pack's FUSE device
//! channel wraps raw fd syscalls rather than pulling in a full netlink crate.

mod attr;
mod wire;

use crate::error::{Error, Result};
use attr::{attr_cstr, attr_u32, AttrReader, AttrWriter};
use log::{debug, warn};
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use wire::{
    nlmsg_align, GenlMsgHdr, NlMsgHdr, SockAddrNl, CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME,
    CTRL_ATTR_MCAST_GRP_ID, CTRL_ATTR_MCAST_GRP_NAME, CTRL_ATTR_MCAST_GROUPS, CTRL_CMD_GETFAMILY,
    GENL_ID_CTRL, NLMSG_DONE, NLMSG_ERROR, NLM_F_ACK, NLM_F_REQUEST,
};

const NETLINK_GENERIC: libc::c_int = 16;
const SOL_NETLINK: libc::c_int = 270;
const NETLINK_ADD_MEMBERSHIP: libc::c_int = 1;

/// A connected `NETLINK_GENERIC` socket, joined to zero or more multicast
/// groups.
#[derive(Debug)]
pub struct NetlinkSocket {
    fd: RawFd,
    seq: u32,
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl NetlinkSocket {
    /// Open a netlink socket and bind it to the kernel's auto-assigned port id.
    pub fn open() -> Result<NetlinkSocket> {
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                NETLINK_GENERIC,
            )
        };
        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let addr = SockAddrNl {
            nl_family: libc::AF_NETLINK as libc::sa_family_t,
            ..Default::default()
        };
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const SockAddrNl as *const libc::sockaddr,
                mem::size_of::<SockAddrNl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Io(err));
        }

        // Set the receive buffer to the system maximum so a burst of kernel
        // notifications cannot be dropped before we drain the socket.
        if let Ok(max) = std::fs::read_to_string("/proc/sys/net/core/rmem_max") {
            if let Ok(max) = max.trim().parse::<libc::c_int>() {
                let rc = unsafe {
                    libc::setsockopt(
                        fd,
                        libc::SOL_SOCKET,
                        libc::SO_RCVBUF,
                        &max as *const _ as *const libc::c_void,
                        mem::size_of::<libc::c_int>() as libc::socklen_t,
                    )
                };
                if rc < 0 {
                    warn!(
                        "failed to raise netlink receive buffer to {} bytes: {}",
                        max,
                        std::io::Error::last_os_error()
                    );
                }
            }
        }

        Ok(NetlinkSocket { fd, seq: 1 })
    }

    /// Resolve `family` to its numeric family id and the ids of the named
    /// multicast groups, via a `CTRL_CMD_GETFAMILY` exchange with the
    /// generic netlink controller (family id [`GENL_ID_CTRL`]).
    pub fn resolve_family(&mut self, family: &str, groups: &[&str]) -> Result<(u16, Vec<u32>)> {
        let mut attrs = AttrWriter::new();
        attrs.push_str(CTRL_ATTR_FAMILY_NAME, family);
        let attr_bytes = attrs.into_bytes();

        self.send_genl(GENL_ID_CTRL, CTRL_CMD_GETFAMILY, 1, &attr_bytes)?;

        let mut buf = vec![0u8; 16 * 1024];
        let len = self.recv(&mut buf)?;
        let body = &buf[..len];

        if body.len() < NlMsgHdr::SIZE {
            return Err(Error::FamilyResolve(family.to_string()));
        }
        let (hdr, rest) = body.split_at(NlMsgHdr::SIZE);
        let nl_kind = u16::from_ne_bytes([hdr[4], hdr[5]]);
        if nl_kind == NLMSG_ERROR || nl_kind == NLMSG_DONE {
            return Err(Error::FamilyResolve(family.to_string()));
        }
        if rest.len() < GenlMsgHdr::SIZE {
            return Err(Error::FamilyResolve(family.to_string()));
        }
        let payload = &rest[GenlMsgHdr::SIZE..];

        let mut family_id = None;
        let mut group_ids = Vec::new();

        for (kind, attr_payload) in AttrReader::new(payload) {
            match kind {
                CTRL_ATTR_FAMILY_ID => family_id = attr_u32(attr_payload).map(|v| v as u16),
                CTRL_ATTR_MCAST_GROUPS => {
                    for (_, group_entry) in AttrReader::new(attr_payload) {
                        let mut name = None;
                        let mut id = None;
                        for (gk, gv) in AttrReader::new(group_entry) {
                            match gk {
                                CTRL_ATTR_MCAST_GRP_NAME => name = attr_cstr(gv),
                                CTRL_ATTR_MCAST_GRP_ID => id = attr_u32(gv),
                                _ => {}
                            }
                        }
                        if let (Some(name), Some(id)) = (name, id) {
                            if groups.contains(&name) {
                                group_ids.push(id);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let family_id = family_id.ok_or_else(|| Error::FamilyResolve(family.to_string()))?;
        if group_ids.len() != groups.len() {
            return Err(Error::FamilyResolve(format!(
                "{family}: not all requested multicast groups were found"
            )));
        }
        debug!("resolved netlink family '{family}' to id {family_id}, groups {group_ids:?}");
        Ok((family_id, group_ids))
    }

    /// Join a multicast group by numeric id.
    pub fn join_multicast_group(&self, group_id: u32) -> Result<()> {
        let rc = unsafe {
            libc::setsockopt(
                self.fd,
                SOL_NETLINK,
                NETLINK_ADD_MEMBERSHIP,
                &group_id as *const _ as *const libc::c_void,
                mem::size_of::<u32>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn send_genl(&mut self, family: u16, cmd: u8, version: u8, attrs: &[u8]) -> Result<()> {
        let genl_hdr = GenlMsgHdr {
            cmd,
            version,
            reserved: 0,
        };
        let total_len = nlmsg_align(NlMsgHdr::SIZE + GenlMsgHdr::SIZE + attrs.len());
        let nl_hdr = NlMsgHdr {
            len: total_len as u32,
            kind: family,
            flags: NLM_F_REQUEST | NLM_F_ACK,
            seq: self.seq,
            pid: 0,
        };
        self.seq = self.seq.wrapping_add(1);

        let mut buf = Vec::with_capacity(total_len);
        buf.extend_from_slice(zerocopy::IntoBytes::as_bytes(&nl_hdr));
        buf.extend_from_slice(zerocopy::IntoBytes::as_bytes(&genl_hdr));
        buf.extend_from_slice(attrs);
        buf.resize(total_len, 0);

        let rc = unsafe { libc::send(self.fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
        if rc < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Blocking receive of one datagram into `buf`. Returns the number of
    /// bytes read.
    pub fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let rc = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if rc < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(rc as usize)
        }
    }
}

impl Drop for NetlinkSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// A decoded generic-netlink frame: the command byte plus its attribute
/// payload, ready for [`crate::listener::EventListener`] to interpret.
pub struct GenlFrame<'a> {
    pub cmd: u8,
    pub attrs: AttrReader<'a>,
}

/// Parse a raw netlink datagram down to its generic-netlink command and
/// attribute payload. Returns `None` on any framing error (logged by the
/// caller at the debug level and skipped, per the listener's frame-decode
/// contract).
pub fn parse_genl_frame(buf: &[u8]) -> Option<GenlFrame<'_>> {
    if buf.len() < NlMsgHdr::SIZE {
        return None;
    }
    let (nl_hdr, rest) = zerocopy::Ref::<_, NlMsgHdr>::from_prefix(buf).ok()?;
    let nl_hdr = zerocopy::Ref::<&[u8], NlMsgHdr>::into_ref(nl_hdr);
    if nl_hdr.kind == NLMSG_ERROR || nl_hdr.kind == NLMSG_DONE {
        return None;
    }
    if rest.len() < GenlMsgHdr::SIZE {
        return None;
    }
    let (genl_hdr, attr_bytes) = zerocopy::Ref::<_, GenlMsgHdr>::from_prefix(rest).ok()?;
    let genl_hdr = zerocopy::Ref::<&[u8], GenlMsgHdr>::into_ref(genl_hdr);
    Some(GenlFrame {
        cmd: genl_hdr.cmd,
        attrs: AttrReader::new(attr_bytes),
    })
}

pub(crate) use attr::{attr_cstr, attr_i32, attr_u16, attr_u32, attr_u8};

/// Type alias exposed to the listener so it need not name the private
/// `attr` submodule directly.
pub(crate) type GenlAttrs<'a> = AttrReader<'a>;
