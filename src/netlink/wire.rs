//! Wire-level structures for generic netlink (`NETLINK_GENERIC`) messages.
//!
//! These mirror `struct nlmsghdr` / `struct genlmsghdr` from
//! `<linux/netlink.h>` / `<linux/genetlink.h>`. They are decoded with the
//! same zerocopy-backed approach the rest of the pack uses for kernel wire
//! structures: `#[repr(C)]` plus `FromBytes`/`Immutable`/`KnownLayout` so a
//! received buffer can be reinterpreted in place without a manual byte-by-byte
//! parser.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const NLMSG_ALIGNTO: usize = 4;

/// Round `len` up to the next 4-byte netlink alignment boundary.
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

pub const NLMSG_ERROR: u16 = 0x2;
pub const NLMSG_DONE: u16 = 0x3;
pub const NLM_F_REQUEST: u16 = 0x1;
pub const NLM_F_ACK: u16 = 0x4;
pub const NLM_F_DUMP: u16 = 0x100 | 0x200; // NLM_F_ROOT | NLM_F_MATCH

pub const GENL_ID_CTRL: u16 = 0x10;
pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
pub const CTRL_ATTR_MCAST_GROUPS: u16 = 7;
pub const CTRL_ATTR_MCAST_GRP_NAME: u16 = 1;
pub const CTRL_ATTR_MCAST_GRP_ID: u16 = 2;

/// `struct nlmsghdr`.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    pub len: u32,
    pub kind: u16,
    pub flags: u16,
    pub seq: u32,
    pub pid: u32,
}

impl NlMsgHdr {
    pub const SIZE: usize = std::mem::size_of::<NlMsgHdr>();
}

/// `struct genlmsghdr`.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    pub cmd: u8,
    pub version: u8,
    pub reserved: u16,
}

impl GenlMsgHdr {
    pub const SIZE: usize = std::mem::size_of::<GenlMsgHdr>();
}

/// `struct nlattr`.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttrHdr {
    pub len: u16,
    pub kind: u16,
}

impl NlAttrHdr {
    pub const SIZE: usize = std::mem::size_of::<NlAttrHdr>();
}

/// `struct sockaddr_nl`, built by hand since libc's definition on some targets
/// lacks the padding fields we need to zero explicitly.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SockAddrNl {
    pub nl_family: libc::sa_family_t,
    pub nl_pad: u16,
    pub nl_pid: u32,
    pub nl_groups: u32,
}
