//! Netlink attribute (TLV) decoding and encoding.
//!
//! This is the generic-netlink analogue of `ll::argument::ArgumentIterator`:
//! a cursor over a byte slice that peels off one typed attribute at a time.
//! The one wrinkle netlink adds over the FUSE wire format is 4-byte alignment
//! padding between attributes, handled transparently by [`AttrReader`].

use super::wire::{nlmsg_align, NlAttrHdr};
use std::ffi::CStr;
use zerocopy::error::ConvertError;

/// An iterator over a buffer of back-to-back `nlattr` TLVs.
pub(crate) struct AttrReader<'a> {
    data: &'a [u8],
}

impl<'a> AttrReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> AttrReader<'a> {
        AttrReader { data }
    }
}

impl<'a> Iterator for AttrReader<'a> {
    /// `(attribute type, raw payload)`.
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let hdr: &NlAttrHdr = match zerocopy::Ref::<_, NlAttrHdr>::from_prefix(self.data) {
            Err(ConvertError::Alignment(_)) => panic!("netlink attribute header unaligned"),
            Err(ConvertError::Size(_)) => return None,
            Err(ConvertError::Validity(infallible)) => match infallible {},
            Ok((hdr, _rest)) => zerocopy::Ref::<&[u8], NlAttrHdr>::into_ref(hdr),
        };
        let total_len = hdr.len as usize;
        let kind = hdr.kind;
        if total_len < NlAttrHdr::SIZE || total_len > self.data.len() {
            return None;
        }
        let payload = &self.data[NlAttrHdr::SIZE..total_len];
        let padded = nlmsg_align(total_len).min(self.data.len());
        self.data = &self.data[padded..];
        Some((kind, payload))
    }
}

/// Interpret an attribute payload as a NUL-terminated string, as the kernel
/// module sends `path` attributes.
pub(crate) fn attr_cstr(payload: &[u8]) -> Option<&str> {
    let cstr = CStr::from_bytes_until_nul(payload).ok()?;
    cstr.to_str().ok()
}

pub(crate) fn attr_u8(payload: &[u8]) -> Option<u8> {
    payload.first().copied()
}

pub(crate) fn attr_u16(payload: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = payload.get(..2)?.try_into().ok()?;
    Some(u16::from_ne_bytes(bytes))
}

pub(crate) fn attr_u32(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.get(..4)?.try_into().ok()?;
    Some(u32::from_ne_bytes(bytes))
}

pub(crate) fn attr_i32(payload: &[u8]) -> Option<i32> {
    attr_u32(payload).map(|v| v as i32)
}

/// A small builder for outgoing request attributes (used only for the
/// `CTRL_CMD_GETFAMILY` family-resolution query).
pub(crate) struct AttrWriter {
    buf: Vec<u8>,
}

impl AttrWriter {
    pub(crate) fn new() -> AttrWriter {
        AttrWriter { buf: Vec::new() }
    }

    pub(crate) fn push_str(&mut self, kind: u16, value: &str) {
        let mut payload = value.as_bytes().to_vec();
        payload.push(0);
        self.push_raw(kind, &payload);
    }

    fn push_raw(&mut self, kind: u16, payload: &[u8]) {
        let hdr = NlAttrHdr {
            len: (NlAttrHdr::SIZE + payload.len()) as u16,
            kind,
        };
        self.buf.extend_from_slice(zerocopy::IntoBytes::as_bytes(&hdr));
        self.buf.extend_from_slice(payload);
        let padded = nlmsg_align(self.buf.len());
        self.buf.resize(padded, 0);
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_attr() {
        let mut writer = AttrWriter::new();
        writer.push_str(1, "vfs-anything");
        let bytes = writer.into_bytes();
        let mut reader = AttrReader::new(&bytes);
        let (kind, payload) = reader.next().unwrap();
        assert_eq!(kind, 1);
        assert_eq!(attr_cstr(payload), Some("vfs-anything"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn multiple_attrs_survive_padding() {
        let mut writer = AttrWriter::new();
        writer.push_str(1, "a");
        writer.push_str(2, "longer-value-here");
        let bytes = writer.into_bytes();
        let attrs: Vec<_> = AttrReader::new(&bytes).collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].0, 1);
        assert_eq!(attrs[1].0, 2);
        assert_eq!(attr_cstr(attrs[1].1), Some("longer-value-here"));
    }

    #[test]
    fn truncated_buffer_stops_cleanly() {
        let mut reader = AttrReader::new(&[0, 0, 0]);
        assert!(reader.next().is_none());
    }
}
