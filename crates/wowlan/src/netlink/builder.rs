//! Builders for netlink messages and attribute streams.
//!
//! [`AttrBuilder`] produces a bare attribute stream (what an nl80211 message
//! carries after its generic netlink header). [`MessageBuilder`] frames a
//! complete netlink message around fixed headers and such a stream.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NLA_HDRLEN, NlAttr, nla_align, nla_len};
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
#[must_use = "a nest must be closed with nest_end"]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Builder for a stream of (possibly nested) netlink attributes.
///
/// An attribute or nest too long for its 16-bit length is not written; the
/// first such error is returned by [`try_finish`](Self::try_finish).
#[derive(Debug, Default)]
pub struct AttrBuilder {
    buf: Vec<u8>,
    error: Option<Error>,
}

impl AttrBuilder {
    /// Create an empty attribute stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        let attr = match NlAttr::new(attr_type, data.len()) {
            Ok(attr) => attr,
            Err(e) => return self.fail(e),
        };
        self.buf.extend_from_slice(attr.as_bytes());
        self.buf.extend_from_slice(data);
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append an empty (flag) attribute with no payload.
    pub fn append_attr_flag(&mut self, attr_type: u16) {
        self.append_attr(attr_type, &[]);
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        self.append_attr(attr_type, &data);
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.buf.len();
        let attr = NlAttr {
            nla_len: NLA_HDRLEN as u16,
            nla_type: attr_type | NLA_F_NESTED,
        };
        self.buf.extend_from_slice(attr.as_bytes());
        NestToken { offset }
    }

    /// End a nested attribute started with `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) {
        match nla_len(self.buf.len() - token.offset) {
            Ok(len) => {
                self.buf[token.offset..token.offset + 2].copy_from_slice(&len.to_ne_bytes())
            }
            Err(e) => self.fail(e),
        }
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn fail(&mut self, e: Error) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    /// Finalize and return the attribute bytes.
    ///
    /// For streams whose size is fixed; anything carrying caller-supplied
    /// lists goes through [`try_finish`](Self::try_finish).
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Finalize, failing if any attribute or nest overflowed its length.
    pub fn try_finish(self) -> Result<Vec<u8>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.buf),
        }
    }
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        let header = NlMsgHdr::new(msg_type, flags);
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        Self { buf }
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a fixed-size wire struct to the message.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    }

    /// Finalize and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}
