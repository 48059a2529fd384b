//! Netlink attribute (nlattr) parsing.
//!
//! nl80211 messages are trees of type-length-value attributes. [`AttrIter`]
//! walks one level of a buffer, [`AttrTable`] indexes one level by type so
//! callers can ask "is attribute N present" and descend into nests.

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Wire length of an attribute spanning `len` bytes, header included.
pub fn nla_len(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        Error::InvalidAttribute(format!("{len} bytes exceed the attribute length limit"))
    })
}

impl NlAttr {
    /// Create a new attribute header.
    ///
    /// Fails if the header plus `data_len` bytes do not fit `nla_len`.
    pub fn new(attr_type: u16, data_len: usize) -> Result<Self> {
        Ok(Self {
            nla_len: nla_len(NLA_HDRLEN + data_len)?,
            nla_type: attr_type,
        })
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Stops at the first malformed header; trailing garbage is ignored.
#[derive(Debug, Clone)]
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLA_HDRLEN {
            return None;
        }

        let attr = NlAttr::from_bytes(self.data).ok()?;
        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            self.data = &[];
            return None;
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);
        self.data = self.data.get(aligned_len..).unwrap_or(&[]);

        Some((attr.kind(), payload))
    }
}

/// One level of an attribute tree, indexed by attribute type.
///
/// When a type appears more than once the last occurrence wins, matching the
/// kernel's `nla_parse` behaviour.
#[derive(Debug, Clone, Default)]
pub struct AttrTable<'a> {
    entries: Vec<(u16, &'a [u8])>,
}

impl<'a> AttrTable<'a> {
    /// Index every attribute at the top of `data`.
    pub fn parse(data: &'a [u8]) -> Self {
        Self {
            entries: AttrIter::new(data).collect(),
        }
    }

    /// Payload of attribute `kind`, if present.
    pub fn get(&self, kind: impl Into<u16>) -> Option<&'a [u8]> {
        let kind = kind.into();
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, payload)| *payload)
    }

    /// Whether attribute `kind` is present (flag attributes carry no payload).
    pub fn has(&self, kind: impl Into<u16>) -> bool {
        self.get(kind).is_some()
    }

    /// Descend into nested attribute `kind`.
    pub fn nested(&self, kind: impl Into<u16>) -> Option<AttrTable<'a>> {
        self.get(kind).map(AttrTable::parse)
    }

    /// Read attribute `kind` as a native-endian u32.
    ///
    /// Returns `Ok(None)` when absent and an error when present but too short.
    pub fn u32(&self, kind: impl Into<u16>) -> Result<Option<u32>> {
        self.get(kind).map(get::u32_ne).transpose()
    }

    /// Iterate over all attributes of this level in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &'a [u8])> + '_ {
        self.entries.iter().copied()
    }

    /// Number of attributes at this level.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this level carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        match data {
            [a, b, ..] => Ok(u16::from_ne_bytes([*a, *b])),
            _ => Err(Error::InvalidAttribute("truncated u16 attribute".into())),
        }
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        match data {
            [a, b, c, d, ..] => Ok(u32::from_ne_bytes([*a, *b, *c, *d])),
            _ => Err(Error::InvalidAttribute("truncated u32 attribute".into())),
        }
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }
}
