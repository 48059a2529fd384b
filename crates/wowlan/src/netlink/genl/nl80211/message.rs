//! Owned nl80211 message: a command plus its attribute tree.

use super::{Nl80211Attr, Nl80211Cmd};
use crate::netlink::attr::AttrTable;
use crate::netlink::error::Result;
use crate::netlink::genl::GenlMsgHdr;

/// An nl80211 message stripped of its netlink and GENL framing.
///
/// Outgoing messages are built by the codec and framed by the connection;
/// incoming replies and notifications are decoded into this form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nl80211Message {
    cmd: u8,
    attrs: Vec<u8>,
}

impl Nl80211Message {
    /// Wrap an attribute stream with a command.
    pub fn new(cmd: Nl80211Cmd, attrs: Vec<u8>) -> Self {
        Self {
            cmd: cmd as u8,
            attrs,
        }
    }

    /// Wrap an attribute stream with a raw command number.
    pub fn from_raw(cmd: u8, attrs: Vec<u8>) -> Self {
        Self { cmd, attrs }
    }

    /// Decode a GENL payload (genlmsghdr followed by attributes).
    pub fn from_genl_payload(payload: &[u8]) -> Result<Self> {
        let (hdr, attrs) = GenlMsgHdr::split(payload)?;
        Ok(Self {
            cmd: hdr.cmd,
            attrs: attrs.to_vec(),
        })
    }

    /// Raw command number.
    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    /// Whether this message carries command `cmd`.
    pub fn is(&self, cmd: Nl80211Cmd) -> bool {
        self.cmd == cmd as u8
    }

    /// Top level of the attribute tree.
    pub fn attrs(&self) -> AttrTable<'_> {
        AttrTable::parse(&self.attrs)
    }

    /// Raw attribute bytes.
    pub fn attr_bytes(&self) -> &[u8] {
        &self.attrs
    }

    /// The `NL80211_ATTR_WIPHY` index, if present and well formed.
    pub fn wiphy_index(&self) -> Option<u32> {
        self.attrs().u32(Nl80211Attr::Wiphy).ok().flatten()
    }

    /// Append another message's attributes (split dumps arrive in pieces).
    pub(crate) fn merge(&mut self, other: &Nl80211Message) {
        self.attrs.extend_from_slice(&other.attrs);
    }
}
