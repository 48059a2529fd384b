//! Generic Netlink connection with family resolution.

use std::collections::HashMap;

use super::header::{GENL_HDRLEN, GenlMsgHdr};
use super::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL};
use crate::netlink::attr::{AttrIter, get};
use crate::netlink::builder::{AttrBuilder, MessageBuilder};
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{MessageIter, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError};
use crate::netlink::socket::NetlinkSocket;

/// Information about a Generic Netlink family.
#[derive(Debug, Clone)]
pub struct FamilyInfo {
    /// Dynamically assigned family ID (used as nlmsg_type).
    pub id: u16,
    /// Family version.
    pub version: u8,
    /// Maximum attribute number.
    pub max_attr: u32,
    /// Multicast groups: name -> group ID.
    pub mcast_groups: HashMap<String, u32>,
}

/// Generic Netlink connection.
///
/// Provides family ID resolution and request/response plumbing.
/// Family information is cached to avoid repeated kernel queries.
pub struct GenlConnection {
    socket: NetlinkSocket,
    families: HashMap<String, FamilyInfo>,
}

impl GenlConnection {
    /// Create a new Generic Netlink connection.
    pub fn new() -> Result<Self> {
        Ok(Self::from_socket(NetlinkSocket::generic()?))
    }

    /// Create a GENL connection from an existing generic socket.
    pub fn from_socket(socket: NetlinkSocket) -> Self {
        Self {
            socket,
            families: HashMap::new(),
        }
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    /// Get the underlying socket mutably (for multicast membership).
    pub fn socket_mut(&mut self) -> &mut NetlinkSocket {
        &mut self.socket
    }

    /// Get information about a Generic Netlink family.
    ///
    /// The result is cached, so subsequent calls for the same family
    /// do not require kernel communication.
    pub async fn get_family(&mut self, name: &str) -> Result<FamilyInfo> {
        if let Some(info) = self.families.get(name) {
            return Ok(info.clone());
        }

        let info = self.query_family(name).await?;
        tracing::debug!(family = name, id = info.id, "resolved generic netlink family");
        self.families.insert(name.to_string(), info.clone());
        Ok(info)
    }

    /// Query the kernel for family information.
    async fn query_family(&self, name: &str) -> Result<FamilyInfo> {
        let mut attrs = AttrBuilder::new();
        attrs.append_attr_str(CtrlAttr::FamilyName as u16, name);

        let responses = self
            .command(GENL_ID_CTRL, CtrlCmd::GetFamily as u8, 1, attrs.as_bytes())
            .await
            .map_err(|e| {
                if e.errno() == Some(libc::ENOENT) {
                    Error::FamilyNotFound {
                        name: name.to_string(),
                    }
                } else {
                    e
                }
            })?;

        let payload = responses.first().ok_or_else(|| Error::FamilyNotFound {
            name: name.to_string(),
        })?;
        let (_, attrs_data) = GenlMsgHdr::split(payload)?;
        parse_family_attrs(attrs_data)
    }

    fn request(
        &self,
        family_id: u16,
        flags: u16,
        cmd: u8,
        version: u8,
        attrs: &[u8],
    ) -> (Vec<u8>, u32) {
        let mut builder = MessageBuilder::new(family_id, flags);
        builder.append(&GenlMsgHdr::new(cmd, version));
        builder.append_bytes(attrs);

        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());
        (builder.finish(), seq)
    }

    /// Send a GENL command and wait for its acknowledgement.
    ///
    /// Returns every reply message (GENL header included) that the kernel sent
    /// before the ACK. Commands that only change state return an empty list.
    pub async fn command(
        &self,
        family_id: u16,
        cmd: u8,
        version: u8,
        attrs: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        let (msg, seq) = self.request(family_id, NLM_F_REQUEST | NLM_F_ACK, cmd, version, attrs);
        self.socket.send(&msg).await?;

        let mut responses = Vec::new();
        loop {
            let data = self.socket.recv_msg().await?;
            if collect_replies(&data, seq, &mut responses)? {
                return Ok(responses);
            }
        }
    }

    /// Send a GENL dump command and collect all responses.
    pub async fn dump_command(
        &self,
        family_id: u16,
        cmd: u8,
        version: u8,
        attrs: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        let (msg, seq) = self.request(family_id, NLM_F_REQUEST | NLM_F_DUMP, cmd, version, attrs);
        self.socket.send(&msg).await?;

        let mut responses = Vec::new();
        loop {
            let data = self.socket.recv_msg().await?;
            if collect_replies(&data, seq, &mut responses)? {
                return Ok(responses);
            }
        }
    }

    /// Receive the next batch of unsolicited (multicast) messages.
    pub async fn recv_multicast(&self) -> Result<Vec<Vec<u8>>> {
        loop {
            let data = self.socket.recv_msg().await?;
            let mut messages = Vec::new();
            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != 0 || header.is_error() || header.is_done() {
                    continue;
                }
                messages.push(payload.to_vec());
            }
            if !messages.is_empty() {
                return Ok(messages);
            }
        }
    }
}

/// Collect the replies to `seq` out of one datagram.
///
/// Returns `true` once the terminating ACK or DONE has been seen.
fn collect_replies(data: &[u8], seq: u32, responses: &mut Vec<Vec<u8>>) -> Result<bool> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq {
            continue;
        }

        if header.is_error() {
            let err = NlMsgError::from_bytes(payload)?;
            err.into_result(payload)?;
            return Ok(true);
        }

        if header.is_done() {
            return Ok(true);
        }

        if payload.len() < GENL_HDRLEN {
            return Err(Error::InvalidMessage("GENL header too short".into()));
        }
        responses.push(payload.to_vec());
    }
    Ok(false)
}

/// Parse family attributes from a CTRL_CMD_GETFAMILY response.
fn parse_family_attrs(data: &[u8]) -> Result<FamilyInfo> {
    let mut id: Option<u16> = None;
    let mut version: u8 = 0;
    let mut max_attr: u32 = 0;
    let mut mcast_groups = HashMap::new();

    for (attr_type, payload) in AttrIter::new(data) {
        match attr_type {
            t if t == CtrlAttr::FamilyId as u16 => {
                id = Some(get::u16_ne(payload)?);
            }
            t if t == CtrlAttr::Version as u16 => {
                version = get::u32_ne(payload)? as u8;
            }
            t if t == CtrlAttr::MaxAttr as u16 => {
                max_attr = get::u32_ne(payload)?;
            }
            t if t == CtrlAttr::McastGroups as u16 => {
                mcast_groups = parse_mcast_groups(payload)?;
            }
            _ => {}
        }
    }

    let id = id.ok_or_else(|| Error::InvalidMessage("missing family ID".into()))?;

    Ok(FamilyInfo {
        id,
        version,
        max_attr,
        mcast_groups,
    })
}

/// Parse multicast groups from CTRL_ATTR_MCAST_GROUPS.
fn parse_mcast_groups(data: &[u8]) -> Result<HashMap<String, u32>> {
    let mut groups = HashMap::new();

    for (_group_idx, group_payload) in AttrIter::new(data) {
        let mut name: Option<String> = None;
        let mut grp_id: Option<u32> = None;

        for (attr_type, payload) in AttrIter::new(group_payload) {
            match attr_type {
                t if t == CtrlAttrMcastGrp::Name as u16 => {
                    name = Some(get::string(payload)?.to_string());
                }
                t if t == CtrlAttrMcastGrp::Id as u16 => {
                    grp_id = Some(get::u32_ne(payload)?);
                }
                _ => {}
            }
        }

        if let (Some(name), Some(id)) = (name, grp_id) {
            groups.insert(name, id);
        }
    }

    Ok(groups)
}
