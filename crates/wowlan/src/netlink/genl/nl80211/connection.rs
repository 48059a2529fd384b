//! nl80211 connection: the kernel-backed WoWLAN transport.

use std::time::Duration;

use super::{
    NL80211_GENL_NAME, NL80211_GENL_VERSION, NL80211_MULTICAST_GROUP_MLME, Nl80211Attr,
    Nl80211Cmd, Nl80211Message,
};
use crate::netlink::builder::AttrBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::GenlConnection;
use crate::wowlan::WowlanTransport;

/// How long to wait for the kernel to answer a request.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection to the nl80211 Generic Netlink family.
///
/// Requests go out on one socket. Wake notifications are received on a
/// second socket joined to the "mlme" multicast group, so unsolicited events
/// never interleave with request replies.
pub struct Nl80211Connection {
    genl: GenlConnection,
    family_id: u16,
    events: Option<GenlConnection>,
    timeout: Duration,
}

impl Nl80211Connection {
    /// Open a connection and resolve the nl80211 family.
    pub async fn new() -> Result<Self> {
        Self::from_genl(GenlConnection::new()?).await
    }

    /// Create an nl80211 connection from an existing GENL connection.
    pub async fn from_genl(mut genl: GenlConnection) -> Result<Self> {
        let family_id = genl.get_family(NL80211_GENL_NAME).await?.id;
        Ok(Self {
            genl,
            family_id,
            events: None,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    /// Override the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolved family ID.
    pub fn family_id(&self) -> u16 {
        self.family_id
    }

    /// Run `cmd`, bounded by the response timeout.
    async fn command(&self, msg: &Nl80211Message) -> Result<Vec<Nl80211Message>> {
        let name = Nl80211Cmd::name(msg.cmd());
        let fut = self.genl.command(
            self.family_id,
            msg.cmd(),
            NL80211_GENL_VERSION,
            msg.attr_bytes(),
        );
        let replies = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{name} reply")))?
            .map_err(|e| e.with_context(name))?;

        replies
            .iter()
            .map(|payload| Nl80211Message::from_genl_payload(payload))
            .collect()
    }

    /// Dump the capabilities of wiphy `index`.
    ///
    /// Uses the split dump format; the pieces are merged into one
    /// `NL80211_CMD_NEW_WIPHY` message.
    pub async fn get_wiphy(&self, index: u32) -> Result<Nl80211Message> {
        let mut attrs = AttrBuilder::new();
        attrs.append_attr_u32(Nl80211Attr::Wiphy as u16, index);
        attrs.append_attr_flag(Nl80211Attr::SplitWiphyDump as u16);

        let fut = self.genl.dump_command(
            self.family_id,
            Nl80211Cmd::GetWiphy as u8,
            NL80211_GENL_VERSION,
            attrs.as_bytes(),
        );
        let replies = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout("NL80211_CMD_GET_WIPHY dump".into()))??;

        let mut merged: Option<Nl80211Message> = None;
        for payload in &replies {
            let piece = Nl80211Message::from_genl_payload(payload)?;
            if !piece.is(Nl80211Cmd::NewWiphy) || piece.wiphy_index() != Some(index) {
                continue;
            }
            match merged.as_mut() {
                Some(msg) => msg.merge(&piece),
                None => merged = Some(piece),
            }
        }

        merged.ok_or_else(|| Error::NotFound(format!("wiphy {index}")))
    }

    /// Join the nl80211 "mlme" multicast group to receive wake notifications.
    pub async fn subscribe_wake_events(&mut self) -> Result<()> {
        if self.events.is_some() {
            return Ok(());
        }

        let family = self.genl.get_family(NL80211_GENL_NAME).await?;
        let group = *family
            .mcast_groups
            .get(NL80211_MULTICAST_GROUP_MLME)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "multicast group {NL80211_MULTICAST_GROUP_MLME} of {NL80211_GENL_NAME}"
                ))
            })?;

        let mut events = GenlConnection::new()?;
        events.socket_mut().add_membership(group)?;
        tracing::debug!(group, "subscribed to nl80211 mlme events");
        self.events = Some(events);
        Ok(())
    }

    /// Wait for the next batch of nl80211 notifications.
    ///
    /// Requires [`subscribe_wake_events`](Self::subscribe_wake_events).
    /// Messages that fail to decode are logged and skipped.
    pub async fn recv_notifications(&self) -> Result<Vec<Nl80211Message>> {
        let events = self.events.as_ref().ok_or_else(|| {
            Error::OperationFailed("not subscribed to nl80211 wake events".into())
        })?;

        let payloads = events.recv_multicast().await?;
        Ok(payloads
            .iter()
            .filter_map(|payload| match Nl80211Message::from_genl_payload(payload) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    tracing::warn!("dropping malformed nl80211 notification: {e}");
                    None
                }
            })
            .collect())
    }
}

impl WowlanTransport for Nl80211Connection {
    async fn send(&mut self, msg: &Nl80211Message) -> Result<()> {
        self.command(msg).await.map(|_| ())
    }

    async fn request(&mut self, msg: &Nl80211Message) -> Result<Nl80211Message> {
        self.command(msg).await?.into_iter().next().ok_or_else(|| {
            Error::InvalidMessage(format!("no reply to {}", Nl80211Cmd::name(msg.cmd())))
        })
    }
}
