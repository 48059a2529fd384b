//! Seams to the kernel and to the rest of the connection manager.

use super::FreqSet;
use crate::netlink::Result;
use crate::netlink::genl::nl80211::Nl80211Message;

/// Carries WoWLAN messages to the adapter.
///
/// [`Nl80211Connection`](crate::netlink::genl::nl80211::Nl80211Connection)
/// is the kernel-backed implementation.
#[allow(async_fn_in_trait)]
pub trait WowlanTransport {
    /// Send a configuration message.
    ///
    /// An [`Error::is_not_supported`](crate::Error::is_not_supported) error
    /// means the adapter rejected a trigger kind;
    /// [`Error::is_timeout`](crate::Error::is_timeout) means no answer came
    /// back, which callers may treat as accepted.
    async fn send(&mut self, msg: &Nl80211Message) -> Result<()>;

    /// Send a query and wait for its reply.
    async fn request(&mut self, msg: &Nl80211Message) -> Result<Nl80211Message>;
}

/// Actions the controller asks the host connection manager to take.
pub trait WifiHooks {
    /// Renew the DHCP lease of the current connection.
    fn renew_lease(&mut self);

    /// Drop every network the supplicant has been told to connect to.
    fn remove_all_managed_networks(&mut self);

    /// Start a passive scan; an empty set means all frequencies.
    fn initiate_scan(&mut self, freqs: &FreqSet);

    /// Report why the host woke ("WiFi.Pattern", "WiFi.Disconnect", ...).
    fn record_wake_reason(&mut self, _label: &str) {}
}
