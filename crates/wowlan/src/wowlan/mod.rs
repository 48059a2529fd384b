//! Wake-on-WiFi control.
//!
//! Programs the adapter's WoWLAN triggers over nl80211 before suspend,
//! verifies them, and runs the dark-resume protocol that keeps the device
//! minimally connected while asleep.
//!
//! # Layers
//!
//! - [`WakePattern`]: IP address to packet-filter pattern + mask.
//! - [`codec`]: builds and checks `NL80211_CMD_{SET,GET}_WOWLAN` attribute trees.
//! - [`SupportedTriggers`]: what the adapter advertises.
//! - [`WakeTriggerManager`]: programs the adapter and verifies with bounded retries.
//! - [`WakeReason`]: classifies the wake notification sent on resume.
//! - [`SuspendResumeController`]: suspend / dark-resume orchestration and throttling.
//! - [`service`]: event loop and async handle around the controller.
//!
//! # Example
//!
//! ```rust,no_run
//! use wowlan::netlink::genl::nl80211::Nl80211Connection;
//! use wowlan::wowlan::{FreqSet, SuspendResumeController, WakeOnWifiConfig, WifiHooks, service};
//!
//! struct Hooks;
//!
//! impl WifiHooks for Hooks {
//!     fn renew_lease(&mut self) {}
//!     fn remove_all_managed_networks(&mut self) {}
//!     fn initiate_scan(&mut self, _freqs: &FreqSet) {}
//! }
//!
//! # async fn example() -> wowlan::Result<()> {
//! let conn = Nl80211Connection::new().await?;
//! let wiphy = conn.get_wiphy(0).await?;
//!
//! let mut controller = SuspendResumeController::new(conn, Hooks, WakeOnWifiConfig::default());
//! controller.on_new_wiphy(&wiphy);
//!
//! let (handle, requests) = service::channel(16);
//! let (_controller, suspended) = tokio::join!(controller.run(requests), async move {
//!     handle.before_suspend(true, vec![b"home".to_vec()], false, 0).await
//! });
//! suspended?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;

pub mod capability;
pub mod clock;
pub mod codec;
pub mod config;
pub mod controller;
pub mod history;
pub mod pattern;
pub mod service;
mod timer;
mod transport;
pub mod triggers;
pub mod wake_reason;

pub use capability::SupportedTriggers;
pub use clock::{BootClock, Clock, SimulatedBootClock};
pub use config::{WakeOnWifiConfig, WakeOnWifiFeatures};
pub use controller::{ControllerState, SuspendResumeController};
pub use history::DarkResumeHistory;
pub use pattern::WakePattern;
pub use service::{Request, WakeOnWifiHandle, forward_wake_notifications};
pub use timer::OneShotTimer;
pub use transport::{WifiHooks, WowlanTransport};
pub use triggers::{ManagerState, WakeTriggerManager};
pub use wake_reason::WakeReason;

/// One class of wake condition the adapter can be programmed with.
///
/// Ordered so that sets iterate Pattern, Disconnect, SsidNetDetect, which is
/// also the order the triggers are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriggerKind {
    /// An incoming packet matched a registered IP address pattern.
    Pattern,
    /// The link to the access point was lost.
    Disconnect,
    /// A whitelisted network became visible during a net-detect scan.
    SsidNetDetect,
}

/// A set of trigger kinds.
pub type TriggerSet = BTreeSet<TriggerKind>;

/// Radio frequencies in MHz.
pub type FreqSet = BTreeSet<u32>;

/// A network name as raw bytes (SSIDs are not necessarily UTF-8).
pub type Ssid = Vec<u8>;
