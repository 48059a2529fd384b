//! Async wake-on-WiFi control for Linux connection managers.
//!
//! This crate programs a wireless adapter's WoWLAN triggers over nl80211
//! (generic netlink) and runs the host side of the suspend / dark resume
//! protocol: which conditions should wake the host, verifying the adapter
//! took the settings, and what to do when it wakes.
//!
//! - [`netlink`]: netlink framing, attribute trees, generic netlink and the
//!   nl80211 binding.
//! - [`wowlan`]: pattern and message codecs, the trigger manager, the
//!   suspend/resume controller and its service loop.
//!
//! # Example
//!
//! ```ignore
//! use wowlan::netlink::genl::nl80211::Nl80211Connection;
//! use wowlan::wowlan::{SuspendResumeController, WakeOnWifiConfig, service};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> wowlan::Result<()> {
//!     let conn = Nl80211Connection::new().await?;
//!     let wiphy = conn.get_wiphy(0).await?;
//!
//!     let config = WakeOnWifiConfig::from_json(&std::fs::read_to_string("wowlan.json")?)?;
//!     let mut controller = SuspendResumeController::new(conn, hooks, config);
//!     controller.on_new_wiphy(&wiphy);
//!
//!     let mut events = Nl80211Connection::new().await?;
//!     events.subscribe_wake_events().await?;
//!
//!     let (handle, requests) = service::channel(16);
//!     tokio::join!(
//!         controller.run(requests),
//!         service::forward_wake_notifications(&events, &handle),
//!     );
//!     Ok(())
//! }
//! ```

pub mod netlink;
pub mod wowlan;

pub use netlink::{Error, Result};
