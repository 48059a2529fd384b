//! Async generic netlink plumbing for nl80211.
//!
//! Framing, attribute trees and a tokio-driven socket, kept to what the
//! WoWLAN control path needs.
//!
//! # Quick Start
//!
//! ```ignore
//! use wowlan::netlink::genl::nl80211::Nl80211Connection;
//!
//! let mut conn = Nl80211Connection::new().await?;
//! conn.subscribe_wake_events().await?;
//! for msg in conn.recv_notifications().await? {
//!     println!("nl80211 command {}", msg.cmd());
//! }
//! ```

pub mod attr;
pub mod builder;
mod error;
pub mod genl;
pub mod message;
mod socket;

pub use attr::{AttrIter, AttrTable, NlAttr};
pub use builder::{AttrBuilder, MessageBuilder, NestToken};
pub use error::{Error, Result};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use socket::NetlinkSocket;
