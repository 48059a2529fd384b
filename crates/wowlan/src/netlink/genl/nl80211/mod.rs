//! nl80211 wireless configuration via Generic Netlink.
//!
//! Only the slice of `linux/nl80211.h` needed for wake-on-WLAN is bound here:
//! the WoWLAN set/get commands, the wiphy capability dump and the wake
//! notification the kernel multicasts on resume.
//!
//! # Example
//!
//! ```rust,no_run
//! use wowlan::netlink::genl::nl80211::Nl80211Connection;
//! use wowlan::wowlan::SupportedTriggers;
//!
//! # async fn example() -> wowlan::Result<()> {
//! let mut conn = Nl80211Connection::new().await?;
//! let wiphy = conn.get_wiphy(0).await?;
//! let supported = SupportedTriggers::parse(&wiphy);
//! println!("max patterns: {}", supported.max_patterns);
//! # Ok(())
//! # }
//! ```

mod connection;
mod message;

pub use connection::Nl80211Connection;
pub use message::Nl80211Message;

/// nl80211 Generic Netlink family name.
pub const NL80211_GENL_NAME: &str = "nl80211";

/// nl80211 Generic Netlink version.
pub const NL80211_GENL_VERSION: u8 = 1;

/// Multicast group carrying MLME events, including the wake notification.
pub const NL80211_MULTICAST_GROUP_MLME: &str = "mlme";

/// nl80211 commands used by this crate.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nl80211Cmd {
    Unspec = 0,
    GetWiphy = 1,
    NewWiphy = 3,
    GetWowlan = 73,
    SetWowlan = 74,
}

impl Nl80211Cmd {
    /// Symbolic name, for logs.
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            1 => "NL80211_CMD_GET_WIPHY",
            3 => "NL80211_CMD_NEW_WIPHY",
            73 => "NL80211_CMD_GET_WOWLAN",
            74 => "NL80211_CMD_SET_WOWLAN",
            _ => "NL80211_CMD_UNKNOWN",
        }
    }
}

/// Top-level nl80211 attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nl80211Attr {
    Unspec = 0,
    Wiphy = 1,
    ScanFrequencies = 44,
    Ssid = 52,
    WowlanTriggers = 117,
    WowlanTriggersSupported = 118,
    SchedScanInterval = 119,
    SchedScanMatch = 132,
    SplitWiphyDump = 174,
}

/// Attributes nested inside `WowlanTriggers` / `WowlanTriggersSupported`.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WowlanTrig {
    Invalid = 0,
    Any = 1,
    Disconnect = 2,
    MagicPkt = 3,
    PktPattern = 4,
    GtkRekeySupported = 5,
    NetDetect = 18,
    NetDetectResults = 19,
}

/// Attributes of one packet pattern entry.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PktPatAttr {
    Invalid = 0,
    Mask = 1,
    Pattern = 2,
    Offset = 3,
}

/// Attributes of one scheduled-scan match set.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedScanMatchAttr {
    Invalid = 0,
    Ssid = 1,
}

macro_rules! impl_attr_kind {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for u16 {
                fn from(attr: $ty) -> u16 {
                    attr as u16
                }
            }
        )*
    };
}

impl_attr_kind!(Nl80211Attr, WowlanTrig, PktPatAttr, SchedScanMatchAttr);

/// Wire layout of `struct nl80211_pattern_support`.
///
/// Older kernels omit `max_pkt_offset`, so only the first three fields are
/// required when parsing.
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::Immutable,
    zerocopy::KnownLayout,
)]
pub struct PatternSupport {
    pub max_patterns: u32,
    pub min_pattern_len: u32,
    pub max_pattern_len: u32,
    pub max_pkt_offset: u32,
}

/// Size of the mandatory prefix of [`PatternSupport`].
pub const PATTERN_SUPPORT_MIN_LEN: usize = 12;

impl PatternSupport {
    /// Parse from an attribute payload, zero-filling a missing `max_pkt_offset`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        use zerocopy::IntoBytes;

        if data.len() < PATTERN_SUPPORT_MIN_LEN {
            return None;
        }
        let mut support = Self::default();
        let n = data.len().min(std::mem::size_of::<Self>());
        support.as_mut_bytes()[..n].copy_from_slice(&data[..n]);
        Some(support)
    }
}
