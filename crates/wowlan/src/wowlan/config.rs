//! Wake-on-WiFi tunables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::netlink::{Error, Result};

/// Which wake-on-WiFi feature groups the host has turned on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeOnWifiFeatures {
    #[default]
    None,
    /// Wake on packets from registered IP addresses.
    Packet,
    /// Stay connectable while suspended (disconnect and net-detect wakes).
    #[serde(rename = "darkconnect")]
    DarkConnect,
    #[serde(rename = "packet_and_darkconnect")]
    PacketAndDarkConnect,
}

impl WakeOnWifiFeatures {
    pub fn packet(self) -> bool {
        matches!(self, Self::Packet | Self::PacketAndDarkConnect)
    }

    pub fn dark_connect(self) -> bool {
        matches!(self, Self::DarkConnect | Self::PacketAndDarkConnect)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Packet => "packet",
            Self::DarkConnect => "darkconnect",
            Self::PacketAndDarkConnect => "packet_and_darkconnect",
        }
    }
}

impl fmt::Display for WakeOnWifiFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WakeOnWifiFeatures {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "packet" => Ok(Self::Packet),
            "darkconnect" => Ok(Self::DarkConnect),
            "packet_and_darkconnect" => Ok(Self::PacketAndDarkConnect),
            _ => Err(Error::InvalidArgument(format!(
                "invalid wake on WiFi features: {s}"
            ))),
        }
    }
}

/// Controller configuration.
///
/// Every field has a default, so a partial JSON document is accepted:
///
/// ```
/// use wowlan::wowlan::{WakeOnWifiConfig, WakeOnWifiFeatures};
///
/// let config = WakeOnWifiConfig::from_json(r#"{"features_enabled": "darkconnect"}"#).unwrap();
/// assert_eq!(config.features_enabled, WakeOnWifiFeatures::DarkConnect);
/// assert_eq!(config.wake_to_scan_period_secs, 900);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeOnWifiConfig {
    pub features_enabled: WakeOnWifiFeatures,
    /// Interval of the RTC alarm that wakes the host to scan while
    /// disconnected.
    pub wake_to_scan_period_secs: u32,
    /// Interval of the adapter's scheduled scan during net-detect.
    pub net_detect_scan_period_secs: u32,
    /// Arm the wake-to-scan alarm even when the whitelist fit the adapter.
    pub force_wake_to_scan_timer: bool,
    /// How long dark resume actions may run before the host re-suspends.
    pub dark_resume_actions_timeout_ms: u64,
}

impl Default for WakeOnWifiConfig {
    fn default() -> Self {
        Self {
            features_enabled: WakeOnWifiFeatures::None,
            wake_to_scan_period_secs: 15 * 60,
            net_detect_scan_period_secs: 120,
            force_wake_to_scan_timer: false,
            dark_resume_actions_timeout_ms: 18_500,
        }
    }
}

impl WakeOnWifiConfig {
    /// Parse a JSON document, filling absent fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn wake_to_scan_period(&self) -> Duration {
        Duration::from_secs(self.wake_to_scan_period_secs.into())
    }

    pub fn dark_resume_actions_timeout(&self) -> Duration {
        Duration::from_millis(self.dark_resume_actions_timeout_ms)
    }
}
