//! Wake notification classification.

use super::FreqSet;
use crate::netlink::attr::{AttrTable, get};
use crate::netlink::genl::nl80211::{Nl80211Attr, Nl80211Message, WowlanTrig};

/// Why the adapter woke the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WakeReason {
    /// No reason reported, or one this crate does not program.
    #[default]
    Unsupported,
    /// A packet matched the registered pattern with this index.
    Pattern(u32),
    /// The link to the access point was lost.
    Disconnect,
    /// A whitelisted network was seen on these frequencies.
    Ssid(FreqSet),
}

impl WakeReason {
    /// Classify the triggers reported by a wake notification.
    ///
    /// Disconnect wins over Pattern, which wins over net-detect results.
    /// Result entries without an SSID are skipped.
    pub fn parse(msg: &Nl80211Message) -> Self {
        let attrs = msg.attrs();
        let Some(triggers) = attrs.nested(Nl80211Attr::WowlanTriggers) else {
            return Self::Unsupported;
        };

        if triggers.has(WowlanTrig::Disconnect) {
            return Self::Disconnect;
        }

        match triggers.u32(WowlanTrig::PktPattern) {
            Ok(Some(index)) => return Self::Pattern(index),
            Ok(None) => {}
            Err(e) => tracing::error!("bad pattern index in wake notification: {e}"),
        }

        if let Some(results) = triggers.nested(WowlanTrig::NetDetectResults) {
            let mut freqs = FreqSet::new();
            for (_, entry) in results.iter() {
                let info = AttrTable::parse(entry);
                if !info.has(Nl80211Attr::Ssid) {
                    tracing::debug!("net detect result without an SSID");
                    continue;
                }
                let Some(list) = info.nested(Nl80211Attr::ScanFrequencies) else {
                    continue;
                };
                freqs.extend(list.iter().filter_map(|(_, f)| get::u32_ne(f).ok()));
            }
            return Self::Ssid(freqs);
        }

        Self::Unsupported
    }

    /// Label reported to the host for this reason, if any.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Unsupported => None,
            Self::Pattern(_) => Some("WiFi.Pattern"),
            Self::Disconnect => Some("WiFi.Disconnect"),
            Self::Ssid(_) => Some("WiFi.SSID"),
        }
    }
}
