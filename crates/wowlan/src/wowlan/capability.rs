//! Adapter capability advertisement.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::pattern::WakePattern;
use super::{TriggerKind, TriggerSet};
use crate::netlink::genl::nl80211::{
    Nl80211Attr, Nl80211Cmd, Nl80211Message, PatternSupport, WowlanTrig,
};

const IPV4_SAMPLE: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 20));
const IPV6_SAMPLE: IpAddr = IpAddr::V6(Ipv6Addr::new(
    0xfedc, 0xba98, 0x7654, 0x3210, 0xfedc, 0xba98, 0x7654, 0x3210,
));

/// Wake triggers an adapter supports, with their limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedTriggers {
    pub triggers: TriggerSet,
    /// Maximum number of registered IP patterns.
    pub max_patterns: u32,
    /// Maximum number of SSIDs a net-detect scan can match on.
    pub max_whitelisted_names: u32,
}

impl SupportedTriggers {
    /// Parse the `NL80211_CMD_NEW_WIPHY` capability message.
    ///
    /// A message without `NL80211_ATTR_WOWLAN_TRIGGERS_SUPPORTED` yields no
    /// supported triggers. Pattern wakes are only reported when the adapter's
    /// pattern length range admits both IPv4 and IPv6 patterns.
    pub fn parse(msg: &Nl80211Message) -> Self {
        let mut supported = Self::default();

        if !msg.is(Nl80211Cmd::NewWiphy) {
            tracing::error!(
                cmd = Nl80211Cmd::name(msg.cmd()),
                "capability message has the wrong command"
            );
            return supported;
        }

        let attrs = msg.attrs();
        let Some(triggers) = attrs.nested(Nl80211Attr::WowlanTriggersSupported) else {
            tracing::debug!("no WoWLAN triggers supported");
            return supported;
        };

        if triggers.has(WowlanTrig::Disconnect) {
            supported.triggers.insert(TriggerKind::Disconnect);
            tracing::debug!("wake on disconnect supported");
        }

        if let Some(data) = triggers.get(WowlanTrig::PktPattern) {
            match PatternSupport::parse(data) {
                Some(ps) if admits_address_patterns(&ps) => {
                    supported.triggers.insert(TriggerKind::Pattern);
                    supported.max_patterns = ps.max_patterns;
                    tracing::debug!(max_patterns = ps.max_patterns, "wake on pattern supported");
                }
                Some(ps) => {
                    tracing::debug!(
                        min = ps.min_pattern_len,
                        max = ps.max_pattern_len,
                        "pattern length range excludes IP patterns"
                    );
                }
                None => tracing::error!(len = data.len(), "short pattern support descriptor"),
            }
        }

        match triggers.u32(WowlanTrig::NetDetect) {
            Ok(Some(max)) => {
                supported.triggers.insert(TriggerKind::SsidNetDetect);
                supported.max_whitelisted_names = max;
                tracing::debug!(max_whitelisted_names = max, "wake on SSID supported");
            }
            Ok(None) => {}
            Err(e) => tracing::error!("bad net detect capability: {e}"),
        }

        supported
    }

    pub fn contains(&self, kind: TriggerKind) -> bool {
        self.triggers.contains(&kind)
    }
}

fn admits_address_patterns(ps: &PatternSupport) -> bool {
    [IPV4_SAMPLE, IPV6_SAMPLE].iter().all(|addr| {
        let len = WakePattern::for_address(*addr).pattern.len() as u32;
        (ps.min_pattern_len..=ps.max_pattern_len).contains(&len)
    })
}
