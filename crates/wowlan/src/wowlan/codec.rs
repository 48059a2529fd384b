//! `NL80211_CMD_SET_WOWLAN` / `NL80211_CMD_GET_WOWLAN` message codec.
//!
//! ```text
//! NL80211_ATTR_WIPHY (u32)
//! NL80211_ATTR_WOWLAN_TRIGGERS
//! ├── NL80211_WOWLAN_TRIG_DISCONNECT (flag)
//! ├── NL80211_WOWLAN_TRIG_PKT_PATTERN
//! │   └── 1..n
//! │       ├── NL80211_PKTPAT_MASK (bytes)
//! │       ├── NL80211_PKTPAT_PATTERN (bytes)
//! │       └── NL80211_PKTPAT_OFFSET (u32, 0)
//! └── NL80211_WOWLAN_TRIG_NET_DETECT
//!     ├── NL80211_ATTR_SCHED_SCAN_INTERVAL (u32, ms)
//!     └── NL80211_ATTR_SCHED_SCAN_MATCH
//!         └── 0..n
//!             └── NL80211_SCHED_SCAN_MATCH_ATTR_SSID (bytes)
//! ```

use std::collections::BTreeSet;

use super::pattern::WakePattern;
use super::{Ssid, TriggerKind, TriggerSet};
use crate::netlink::attr::AttrTable;
use crate::netlink::builder::AttrBuilder;
use crate::netlink::{Error, Result};
use crate::netlink::genl::nl80211::{
    Nl80211Attr, Nl80211Cmd, Nl80211Message, PktPatAttr, SchedScanMatchAttr, WowlanTrig,
};

/// Build the message programming `desired` into wiphy `wiphy`.
///
/// Fails if `desired` is empty, or if it contains [`TriggerKind::Pattern`]
/// while `patterns` is empty, or if the lists do not fit a netlink attribute.
/// Repeated patterns and names are sent once.
pub fn build_set_message(
    wiphy: u32,
    desired: &TriggerSet,
    patterns: &[WakePattern],
    whitelist: &[Ssid],
    scan_period_secs: u32,
) -> Result<Nl80211Message> {
    if desired.is_empty() {
        return Err(Error::InvalidArgument("no triggers to configure".into()));
    }
    if desired.contains(&TriggerKind::Pattern) && patterns.is_empty() {
        return Err(Error::InvalidArgument("no IP addresses to configure".into()));
    }

    let mut b = AttrBuilder::new();
    b.append_attr_u32(Nl80211Attr::Wiphy as u16, wiphy);

    let triggers = b.nest_start(Nl80211Attr::WowlanTriggers as u16);
    for kind in desired {
        match kind {
            TriggerKind::Disconnect => {
                b.append_attr_flag(WowlanTrig::Disconnect as u16);
            }
            TriggerKind::Pattern => {
                let list = b.nest_start(WowlanTrig::PktPattern as u16);
                for (idx, p) in unique(patterns).enumerate() {
                    let entry = b.nest_start(idx as u16 + 1);
                    b.append_attr(PktPatAttr::Mask as u16, &p.mask);
                    b.append_attr(PktPatAttr::Pattern as u16, &p.pattern);
                    b.append_attr_u32(PktPatAttr::Offset as u16, 0);
                    b.nest_end(entry);
                }
                b.nest_end(list);
            }
            TriggerKind::SsidNetDetect => {
                let scan = b.nest_start(WowlanTrig::NetDetect as u16);
                b.append_attr_u32(
                    Nl80211Attr::SchedScanInterval as u16,
                    scan_period_secs.saturating_mul(1000),
                );
                let matches = b.nest_start(Nl80211Attr::SchedScanMatch as u16);
                for (idx, ssid) in unique(whitelist).enumerate() {
                    let entry = b.nest_start(idx as u16);
                    b.append_attr(SchedScanMatchAttr::Ssid as u16, ssid);
                    b.nest_end(entry);
                }
                b.nest_end(matches);
                b.nest_end(scan);
            }
        }
    }
    b.nest_end(triggers);

    Ok(Nl80211Message::new(Nl80211Cmd::SetWowlan, b.try_finish()?))
}

/// `items` in order, each value once.
fn unique<T: Ord>(items: &[T]) -> impl Iterator<Item = &T> {
    let mut seen = BTreeSet::new();
    items.iter().filter(move |item| seen.insert(*item))
}

/// Build the message that clears every trigger on wiphy `wiphy`.
pub fn build_disable_message(wiphy: u32) -> Nl80211Message {
    wiphy_only(Nl80211Cmd::SetWowlan, wiphy)
}

/// Build the query for the triggers currently programmed on wiphy `wiphy`.
pub fn build_get_message(wiphy: u32) -> Nl80211Message {
    wiphy_only(Nl80211Cmd::GetWowlan, wiphy)
}

fn wiphy_only(cmd: Nl80211Cmd, wiphy: u32) -> Nl80211Message {
    let mut b = AttrBuilder::new();
    b.append_attr_u32(Nl80211Attr::Wiphy as u16, wiphy);
    Nl80211Message::new(cmd, b.finish())
}

/// Whether the triggers carried by `msg` are exactly `expected`.
///
/// Patterns and whitelisted names are compared as sets, so duplicates in
/// `patterns` or `whitelist` are ignored. A reply listing the same entry
/// twice, or a malformed subtree, never matches.
pub fn settings_match(
    msg: &Nl80211Message,
    expected: &TriggerSet,
    patterns: &[WakePattern],
    scan_period_secs: u32,
    whitelist: &[Ssid],
) -> bool {
    if !msg.is(Nl80211Cmd::GetWowlan) && !msg.is(Nl80211Cmd::SetWowlan) {
        tracing::error!(cmd = msg.cmd(), "invalid message command for WoWLAN settings");
        return false;
    }

    let attrs = msg.attrs();
    let Some(triggers) = attrs.nested(Nl80211Attr::WowlanTriggers) else {
        return expected.is_empty();
    };

    for (kind, attr) in [
        (TriggerKind::Disconnect, WowlanTrig::Disconnect),
        (TriggerKind::Pattern, WowlanTrig::PktPattern),
        (TriggerKind::SsidNetDetect, WowlanTrig::NetDetect),
    ] {
        if triggers.has(attr) && !expected.contains(&kind) {
            tracing::debug!(?kind, "trigger not expected but found");
            return false;
        }
    }

    expected.iter().all(|kind| match kind {
        TriggerKind::Disconnect => {
            let found = triggers.has(WowlanTrig::Disconnect);
            if !found {
                tracing::debug!("wake on disconnect flag not set");
            }
            found
        }
        TriggerKind::Pattern => {
            let ok = patterns_match(&triggers, patterns);
            if !ok {
                tracing::debug!("wake on pattern pattern/mask mismatch");
            }
            ok
        }
        TriggerKind::SsidNetDetect => {
            let ok = net_detect_matches(&triggers, scan_period_secs, whitelist);
            if !ok {
                tracing::debug!("net detect settings mismatch");
            }
            ok
        }
    })
}

fn patterns_match(triggers: &AttrTable<'_>, patterns: &[WakePattern]) -> bool {
    let Some(list) = triggers.nested(WowlanTrig::PktPattern) else {
        return false;
    };
    let expected: BTreeSet<(&[u8], &[u8])> = patterns
        .iter()
        .map(|p| (p.pattern.as_slice(), p.mask.as_slice()))
        .collect();

    let mut found = BTreeSet::new();
    for (_, entry) in list.iter() {
        let info = AttrTable::parse(entry);
        let (Some(mask), Some(pattern)) = (info.get(PktPatAttr::Mask), info.get(PktPatAttr::Pattern))
        else {
            tracing::error!("pattern entry without mask or pattern");
            return false;
        };
        // the adapter must not hold the same pattern twice
        if !found.insert((pattern, mask)) {
            return false;
        }
    }
    found == expected
}

fn net_detect_matches(triggers: &AttrTable<'_>, scan_period_secs: u32, whitelist: &[Ssid]) -> bool {
    let Some(scan) = triggers.nested(WowlanTrig::NetDetect) else {
        return false;
    };
    match scan.u32(Nl80211Attr::SchedScanInterval) {
        Ok(Some(interval)) if interval == scan_period_secs.saturating_mul(1000) => {}
        Ok(Some(_)) => return false,
        _ => {
            tracing::error!("net detect trigger without a scan interval");
            return false;
        }
    }

    let Some(matches) = scan.nested(Nl80211Attr::SchedScanMatch) else {
        return false;
    };
    let expected: BTreeSet<&[u8]> = whitelist.iter().map(Vec::as_slice).collect();

    let mut found = BTreeSet::new();
    for (_, entry) in matches.iter() {
        let Some(ssid) = AttrTable::parse(entry).get(SchedScanMatchAttr::Ssid) else {
            tracing::error!("scan match entry without an SSID");
            return false;
        };
        if !found.insert(ssid) {
            return false;
        }
    }
    found == expected
}
