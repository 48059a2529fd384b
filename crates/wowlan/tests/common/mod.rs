//! Common test utilities for integration tests.
//!
//! Provides an in-memory transport standing in for the kernel, recording
//! hooks, and builders for the nl80211 messages an adapter would send.

use std::collections::VecDeque;

use wowlan::Result;
use wowlan::netlink::builder::AttrBuilder;
use wowlan::netlink::genl::nl80211::{
    Nl80211Attr, Nl80211Cmd, Nl80211Message, PatternSupport, WowlanTrig,
};
use wowlan::wowlan::{
    FreqSet, SimulatedBootClock, SuspendResumeController, WakeOnWifiConfig, WakeOnWifiFeatures,
    WifiHooks, WowlanTransport,
};
use zerocopy::IntoBytes;

/// Wiphy index used by every test adapter.
pub const WIPHY: u32 = 0;

/// Scripted adapter.
///
/// Records every message. Sends succeed unless `send_results` says
/// otherwise; queries are answered from `replies`, or with the last
/// configuration sent when the script is empty.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub sent: Vec<Nl80211Message>,
    pub queries: Vec<Nl80211Message>,
    pub send_results: VecDeque<Result<()>>,
    pub replies: VecDeque<Result<Nl80211Message>>,
}

impl ScriptedTransport {
    /// Configuration messages that carried a trigger subtree.
    #[allow(dead_code)]
    pub fn trigger_messages(&self) -> Vec<&Nl80211Message> {
        self.sent
            .iter()
            .filter(|m| m.attrs().has(Nl80211Attr::WowlanTriggers))
            .collect()
    }
}

impl WowlanTransport for ScriptedTransport {
    async fn send(&mut self, msg: &Nl80211Message) -> Result<()> {
        self.sent.push(msg.clone());
        self.send_results.pop_front().unwrap_or(Ok(()))
    }

    async fn request(&mut self, msg: &Nl80211Message) -> Result<Nl80211Message> {
        self.queries.push(msg.clone());
        if let Some(reply) = self.replies.pop_front() {
            return reply;
        }
        let attrs = self
            .sent
            .last()
            .map(|m| m.attr_bytes().to_vec())
            .unwrap_or_default();
        Ok(Nl80211Message::new(Nl80211Cmd::GetWowlan, attrs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    RenewLease,
    RemoveNetworks,
    Scan(FreqSet),
    WakeReason(String),
}

#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub calls: Vec<HookCall>,
}

impl RecordingHooks {
    #[allow(dead_code)]
    pub fn scans(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HookCall::Scan(_)))
            .count()
    }
}

impl WifiHooks for RecordingHooks {
    fn renew_lease(&mut self) {
        self.calls.push(HookCall::RenewLease);
    }

    fn remove_all_managed_networks(&mut self) {
        self.calls.push(HookCall::RemoveNetworks);
    }

    fn initiate_scan(&mut self, freqs: &FreqSet) {
        self.calls.push(HookCall::Scan(freqs.clone()));
    }

    fn record_wake_reason(&mut self, label: &str) {
        self.calls.push(HookCall::WakeReason(label.to_string()));
    }
}

pub type TestController = SuspendResumeController<ScriptedTransport, RecordingHooks>;

/// `NL80211_CMD_NEW_WIPHY` advertising every trigger this crate programs.
pub fn wiphy_message(max_patterns: u32, max_whitelisted_names: u32) -> Nl80211Message {
    let support = PatternSupport {
        max_patterns,
        min_pattern_len: 1,
        max_pattern_len: 128,
        max_pkt_offset: 0,
    };

    let mut b = AttrBuilder::new();
    b.append_attr_u32(Nl80211Attr::Wiphy as u16, WIPHY);
    let nest = b.nest_start(Nl80211Attr::WowlanTriggersSupported as u16);
    b.append_attr_flag(WowlanTrig::Disconnect as u16);
    b.append_attr(WowlanTrig::PktPattern as u16, support.as_bytes());
    b.append_attr_u32(WowlanTrig::NetDetect as u16, max_whitelisted_names);
    b.nest_end(nest);
    Nl80211Message::new(Nl80211Cmd::NewWiphy, b.finish())
}

/// Controller that has not seen a wiphy yet, on a boot clock that follows
/// the paused tokio clock.
pub fn without_wiphy(features: WakeOnWifiFeatures) -> TestController {
    let config = WakeOnWifiConfig {
        features_enabled: features,
        ..Default::default()
    };
    SuspendResumeController::new(ScriptedTransport::default(), RecordingHooks::default(), config)
        .with_clock(SimulatedBootClock::new())
}

/// Controller for an adapter that supports every trigger.
pub fn controller(
    features: WakeOnWifiFeatures,
    max_patterns: u32,
    max_whitelisted_names: u32,
) -> TestController {
    let mut c = without_wiphy(features);
    c.on_new_wiphy(&wiphy_message(max_patterns, max_whitelisted_names));
    c
}

fn wake_notification(build: impl FnOnce(&mut AttrBuilder)) -> Nl80211Message {
    let mut b = AttrBuilder::new();
    b.append_attr_u32(Nl80211Attr::Wiphy as u16, WIPHY);
    let nest = b.nest_start(Nl80211Attr::WowlanTriggers as u16);
    build(&mut b);
    b.nest_end(nest);
    Nl80211Message::new(Nl80211Cmd::SetWowlan, b.finish())
}

#[allow(dead_code)]
pub fn woke_on_disconnect() -> Nl80211Message {
    wake_notification(|b| b.append_attr_flag(WowlanTrig::Disconnect as u16))
}

#[allow(dead_code)]
pub fn woke_on_pattern(index: u32) -> Nl80211Message {
    wake_notification(|b| b.append_attr_u32(WowlanTrig::PktPattern as u16, index))
}

/// Net-detect wake: one match for `ssid` seen on `freqs`.
#[allow(dead_code)]
pub fn woke_on_ssid(ssid: &[u8], freqs: &[u32]) -> Nl80211Message {
    wake_notification(|b| {
        let results = b.nest_start(WowlanTrig::NetDetectResults as u16);
        let entry = b.nest_start(0);
        b.append_attr(Nl80211Attr::Ssid as u16, ssid);
        let list = b.nest_start(Nl80211Attr::ScanFrequencies as u16);
        for (i, freq) in freqs.iter().enumerate() {
            b.append_attr_u32(i as u16, *freq);
        }
        b.nest_end(list);
        b.nest_end(entry);
        b.nest_end(results);
    })
}

pub fn ssids(names: &[&str]) -> Vec<Vec<u8>> {
    names.iter().map(|n| n.as_bytes().to_vec()).collect()
}
