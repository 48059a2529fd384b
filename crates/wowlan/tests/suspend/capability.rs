//! Capability discovery and wiphy filtering.

use crate::common::{self, WIPHY, without_wiphy, wiphy_message};
use wowlan::Error;
use wowlan::netlink::builder::AttrBuilder;
use wowlan::netlink::genl::nl80211::{
    Nl80211Attr, Nl80211Cmd, Nl80211Message, PatternSupport, WowlanTrig,
};
use wowlan::wowlan::pattern::IPV4_PATTERN_LEN;
use wowlan::wowlan::{TriggerKind, WakeOnWifiFeatures, WakeReason, service};
use zerocopy::IntoBytes;

#[tokio::test(start_paused = true)]
async fn test_new_wiphy_enables_patterns() {
    let controller = without_wiphy(WakeOnWifiFeatures::Packet);
    let (handle, requests) = service::channel(8);

    let (controller, ()) = tokio::join!(controller.run(requests), async move {
        let early = handle.add_wake_pattern("10.0.0.1").await;
        assert!(matches!(early, Err(Error::NotSupported(_))));

        handle.new_wiphy(wiphy_message(3, 2)).await.unwrap();
        handle.add_wake_pattern("10.0.0.1").await.unwrap();
    });

    let triggers = controller.triggers();
    assert_eq!(triggers.wiphy_index(), Some(WIPHY));
    assert_eq!(triggers.supported().max_patterns, 3);
    assert_eq!(triggers.supported().max_whitelisted_names, 2);
    assert_eq!(triggers.addresses().len(), 1);
}

#[test]
fn test_pattern_range_must_fit_ipv6() {
    let support = PatternSupport {
        max_patterns: 4,
        min_pattern_len: 1,
        max_pattern_len: IPV4_PATTERN_LEN as u32,
        max_pkt_offset: 0,
    };
    let mut b = AttrBuilder::new();
    b.append_attr_u32(Nl80211Attr::Wiphy as u16, WIPHY);
    let nest = b.nest_start(Nl80211Attr::WowlanTriggersSupported as u16);
    b.append_attr_flag(WowlanTrig::Disconnect as u16);
    b.append_attr(WowlanTrig::PktPattern as u16, support.as_bytes());
    b.nest_end(nest);
    let wiphy = Nl80211Message::new(Nl80211Cmd::NewWiphy, b.finish());

    let mut controller = without_wiphy(WakeOnWifiFeatures::PacketAndDarkConnect);
    controller.on_new_wiphy(&wiphy);

    let triggers = controller.triggers();
    assert!(triggers.is_supported(TriggerKind::Disconnect));
    assert!(!triggers.is_supported(TriggerKind::Pattern));
    assert!(!triggers.is_supported(TriggerKind::SsidNetDetect));
    assert!(matches!(
        controller.add_wake_pattern("10.0.0.1"),
        Err(Error::NotSupported(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_adapter_without_wowlan() {
    let mut b = AttrBuilder::new();
    b.append_attr_u32(Nl80211Attr::Wiphy as u16, WIPHY);
    let wiphy = Nl80211Message::new(Nl80211Cmd::NewWiphy, b.finish());

    let mut controller = without_wiphy(WakeOnWifiFeatures::PacketAndDarkConnect);
    controller.on_new_wiphy(&wiphy);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await?;
        handle.before_suspend(false, common::ssids(&["home"]), false, 0).await
    });
    result.unwrap();

    assert!(controller.triggers().supported().triggers.is_empty());
    assert!(controller.triggers().transport().sent.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wake_notification_for_other_wiphy_ignored() {
    let mut controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    controller.set_wiphy_index(WIPHY + 1);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.wake_notification(common::woke_on_disconnect()).await
    });
    result.unwrap();

    assert_eq!(controller.wake_reason(), &WakeReason::Unsupported);
    assert!(controller.hooks().calls.is_empty());
}
