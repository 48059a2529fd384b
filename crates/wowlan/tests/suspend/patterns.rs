//! Wake pattern registration and feature switches through the service handle.

use std::net::IpAddr;

use crate::common::{self, ssids};
use wowlan::Error;
use wowlan::netlink::genl::nl80211::{Nl80211Attr, PktPatAttr, WowlanTrig};
use wowlan::wowlan::{WakeOnWifiFeatures, WakePattern, service};

#[tokio::test(start_paused = true)]
async fn test_pattern_registration() {
    let controller = common::controller(WakeOnWifiFeatures::Packet, 2, 4);
    let (handle, requests) = service::channel(8);

    let (controller, ()) = tokio::join!(controller.run(requests), async move {
        handle.add_wake_pattern("10.0.0.1").await.unwrap();
        // duplicates are not counted twice
        handle.add_wake_pattern("10.0.0.1").await.unwrap();
        handle.add_wake_pattern("fe80::1").await.unwrap();

        let full = handle.add_wake_pattern("10.0.0.3").await;
        assert!(matches!(full, Err(Error::OperationFailed(_))));

        let bad = handle.add_wake_pattern("not-an-address").await;
        assert!(matches!(bad, Err(Error::InvalidArgument(_))));

        let missing = handle.remove_wake_pattern("10.0.0.9").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        handle.remove_wake_pattern("10.0.0.1").await.unwrap();
    });

    let expected: IpAddr = "fe80::1".parse().unwrap();
    assert_eq!(controller.triggers().addresses(), &[expected]);
}

#[tokio::test(start_paused = true)]
async fn test_clear_patterns() {
    let controller = common::controller(WakeOnWifiFeatures::Packet, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.add_wake_pattern("10.0.0.1").await?;
        handle.add_wake_pattern("10.0.0.2").await?;
        handle.clear_wake_patterns().await
    });
    result.unwrap();

    assert!(controller.triggers().addresses().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_patterns_programmed_in_registration_order() {
    let controller = common::controller(WakeOnWifiFeatures::Packet, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.add_wake_pattern("192.168.10.20").await?;
        handle.add_wake_pattern("2001:db8::5").await?;
        handle.before_suspend(true, Vec::new(), false, 0).await
    });
    result.unwrap();

    let sent = controller.triggers().transport().trigger_messages();
    assert_eq!(sent.len(), 1);
    let attrs = sent[0].attrs();
    let triggers = attrs.nested(Nl80211Attr::WowlanTriggers).unwrap();
    assert!(!triggers.has(WowlanTrig::Disconnect));
    let patterns = triggers.nested(WowlanTrig::PktPattern).unwrap();

    assert_eq!(patterns.len(), 2);
    for (id, addr) in [(1u16, "192.168.10.20"), (2, "2001:db8::5")] {
        let expected = WakePattern::for_address(addr.parse().unwrap());
        let programmed = patterns.nested(id).unwrap();
        assert_eq!(programmed.get(PktPatAttr::Pattern), Some(&expected.pattern[..]));
        assert_eq!(programmed.get(PktPatAttr::Mask), Some(&expected.mask[..]));
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_patterns_means_no_pattern_trigger() {
    let controller = common::controller(WakeOnWifiFeatures::Packet, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await
    });
    result.unwrap();

    assert!(controller.triggers().transport().sent.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_feature_switch() {
    let controller = common::controller(WakeOnWifiFeatures::PacketAndDarkConnect, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        assert!(handle.set_features_enabled(WakeOnWifiFeatures::Packet).await?);
        assert!(!handle.set_features_enabled(WakeOnWifiFeatures::Packet).await?);
        // dark connect is off, so there is nothing to program while disconnected
        handle.before_suspend(false, ssids(&["home"]), false, 0).await
    });
    result.unwrap();

    assert_eq!(
        controller.config().features_enabled,
        WakeOnWifiFeatures::Packet
    );
    assert!(controller.triggers().transport().sent.is_empty());
    assert!(controller.hooks().calls.is_empty());
}

#[tokio::test]
async fn test_stopped_service() {
    let (handle, requests) = service::channel(1);
    drop(requests);

    let result = handle.add_wake_pattern("10.0.0.1").await;
    assert!(matches!(result, Err(Error::OperationFailed(_))));
    let result = handle.after_resume().await;
    assert!(matches!(result, Err(Error::OperationFailed(_))));
}
