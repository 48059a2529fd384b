//! Dark resume handling and throttling.

use std::time::Duration;

use crate::common::{self, HookCall, ssids, woke_on_disconnect, woke_on_pattern, woke_on_ssid};
use wowlan::netlink::genl::nl80211::{Nl80211Attr, WowlanTrig};
use wowlan::wowlan::{
    ControllerState, FreqSet, SimulatedBootClock, TriggerKind, TriggerSet, WakeOnWifiFeatures,
    WakeReason, service,
};

#[tokio::test(start_paused = true)]
async fn test_ssid_wake_scans_and_rearms() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(16);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(false, ssids(&["home"]), false, 0).await?;
        handle
            .wake_notification(woke_on_ssid(b"home", &[2412, 2437]))
            .await?;

        let scans_done = async {
            // one scan per retry, then give up
            for _ in 0..6 {
                handle
                    .no_auto_connectable_services(ssids(&["home"]))
                    .await?;
            }
            Ok::<_, wowlan::Error>(())
        };
        let (resumed, scanned) =
            tokio::join!(handle.dark_resume(false, ssids(&["home"])), scans_done);
        scanned?;
        resumed
    });
    result.unwrap();

    let freqs: FreqSet = [2412, 2437].into_iter().collect();
    let hooks = controller.hooks();
    assert!(hooks.calls.contains(&HookCall::WakeReason("WiFi.SSID".into())));
    assert_eq!(hooks.scans(), 6);
    assert!(
        hooks
            .calls
            .iter()
            .filter_map(|c| match c {
                HookCall::Scan(f) => Some(f),
                _ => None,
            })
            .all(|f| *f == freqs)
    );

    assert_eq!(controller.state(), ControllerState::SuspendPending);
    assert_eq!(controller.dark_resume_deadline(), None);
    assert_eq!(controller.dark_resume_history().len(), 1);
    assert!(controller.last_ssid_match_freqs().is_empty());
    assert_eq!(controller.wake_reason(), &WakeReason::Unsupported);

    let sent = controller.triggers().transport().trigger_messages();
    assert_eq!(sent.len(), 2);
    let rearmed = sent[1].attrs();
    let triggers = rearmed.nested(Nl80211Attr::WowlanTriggers).unwrap();
    assert!(triggers.has(WowlanTrig::NetDetect));
}

#[tokio::test(start_paused = true)]
async fn test_pattern_wake_rearms_immediately() {
    let mut controller = common::controller(WakeOnWifiFeatures::PacketAndDarkConnect, 4, 4);
    controller.add_wake_pattern("192.168.1.7").unwrap();
    let (handle, requests) = service::channel(16);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await?;
        handle.wake_notification(woke_on_pattern(1)).await?;
        handle.dark_resume(true, Vec::new()).await
    });
    result.unwrap();

    assert_eq!(
        controller.hooks().calls,
        vec![HookCall::WakeReason("WiFi.Pattern".into())]
    );
    assert!(controller.dark_resume_history().is_empty());
    assert_eq!(controller.dark_resume_deadline(), None);

    let expected: TriggerSet = [TriggerKind::Pattern, TriggerKind::Disconnect]
        .into_iter()
        .collect();
    assert_eq!(controller.triggers().desired(), &expected);
    assert_eq!(controller.triggers().transport().trigger_messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_in_dark_resume_rearms_disconnect() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(16);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await?;
        handle.wake_notification(woke_on_disconnect()).await?;
        let (resumed, reachable) = tokio::join!(
            handle.dark_resume(false, ssids(&["home"])),
            handle.connected_and_reachable(true, 3600),
        );
        reachable?;
        resumed
    });
    result.unwrap();

    let expected: TriggerSet = [TriggerKind::Disconnect].into_iter().collect();
    assert_eq!(controller.triggers().desired(), &expected);
    assert!(controller.lease_renewal_deadline().is_some());
    assert_eq!(controller.dark_resume_deadline(), None);
    assert_eq!(
        controller.hooks().calls,
        vec![
            HookCall::WakeReason("WiFi.Disconnect".into()),
            HookCall::RemoveNetworks,
            HookCall::Scan(FreqSet::new()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_dark_resume_times_out() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(16);

    let (controller, elapsed) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await.unwrap();
        handle.wake_notification(woke_on_disconnect()).await.unwrap();
        let start = tokio::time::Instant::now();
        handle.dark_resume(false, ssids(&["home"])).await.unwrap();
        start.elapsed()
    });

    assert!(elapsed >= Duration::from_millis(18_500));
    assert_eq!(controller.state(), ControllerState::SuspendPending);
    let expected: TriggerSet = [TriggerKind::SsidNetDetect].into_iter().collect();
    assert_eq!(controller.triggers().desired(), &expected);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_dark_resumes_disable_wake_on_wifi() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(16);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await?;
        for _ in 0..3 {
            handle.wake_notification(woke_on_disconnect()).await?;
            handle.dark_resume(false, ssids(&["home"])).await?;
        }
        Ok::<_, wowlan::Error>(())
    });
    result.unwrap();

    assert_eq!(controller.state(), ControllerState::Disabled);
    assert!(controller.dark_resume_history().is_empty());
    assert!(controller.wake_to_scan_deadline().is_some());
    assert_eq!(controller.lease_renewal_deadline(), None);
    assert!(controller.triggers().desired().is_empty());

    let sent = &controller.triggers().transport().sent;
    let last = sent.last().unwrap();
    assert!(!last.attrs().has(Nl80211Attr::WowlanTriggers));
}

#[tokio::test(start_paused = true)]
async fn test_spread_out_dark_resumes_not_throttled() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(16);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await?;
        for _ in 0..3 {
            handle.wake_notification(woke_on_disconnect()).await?;
            handle.dark_resume(false, ssids(&["home"])).await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok::<_, wowlan::Error>(())
    });
    result.unwrap();

    assert_eq!(controller.state(), ControllerState::SuspendPending);
    assert_eq!(controller.dark_resume_history().len(), 3);
    let expected: TriggerSet = [TriggerKind::SsidNetDetect].into_iter().collect();
    assert_eq!(controller.triggers().desired(), &expected);
}

#[tokio::test(start_paused = true)]
async fn test_dark_resumes_hours_apart_in_suspend_not_throttled() {
    let clock = SimulatedBootClock::new();
    let controller =
        common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4).with_clock(clock.clone());
    let (handle, requests) = service::channel(16);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await?;
        for _ in 0..3 {
            handle.wake_notification(woke_on_disconnect()).await?;
            handle.dark_resume(false, ssids(&["home"])).await?;
            // the monotonic clock stops while the host sleeps
            clock.suspend_for(Duration::from_secs(3 * 3600));
        }
        Ok::<_, wowlan::Error>(())
    });
    result.unwrap();

    assert_eq!(controller.state(), ControllerState::SuspendPending);
    assert_eq!(controller.dark_resume_history().len(), 1);
    let expected: TriggerSet = [TriggerKind::SsidNetDetect].into_iter().collect();
    assert_eq!(controller.triggers().desired(), &expected);
}
