//! Trigger selection and verification before suspend.

use crate::common::{self, HookCall, ssids};
use wowlan::Error;
use wowlan::netlink::genl::nl80211::{Nl80211Attr, Nl80211Cmd, Nl80211Message, WowlanTrig};
use wowlan::wowlan::{
    ControllerState, ManagerState, TriggerKind, TriggerSet, WakeOnWifiFeatures, service,
};

fn set(kinds: &[TriggerKind]) -> TriggerSet {
    kinds.iter().copied().collect()
}

#[tokio::test(start_paused = true)]
async fn test_connected_programs_pattern_and_disconnect() {
    let mut controller = common::controller(WakeOnWifiFeatures::PacketAndDarkConnect, 4, 4);
    controller.add_wake_pattern("1.1.1.1").unwrap();
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle
            .before_suspend(true, ssids(&["GoogleGuest"]), false, 0)
            .await
    });
    result.unwrap();

    let triggers = controller.triggers();
    assert_eq!(
        triggers.desired(),
        &set(&[TriggerKind::Pattern, TriggerKind::Disconnect])
    );
    assert_eq!(triggers.state(), ManagerState::Idle);

    let sent = triggers.transport().trigger_messages();
    assert_eq!(sent.len(), 1);
    let attrs = sent[0].attrs();
    let programmed = attrs.nested(Nl80211Attr::WowlanTriggers).unwrap();
    assert!(programmed.has(WowlanTrig::Disconnect));
    assert!(programmed.has(WowlanTrig::PktPattern));
    assert!(!programmed.has(WowlanTrig::NetDetect));

    let queries = &triggers.transport().queries;
    assert_eq!(queries.len(), 1);
    assert!(queries[0].is(Nl80211Cmd::GetWowlan));
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_programs_net_detect() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 1);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle
            .before_suspend(false, ssids(&["GoogleGuest"]), false, 0)
            .await
    });
    result.unwrap();

    assert_eq!(
        controller.triggers().desired(),
        &set(&[TriggerKind::SsidNetDetect])
    );
    assert_eq!(controller.whitelist(), &ssids(&["GoogleGuest"])[..]);
    assert_eq!(controller.wake_to_scan_deadline(), None);
    assert_eq!(controller.hooks().calls, vec![HookCall::RemoveNetworks]);
}

#[tokio::test(start_paused = true)]
async fn test_verification_failure_reported_once() {
    let mut controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    for _ in 0..3 {
        controller
            .triggers_mut()
            .transport_mut()
            .replies
            .push_back(Ok(Nl80211Message::new(Nl80211Cmd::GetWowlan, Vec::new())));
    }
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), false, 0).await
    });

    assert!(matches!(
        result,
        Err(Error::VerificationFailed { attempts: 3 })
    ));
    let triggers = controller.triggers();
    assert_eq!(triggers.transport().trigger_messages().len(), 3);
    assert_eq!(triggers.transport().queries.len(), 3);
    assert_eq!(triggers.retries(), 0);
    assert_eq!(triggers.state(), ManagerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_triggers_not_requested_again() {
    let mut controller = common::controller(WakeOnWifiFeatures::PacketAndDarkConnect, 4, 4);
    controller.add_wake_pattern("10.1.2.3").unwrap();
    controller
        .triggers_mut()
        .transport_mut()
        .send_results
        .push_back(Err(Error::from_errno(-libc::EOPNOTSUPP)));
    let (handle, requests) = service::channel(8);

    let (controller, (first, second)) = tokio::join!(controller.run(requests), async move {
        let first = handle.before_suspend(true, Vec::new(), false, 0).await;
        let second = handle.before_suspend(false, ssids(&["home"]), false, 0).await;
        (first, second)
    });

    assert!(matches!(first, Err(Error::NotSupported(_))));
    second.unwrap();

    // dark connect needs Disconnect, which the adapter rejected
    let triggers = controller.triggers();
    assert!(!triggers.is_supported(TriggerKind::Disconnect));
    assert!(!triggers.is_supported(TriggerKind::Pattern));
    assert!(triggers.is_supported(TriggerKind::SsidNetDetect));
    assert_eq!(triggers.transport().sent.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nothing_enabled_leaves_adapter_alone() {
    let controller = common::controller(WakeOnWifiFeatures::None, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(false, ssids(&["home"]), false, 0).await
    });
    result.unwrap();

    assert!(controller.triggers().transport().sent.is_empty());
    assert!(controller.hooks().calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expiring_lease_renewed_first() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), true, 10).await
    });
    result.unwrap();

    assert_eq!(controller.hooks().calls, vec![HookCall::RenewLease]);
    assert_eq!(controller.lease_renewal_deadline(), None);
    assert_eq!(
        controller.triggers().desired(),
        &set(&[TriggerKind::Disconnect])
    );
}

#[tokio::test(start_paused = true)]
async fn test_after_resume_disables() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle.before_suspend(true, Vec::new(), true, 3600).await?;
        handle.after_resume().await
    });
    result.unwrap();

    assert_eq!(controller.state(), ControllerState::Awake);
    assert_eq!(controller.lease_renewal_deadline(), None);
    assert!(controller.triggers().desired().is_empty());

    let sent = &controller.triggers().transport().sent;
    assert_eq!(sent.len(), 2);
    assert!(!sent[1].attrs().has(Nl80211Attr::WowlanTriggers));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_whitelist_names_programmed_once() {
    let controller = common::controller(WakeOnWifiFeatures::DarkConnect, 4, 4);
    let (handle, requests) = service::channel(8);

    let (controller, result) = tokio::join!(controller.run(requests), async move {
        handle
            .before_suspend(false, ssids(&["home", "home"]), false, 0)
            .await
    });
    result.unwrap();

    assert_eq!(controller.whitelist(), &ssids(&["home"])[..]);
    let sent = controller.triggers().transport().trigger_messages();
    assert_eq!(sent.len(), 1);
    let attrs = sent[0].attrs();
    let net_detect = attrs
        .nested(Nl80211Attr::WowlanTriggers)
        .and_then(|t| t.nested(WowlanTrig::NetDetect))
        .unwrap();
    let matches = net_detect.nested(Nl80211Attr::SchedScanMatch).unwrap();
    assert_eq!(matches.len(), 1);
}
