//! Suspend, dark resume and resume orchestration.
//!
//! The host calls [`before_suspend`](SuspendResumeController::before_suspend)
//! when it is about to sleep and
//! [`dark_resume`](SuspendResumeController::dark_resume) each time the adapter
//! wakes it into dark resume. Both end by programming the adapter again and
//! answering the host through a completion channel once the settings have
//! been verified.
//!
//! ```text
//!            before_suspend            dark_resume
//!   Awake ─────────────────▶ SuspendPending ─────────▶ DarkResume
//!     ▲                            ▲                       │
//!     │ after_resume               └── re-arm (connected, ─┘
//!     │                                timeout, no networks)
//!     └───────────────────── Disabled ◀── too many dark resumes
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::capability::SupportedTriggers;
use super::clock::{BootClock, Clock};
use super::config::{WakeOnWifiConfig, WakeOnWifiFeatures};
use super::history::DarkResumeHistory;
use super::timer::{self, OneShotTimer};
use super::triggers::WakeTriggerManager;
use super::wake_reason::WakeReason;
use super::{FreqSet, Ssid, TriggerKind, TriggerSet, WifiHooks, WowlanTransport};
use crate::netlink::Result;
use crate::netlink::genl::nl80211::{Nl80211Cmd, Nl80211Message};

/// A lease renewing sooner than this is renewed before suspending.
pub const IMMEDIATE_LEASE_RENEWAL_THRESHOLD: Duration = Duration::from_secs(60);

const DARK_RESUME_SHORT_PERIOD: Duration = Duration::from_secs(60);
const MAX_DARK_RESUMES_SHORT: usize = 3;
const DARK_RESUME_LONG_PERIOD: Duration = Duration::from_secs(10 * 60);
const MAX_DARK_RESUMES_LONG: usize = 10;

/// Scans on at most this many frequencies may be retried.
pub const MAX_FREQS_FOR_SCAN_RETRIES: usize = 8;

/// Scan retries granted to a dark resume.
pub const MAX_DARK_RESUME_SCAN_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Awake,
    /// Suspend requested; triggers being computed or programmed.
    SuspendPending,
    /// Woken by the adapter; deciding whether to reconnect.
    DarkResume,
    /// Throttled: wake-on-WiFi is off until the wake-to-scan alarm.
    Disabled,
}

/// Deferred before-suspend actions.
#[derive(Debug, Clone, Copy)]
struct SuspendActions {
    connected: bool,
    start_lease_timer: bool,
    secs_to_renewal: u32,
}

/// Decides what to program before each suspend and what to do in dark resume.
///
/// Throttling and the wake alarms run on a boot-time [`Clock`]; the dark
/// resume timeout and verification run on `tokio::time`.
pub struct SuspendResumeController<T, H> {
    triggers: WakeTriggerManager<T>,
    hooks: H,
    clock: Box<dyn Clock + Send>,
    config: WakeOnWifiConfig,
    state: ControllerState,
    wake_reason: WakeReason,
    last_ssid_match_freqs: FreqSet,
    history: DarkResumeHistory,
    dark_resume_scan_retries_left: u32,
    lease_renewal_timer: OneShotTimer<Duration>,
    wake_to_scan_timer: OneShotTimer<Duration>,
    dark_resume_timer: OneShotTimer,
    whitelist: Vec<Ssid>,
    pending: VecDeque<SuspendActions>,
}

impl<T: WowlanTransport, H: WifiHooks> SuspendResumeController<T, H> {
    pub fn new(transport: T, hooks: H, config: WakeOnWifiConfig) -> Self {
        Self {
            triggers: WakeTriggerManager::new(transport, config.net_detect_scan_period_secs),
            hooks,
            clock: Box::new(BootClock),
            config,
            state: ControllerState::Awake,
            wake_reason: WakeReason::Unsupported,
            last_ssid_match_freqs: FreqSet::new(),
            history: DarkResumeHistory::new(),
            dark_resume_scan_retries_left: 0,
            lease_renewal_timer: OneShotTimer::new(),
            wake_to_scan_timer: OneShotTimer::new(),
            dark_resume_timer: OneShotTimer::new(),
            whitelist: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Replace the boot-time clock, e.g. with a
    /// [`SimulatedBootClock`](super::clock::SimulatedBootClock) in tests.
    pub fn with_clock(mut self, clock: impl Clock + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The trigger manager that programs the adapter.
    pub fn triggers(&self) -> &WakeTriggerManager<T> {
        &self.triggers
    }

    /// Mutable access to the trigger manager.
    pub fn triggers_mut(&mut self) -> &mut WakeTriggerManager<T> {
        &mut self.triggers
    }

    /// The host's connectivity hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Mutable access to the host's connectivity hooks.
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Current configuration, including the enabled features.
    pub fn config(&self) -> &WakeOnWifiConfig {
        &self.config
    }

    /// Where the suspend / dark resume cycle stands.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Reason from the last recognised wake notification.
    pub fn wake_reason(&self) -> &WakeReason {
        &self.wake_reason
    }

    /// Frequencies the last SSID match was seen on.
    pub fn last_ssid_match_freqs(&self) -> &FreqSet {
        &self.last_ssid_match_freqs
    }

    /// Whitelist as last stored (without repeats and truncated to the
    /// adapter's capacity once the disconnected actions ran).
    pub fn whitelist(&self) -> &[Ssid] {
        &self.whitelist
    }

    /// Counted dark resumes since the last suspend.
    pub fn dark_resume_history(&self) -> &DarkResumeHistory {
        &self.history
    }

    /// Scans the current dark resume may still retry.
    pub fn dark_resume_scan_retries_left(&self) -> u32 {
        self.dark_resume_scan_retries_left
    }

    /// Boot-clock time at which the host should wake to renew its DHCP
    /// lease. Meant for the host's RTC wake alarm.
    pub fn lease_renewal_deadline(&self) -> Option<Duration> {
        self.lease_renewal_timer.deadline()
    }

    /// Boot-clock time at which the host should wake to scan for networks it
    /// could not whitelist. Meant for the host's RTC wake alarm.
    pub fn wake_to_scan_deadline(&self) -> Option<Duration> {
        self.wake_to_scan_timer.deadline()
    }

    /// When an unanswered dark resume is given up on.
    pub fn dark_resume_deadline(&self) -> Option<Instant> {
        self.dark_resume_timer.deadline()
    }

    /// Address wake settings to wiphy `index`.
    pub fn set_wiphy_index(&mut self, index: u32) {
        self.triggers.set_wiphy_index(index);
    }

    /// Learn the wiphy index and capabilities from `NL80211_CMD_NEW_WIPHY`.
    pub fn on_new_wiphy(&mut self, msg: &Nl80211Message) {
        if !msg.is(Nl80211Cmd::NewWiphy) {
            tracing::debug!(cmd = msg.cmd(), "ignoring non-wiphy message");
            return;
        }
        if let Some(index) = msg.wiphy_index() {
            self.triggers.set_wiphy_index(index);
        }
        self.triggers.set_supported(SupportedTriggers::parse(msg));
    }

    /// Returns `false` if `features` were already enabled.
    pub fn set_features_enabled(&mut self, features: WakeOnWifiFeatures) -> bool {
        if self.config.features_enabled == features {
            return false;
        }
        tracing::info!(%features, "wake on WiFi features changed");
        self.config.features_enabled = features;
        true
    }

    /// Wake on packets addressed to `addr`.
    pub fn add_wake_pattern(&mut self, addr: &str) -> Result<()> {
        self.triggers.add_pattern(addr)
    }

    /// Stop waking on packets addressed to `addr`.
    pub fn remove_wake_pattern(&mut self, addr: &str) -> Result<()> {
        self.triggers.remove_pattern(addr)
    }

    /// Drop every registered wake address.
    pub fn clear_wake_patterns(&mut self) -> Result<()> {
        self.triggers.clear_patterns()
    }

    fn packet_enabled_and_supported(&self) -> bool {
        self.config.features_enabled.packet() && self.triggers.is_supported(TriggerKind::Pattern)
    }

    fn dark_connect_enabled_and_supported(&self) -> bool {
        self.config.features_enabled.dark_connect()
            && self.triggers.is_supported(TriggerKind::Disconnect)
            && self.triggers.is_supported(TriggerKind::SsidNetDetect)
    }

    /// Prepare for suspend.
    ///
    /// The trigger computation is queued and runs on the next
    /// [`run_pending_tasks`](Self::run_pending_tasks), after any lease
    /// renewal requested here. `done` receives the outcome. Actions still
    /// queued from an earlier call are dropped and that caller is failed.
    pub fn before_suspend(
        &mut self,
        connected: bool,
        whitelist: Vec<Ssid>,
        have_lease: bool,
        secs_to_renewal: u32,
        done: oneshot::Sender<Result<()>>,
    ) {
        tracing::info!(features = %self.config.features_enabled, connected, "before suspend");
        self.drop_stale_actions();
        self.triggers.set_done(done);
        self.whitelist = whitelist;
        self.history.clear();
        self.state = ControllerState::SuspendPending;

        let renew_now = have_lease
            && connected
            && Duration::from_secs(secs_to_renewal.into()) < IMMEDIATE_LEASE_RENEWAL_THRESHOLD;
        if renew_now {
            self.hooks.renew_lease();
        }
        self.pending.push_back(SuspendActions {
            connected,
            start_lease_timer: have_lease && !renew_now,
            secs_to_renewal,
        });
    }

    /// Handle a wake into dark resume.
    pub async fn dark_resume(
        &mut self,
        connected: bool,
        whitelist: Vec<Ssid>,
        done: oneshot::Sender<Result<()>>,
    ) {
        tracing::info!(reason = ?self.wake_reason, connected, "dark resume");
        self.drop_stale_actions();
        self.dark_resume_scan_retries_left = 0;
        self.triggers.set_done(done);
        self.whitelist = whitelist;

        let now = Instant::now();
        let boot_now = self.clock.now();
        let counted = match self.wake_reason {
            WakeReason::Ssid(_) | WakeReason::Disconnect => true,
            WakeReason::Unsupported => !connected,
            WakeReason::Pattern(_) => false,
        };
        if counted {
            self.history.record(boot_now);
        }

        if self.throttled(boot_now) {
            tracing::error!("too many dark resumes, disabling wake on WiFi temporarily");
            self.lease_renewal_timer.stop();
            self.wake_to_scan_timer
                .start(boot_now + self.config.wake_to_scan_period());
            self.history.clear();
            self.last_ssid_match_freqs.clear();
            self.state = ControllerState::Disabled;
            if let Err(e) = self.triggers.disable().await {
                self.triggers.complete(Err(e));
            }
            return;
        }

        match self.wake_reason.clone() {
            WakeReason::Pattern(_) => {
                // the packet was already delivered, go straight back to sleep
                self.pending.push_back(SuspendActions {
                    connected,
                    start_lease_timer: false,
                    secs_to_renewal: 0,
                });
            }
            WakeReason::Ssid(_) => {
                self.hooks.remove_all_managed_networks();
                let freqs = self.last_ssid_match_freqs.clone();
                self.initiate_scan(&freqs);
            }
            WakeReason::Disconnect => {
                self.hooks.remove_all_managed_networks();
                self.initiate_scan(&FreqSet::new());
            }
            WakeReason::Unsupported => {
                if connected {
                    self.hooks.renew_lease();
                } else {
                    self.hooks.remove_all_managed_networks();
                    self.initiate_scan(&FreqSet::new());
                }
            }
        }

        self.state = ControllerState::DarkResume;
        self.dark_resume_timer
            .start(now + self.config.dark_resume_actions_timeout());
    }

    /// Whether the dark resumes seen up to boot-clock time `now` are too
    /// frequent.
    fn throttled(&self, now: Duration) -> bool {
        self.history.count_within(DARK_RESUME_SHORT_PERIOD, now) >= MAX_DARK_RESUMES_SHORT
            || self.history.count_within(DARK_RESUME_LONG_PERIOD, now) >= MAX_DARK_RESUMES_LONG
    }

    /// Drop queued actions whose caller is about to be superseded.
    fn drop_stale_actions(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(stale = self.pending.len(), "dropping queued suspend actions");
            self.pending.clear();
        }
    }

    fn initiate_scan(&mut self, freqs: &FreqSet) {
        if !freqs.is_empty() && freqs.len() <= MAX_FREQS_FOR_SCAN_RETRIES {
            tracing::debug!(
                retries = MAX_DARK_RESUME_SCAN_RETRIES,
                freqs = freqs.len(),
                "allowing dark resume scan retries"
            );
            self.dark_resume_scan_retries_left = MAX_DARK_RESUME_SCAN_RETRIES;
        }
        self.hooks.initiate_scan(freqs);
    }

    /// The host has an address and a working route again.
    ///
    /// In dark resume this ends the episode: triggers are re-armed as
    /// connected.
    pub async fn connected_and_reachable(&mut self, start_lease_timer: bool, secs_to_renewal: u32) {
        if self.state != ControllerState::DarkResume {
            tracing::debug!("not in dark resume, nothing to do");
            return;
        }
        self.run_suspend_actions(SuspendActions {
            connected: true,
            start_lease_timer,
            secs_to_renewal,
        })
        .await;
    }

    /// A scan finished without finding any network to auto-connect to.
    pub async fn no_auto_connectable_services(&mut self, whitelist: Vec<Ssid>) {
        if self.state != ControllerState::DarkResume {
            return;
        }
        if self.dark_resume_scan_retries_left > 0 {
            self.dark_resume_scan_retries_left -= 1;
            tracing::debug!(
                left = self.dark_resume_scan_retries_left,
                "retrying dark resume scan"
            );
            let freqs = self.last_ssid_match_freqs.clone();
            self.hooks.initiate_scan(&freqs);
            return;
        }
        self.whitelist = whitelist;
        self.run_suspend_actions(SuspendActions {
            connected: false,
            start_lease_timer: false,
            secs_to_renewal: 0,
        })
        .await;
    }

    /// The host is fully awake.
    pub async fn after_resume(&mut self) {
        tracing::debug!("after resume");
        self.wake_to_scan_timer.stop();
        self.lease_renewal_timer.stop();
        self.dark_resume_timer.stop();
        self.state = ControllerState::Awake;

        if self.packet_enabled_and_supported() || self.dark_connect_enabled_and_supported() {
            if let Err(e) = self.triggers.disable().await {
                tracing::warn!("failed to disable wake on WiFi after resume: {e}");
            }
        }
    }

    /// A scan began; flags an active scan where only passive ones belong.
    pub fn scan_started(&mut self, active: bool) {
        if self.state != ControllerState::DarkResume {
            return;
        }
        let expects_passive = matches!(
            self.wake_reason,
            WakeReason::Unsupported | WakeReason::Pattern(_)
        );
        if expects_passive && active {
            tracing::error!("unexpected active scan launched in dark resume");
        }
    }

    /// Record why the adapter woke the host.
    ///
    /// Only `NL80211_CMD_SET_WOWLAN` notifications for this wiphy count.
    pub fn on_wake_notification(&mut self, msg: &Nl80211Message) {
        if !msg.is(Nl80211Cmd::SetWowlan) {
            return;
        }
        let Some(index) = msg.wiphy_index() else {
            tracing::error!("wake notification without a wiphy index");
            return;
        };
        match self.triggers.wiphy_index() {
            None => {
                tracing::debug!("wiphy index not yet known, ignoring wake notification");
                return;
            }
            Some(ours) if ours != index => {
                tracing::debug!(index, "wake notification for another wiphy");
                return;
            }
            Some(_) => {}
        }

        let reason = WakeReason::parse(msg);
        let Some(label) = reason.label() else {
            tracing::debug!("wake reason not related to wake on WiFi");
            return;
        };
        tracing::info!(?reason, "wake reason");
        self.hooks.record_wake_reason(label);
        if let WakeReason::Ssid(freqs) = &reason {
            self.last_ssid_match_freqs = freqs.clone();
        }
        self.wake_reason = reason;
    }

    /// Whether before-suspend actions wait for
    /// [`run_pending_tasks`](Self::run_pending_tasks).
    pub fn has_pending_tasks(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Run queued before-suspend actions.
    pub async fn run_pending_tasks(&mut self) {
        while let Some(actions) = self.pending.pop_front() {
            self.run_suspend_actions(actions).await;
        }
    }

    /// Earliest armed timer, including the manager's verification timer.
    ///
    /// Wake alarms are mapped from the boot clock onto `tokio::time` as of
    /// now.
    pub fn next_deadline(&self) -> Option<Instant> {
        let now = Instant::now();
        let boot_now = self.clock.now();
        let alarm = |deadline: Option<Duration>| {
            deadline.map(|d| now + d.saturating_sub(boot_now))
        };
        timer::earliest([
            self.triggers.verify_deadline(),
            alarm(self.lease_renewal_timer.deadline()),
            alarm(self.wake_to_scan_timer.deadline()),
            self.dark_resume_timer.deadline(),
        ])
    }

    /// Fire every timer due at `now`.
    pub async fn fire_due_timers(&mut self, now: Instant) {
        self.triggers.on_verify_timer(now).await;

        // wake alarms; the work happens in the dark resume they cause
        let boot_now = self.clock.now();
        if self.lease_renewal_timer.expire(boot_now) {
            tracing::debug!("lease renewal alarm");
        }
        if self.wake_to_scan_timer.expire(boot_now) {
            tracing::debug!("wake to scan alarm");
        }

        if self.dark_resume_timer.expire(now) && self.state == ControllerState::DarkResume {
            tracing::info!("dark resume actions timed out, assuming disconnected");
            self.run_suspend_actions(SuspendActions {
                connected: false,
                start_lease_timer: false,
                secs_to_renewal: 0,
            })
            .await;
        }
    }

    async fn run_suspend_actions(&mut self, actions: SuspendActions) {
        let SuspendActions {
            connected,
            start_lease_timer,
            secs_to_renewal,
        } = actions;
        tracing::info!(connected, "before suspend actions");

        let boot_now = self.clock.now();
        self.last_ssid_match_freqs.clear();
        self.wake_reason = WakeReason::Unsupported;

        let mut desired = TriggerSet::new();
        if connected
            && self.packet_enabled_and_supported()
            && !self.triggers.addresses().is_empty()
        {
            desired.insert(TriggerKind::Pattern);
        }

        if self.dark_connect_enabled_and_supported() {
            if connected {
                desired.insert(TriggerKind::Disconnect);
                self.wake_to_scan_timer.stop();
                if start_lease_timer {
                    self.lease_renewal_timer
                        .start(boot_now + Duration::from_secs(secs_to_renewal.into()));
                }
            } else {
                // drop networks so dark resume scans stay passive
                self.hooks.remove_all_managed_networks();
                self.lease_renewal_timer.stop();

                let mut seen = BTreeSet::new();
                self.whitelist.retain(|ssid| seen.insert(ssid.clone()));

                let max = self.triggers.max_whitelisted_names();
                let extra = self.whitelist.len().saturating_sub(max);
                if extra > 0 {
                    tracing::debug!(extra, "whitelist exceeds adapter capacity");
                    self.whitelist.truncate(max);
                }
                if extra > 0 || self.config.force_wake_to_scan_timer {
                    self.wake_to_scan_timer
                        .start(boot_now + self.config.wake_to_scan_period());
                }
                if !self.whitelist.is_empty() {
                    desired.insert(TriggerKind::SsidNetDetect);
                }
            }
        }

        self.dark_resume_timer.stop();

        if self.state != ControllerState::DarkResume && desired.is_empty() {
            tracing::debug!("no wake triggers wanted, adapter left untouched");
            self.triggers.complete(Ok(()));
            return;
        }

        self.state = ControllerState::SuspendPending;
        if let Err(e) = self.triggers.apply(desired, self.whitelist.clone()).await {
            self.triggers.complete(Err(e));
        }
    }
}
