//! Programming and verifying the adapter's wake triggers.
//!
//! Every configuration is read back after [`VERIFY_DELAY`] and compared with
//! what was sent. A mismatch re-programs the same configuration up to
//! [`MAX_SET_RETRIES`] times before the episode is reported as failed.

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::capability::SupportedTriggers;
use super::codec;
use super::pattern::WakePattern;
use super::timer::OneShotTimer;
use super::{Ssid, TriggerKind, TriggerSet, WowlanTransport};
use crate::netlink::{Error, Result};

/// Delay between programming the adapter and reading the settings back.
pub const VERIFY_DELAY: Duration = Duration::from_millis(300);

/// Re-programming attempts after a failed verification.
pub const MAX_SET_RETRIES: u32 = 2;

/// Where the manager is in an apply / verify episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    /// A configuration message is in flight.
    Applying,
    /// Triggers were sent; waiting to read them back.
    AwaitingVerification,
    /// The disable message was sent; waiting to read it back.
    Disabling,
}

/// Owns the adapter's wake trigger configuration.
pub struct WakeTriggerManager<T> {
    transport: T,
    wiphy_index: Option<u32>,
    supported: SupportedTriggers,
    revoked: TriggerSet,
    desired: TriggerSet,
    addresses: Vec<IpAddr>,
    whitelist: Vec<Ssid>,
    net_detect_scan_period_secs: u32,
    retries: u32,
    state: ManagerState,
    verify_timer: OneShotTimer,
    done: Option<oneshot::Sender<Result<()>>>,
}

impl<T: WowlanTransport> WakeTriggerManager<T> {
    pub fn new(transport: T, net_detect_scan_period_secs: u32) -> Self {
        Self {
            transport,
            wiphy_index: None,
            supported: SupportedTriggers::default(),
            revoked: TriggerSet::new(),
            desired: TriggerSet::new(),
            addresses: Vec::new(),
            whitelist: Vec::new(),
            net_detect_scan_period_secs,
            retries: 0,
            state: ManagerState::Idle,
            verify_timer: OneShotTimer::new(),
            done: None,
        }
    }

    /// The kernel connection used to send and read back settings.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the kernel connection.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Set the wiphy every message is addressed to.
    pub fn set_wiphy_index(&mut self, index: u32) {
        self.wiphy_index = Some(index);
    }

    /// `None` until a wiphy has been seen.
    pub fn wiphy_index(&self) -> Option<u32> {
        self.wiphy_index
    }

    /// Replace the adapter capabilities. Previously revoked triggers stay revoked.
    pub fn set_supported(&mut self, supported: SupportedTriggers) {
        self.supported = supported;
    }

    /// Capabilities as advertised, ignoring revocations.
    pub fn supported(&self) -> &SupportedTriggers {
        &self.supported
    }

    /// Whether the adapter advertises `kind` and has not rejected it since.
    pub fn is_supported(&self, kind: TriggerKind) -> bool {
        self.supported.contains(kind) && !self.revoked.contains(&kind)
    }

    /// How many SSIDs a net-detect configuration may carry.
    pub fn max_whitelisted_names(&self) -> usize {
        self.supported.max_whitelisted_names as usize
    }

    /// Register an IP address whose packets should wake the host.
    ///
    /// Registering an address twice is a no-op.
    pub fn add_pattern(&mut self, addr: &str) -> Result<()> {
        self.require_pattern_support()?;
        let ip = parse_addr(addr)?;
        if self.addresses.len() >= self.supported.max_patterns as usize {
            return Err(Error::OperationFailed(
                "max number of IP address patterns already registered".into(),
            ));
        }
        if !self.addresses.contains(&ip) {
            self.addresses.push(ip);
        }
        Ok(())
    }

    /// Unregister `addr`. Fails with `NotFound` if it was never registered.
    pub fn remove_pattern(&mut self, addr: &str) -> Result<()> {
        self.require_pattern_support()?;
        let ip = parse_addr(addr)?;
        let Some(pos) = self.addresses.iter().position(|a| *a == ip) else {
            return Err(Error::NotFound(format!("no wake pattern registered for {ip}")));
        };
        self.addresses.remove(pos);
        Ok(())
    }

    /// Unregister every address.
    pub fn clear_patterns(&mut self) -> Result<()> {
        self.require_pattern_support()?;
        self.addresses.clear();
        Ok(())
    }

    fn require_pattern_support(&self) -> Result<()> {
        if self.is_supported(TriggerKind::Pattern) {
            Ok(())
        } else {
            Err(Error::NotSupported("wake on packet".into()))
        }
    }

    /// Registered addresses in registration order.
    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    /// Patterns for the registered addresses, in registration order.
    pub fn wake_patterns(&self) -> Vec<WakePattern> {
        self.addresses.iter().copied().map(WakePattern::for_address).collect()
    }

    /// Triggers of the last configuration that was built and sent.
    pub fn desired(&self) -> &TriggerSet {
        &self.desired
    }

    /// Whitelist of the last configuration that was built and sent.
    pub fn whitelist(&self) -> &[Ssid] {
        &self.whitelist
    }

    /// Where the current apply / verify episode stands.
    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Re-programming attempts spent on the current episode.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Register the callback for the current episode.
    ///
    /// A callback still pending from an earlier episode is failed.
    pub fn set_done(&mut self, done: oneshot::Sender<Result<()>>) {
        if let Some(old) = self.done.replace(done) {
            let _ = old.send(Err(Error::OperationFailed(
                "superseded by a newer request".into(),
            )));
        }
    }

    /// Invoke the episode callback, if one is pending.
    pub fn complete(&mut self, result: Result<()>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(result);
        }
    }

    /// Program `desired` and start a new verification episode.
    ///
    /// An empty set disables wake-on-WiFi. A send the adapter rejects as
    /// unsupported revokes the requested trigger kinds for good.
    pub async fn apply(&mut self, desired: TriggerSet, whitelist: Vec<Ssid>) -> Result<()> {
        self.retries = 0;
        self.program(desired, whitelist).await
    }

    /// Clear every trigger on the adapter.
    pub async fn disable(&mut self) -> Result<()> {
        self.apply(TriggerSet::new(), Vec::new()).await
    }

    async fn program(&mut self, desired: TriggerSet, whitelist: Vec<Ssid>) -> Result<()> {
        let wiphy = self
            .wiphy_index
            .ok_or_else(|| Error::OperationFailed("wiphy index unknown".into()))?;

        // nothing is recorded until the message builds
        let (msg, next) = if desired.is_empty() {
            (codec::build_disable_message(wiphy), ManagerState::Disabling)
        } else {
            let msg = codec::build_set_message(
                wiphy,
                &desired,
                &self.wake_patterns(),
                &whitelist,
                self.net_detect_scan_period_secs,
            )?;
            (msg, ManagerState::AwaitingVerification)
        };
        self.desired = desired;
        self.whitelist = whitelist;

        self.verify_timer.stop();
        self.state = ManagerState::Applying;
        match self.transport.send(&msg).await {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                tracing::debug!("no reply to wake settings, verifying anyway");
            }
            Err(e) if e.is_not_supported() => {
                tracing::warn!(triggers = ?self.desired, "adapter rejected wake triggers: {e}");
                self.revoked.extend(self.desired.iter().copied());
                self.state = ManagerState::Idle;
                return Err(Error::NotSupported(format!("wake triggers {:?}", self.desired)));
            }
            Err(e) => {
                tracing::error!("failed to send wake settings: {e}");
                self.state = ManagerState::Idle;
                return Err(e);
            }
        }

        self.state = next;
        self.verify_timer.start(Instant::now() + VERIFY_DELAY);
        Ok(())
    }

    /// When the pending verification is due.
    pub fn verify_deadline(&self) -> Option<Instant> {
        self.verify_timer.deadline()
    }

    /// Run the verification if its timer has expired at `now`.
    pub async fn on_verify_timer(&mut self, now: Instant) {
        if !self.verify_timer.expire(now) {
            return;
        }
        if !matches!(
            self.state,
            ManagerState::AwaitingVerification | ManagerState::Disabling
        ) {
            return;
        }

        if self.verify().await {
            tracing::debug!(triggers = ?self.desired, "wake settings verified");
            self.retries = 0;
            self.state = ManagerState::Idle;
            self.complete(Ok(()));
            return;
        }

        if self.retries < MAX_SET_RETRIES {
            self.retries += 1;
            tracing::info!(attempt = self.retries, "wake settings mismatch, programming again");
            let (desired, whitelist) = (self.desired.clone(), self.whitelist.clone());
            if let Err(e) = self.program(desired, whitelist).await {
                self.retries = 0;
                self.state = ManagerState::Idle;
                self.complete(Err(e));
            }
            return;
        }

        let attempts = self.retries + 1;
        tracing::error!(attempts, "failed to verify wake settings, giving up");
        self.retries = 0;
        self.state = ManagerState::Idle;
        self.complete(Err(Error::VerificationFailed { attempts }));
    }

    async fn verify(&mut self) -> bool {
        let Some(wiphy) = self.wiphy_index else {
            return false;
        };
        match self.transport.request(&codec::build_get_message(wiphy)).await {
            Ok(reply) => codec::settings_match(
                &reply,
                &self.desired,
                &self.wake_patterns(),
                self.net_detect_scan_period_secs,
                &self.whitelist,
            ),
            Err(e) => {
                tracing::warn!("failed to read back wake settings: {e}");
                false
            }
        }
    }
}

fn parse_addr(addr: &str) -> Result<IpAddr> {
    addr.parse()
        .map_err(|_| Error::InvalidArgument(format!("invalid IP address: {addr}")))
}
