//! Event loop around [`SuspendResumeController`].
//!
//! The controller runs on a single task. The host talks to it through a
//! cloneable [`WakeOnWifiHandle`]; requests are handled one at a time, and
//! between requests the loop sleeps until the controller's next timer.
//!
//! ```rust,ignore
//! let (handle, requests) = service::channel(16);
//! let service = controller.run(requests);
//!
//! // elsewhere, on the same task
//! handle.before_suspend(connected, whitelist, have_lease, secs_to_renewal).await?;
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::config::WakeOnWifiFeatures;
use super::controller::SuspendResumeController;
use super::{Ssid, WifiHooks, WowlanTransport};
use crate::netlink::{Error, Result};
use crate::netlink::genl::nl80211::{Nl80211Connection, Nl80211Message};

/// A request to the controller task.
#[derive(Debug)]
pub enum Request {
    BeforeSuspend {
        connected: bool,
        whitelist: Vec<Ssid>,
        have_lease: bool,
        secs_to_renewal: u32,
        done: oneshot::Sender<Result<()>>,
    },
    DarkResume {
        connected: bool,
        whitelist: Vec<Ssid>,
        done: oneshot::Sender<Result<()>>,
    },
    AfterResume,
    ConnectedAndReachable {
        start_lease_timer: bool,
        secs_to_renewal: u32,
    },
    NoAutoConnectableServices {
        whitelist: Vec<Ssid>,
    },
    ScanStarted {
        active: bool,
    },
    WakeNotification(Nl80211Message),
    NewWiphy(Nl80211Message),
    AddWakePattern {
        addr: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveWakePattern {
        addr: String,
        reply: oneshot::Sender<Result<()>>,
    },
    ClearWakePatterns {
        reply: oneshot::Sender<Result<()>>,
    },
    SetFeaturesEnabled {
        features: WakeOnWifiFeatures,
        reply: oneshot::Sender<bool>,
    },
}

/// Create a handle and the request stream for [`SuspendResumeController::run`].
pub fn channel(capacity: usize) -> (WakeOnWifiHandle, mpsc::Receiver<Request>) {
    let (tx, rx) = mpsc::channel(capacity);
    (WakeOnWifiHandle { tx }, rx)
}

fn stopped() -> Error {
    Error::OperationFailed("wake-on-WiFi service stopped".into())
}

/// Client side of the controller task.
#[derive(Debug, Clone)]
pub struct WakeOnWifiHandle {
    tx: mpsc::Sender<Request>,
}

impl WakeOnWifiHandle {
    async fn send(&self, request: Request) -> Result<()> {
        self.tx.send(request).await.map_err(|_| stopped())
    }

    async fn call<R>(&self, request: impl FnOnce(oneshot::Sender<R>) -> Request) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.send(request(reply)).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Program the adapter for suspend; resolves once the settings are
    /// verified or programming has failed for good.
    pub async fn before_suspend(
        &self,
        connected: bool,
        whitelist: Vec<Ssid>,
        have_lease: bool,
        secs_to_renewal: u32,
    ) -> Result<()> {
        self.call(|done| Request::BeforeSuspend {
            connected,
            whitelist,
            have_lease,
            secs_to_renewal,
            done,
        })
        .await?
    }

    /// Handle a dark resume; resolves when the host may suspend again.
    pub async fn dark_resume(&self, connected: bool, whitelist: Vec<Ssid>) -> Result<()> {
        self.call(|done| Request::DarkResume {
            connected,
            whitelist,
            done,
        })
        .await?
    }

    pub async fn after_resume(&self) -> Result<()> {
        self.send(Request::AfterResume).await
    }

    pub async fn connected_and_reachable(
        &self,
        start_lease_timer: bool,
        secs_to_renewal: u32,
    ) -> Result<()> {
        self.send(Request::ConnectedAndReachable {
            start_lease_timer,
            secs_to_renewal,
        })
        .await
    }

    pub async fn no_auto_connectable_services(&self, whitelist: Vec<Ssid>) -> Result<()> {
        self.send(Request::NoAutoConnectableServices { whitelist }).await
    }

    pub async fn scan_started(&self, active: bool) -> Result<()> {
        self.send(Request::ScanStarted { active }).await
    }

    pub async fn wake_notification(&self, msg: Nl80211Message) -> Result<()> {
        self.send(Request::WakeNotification(msg)).await
    }

    pub async fn new_wiphy(&self, msg: Nl80211Message) -> Result<()> {
        self.send(Request::NewWiphy(msg)).await
    }

    pub async fn add_wake_pattern(&self, addr: impl Into<String>) -> Result<()> {
        let addr = addr.into();
        self.call(|reply| Request::AddWakePattern { addr, reply }).await?
    }

    pub async fn remove_wake_pattern(&self, addr: impl Into<String>) -> Result<()> {
        let addr = addr.into();
        self.call(|reply| Request::RemoveWakePattern { addr, reply })
            .await?
    }

    pub async fn clear_wake_patterns(&self) -> Result<()> {
        self.call(|reply| Request::ClearWakePatterns { reply }).await?
    }

    /// Returns `false` if `features` were already enabled.
    pub async fn set_features_enabled(&self, features: WakeOnWifiFeatures) -> Result<bool> {
        self.call(|reply| Request::SetFeaturesEnabled { features, reply })
            .await
    }
}

impl<T: WowlanTransport, H: WifiHooks> SuspendResumeController<T, H> {
    /// Apply one request.
    pub async fn handle(&mut self, request: Request) {
        match request {
            Request::BeforeSuspend {
                connected,
                whitelist,
                have_lease,
                secs_to_renewal,
                done,
            } => self.before_suspend(connected, whitelist, have_lease, secs_to_renewal, done),
            Request::DarkResume {
                connected,
                whitelist,
                done,
            } => self.dark_resume(connected, whitelist, done).await,
            Request::AfterResume => self.after_resume().await,
            Request::ConnectedAndReachable {
                start_lease_timer,
                secs_to_renewal,
            } => {
                self.connected_and_reachable(start_lease_timer, secs_to_renewal)
                    .await
            }
            Request::NoAutoConnectableServices { whitelist } => {
                self.no_auto_connectable_services(whitelist).await
            }
            Request::ScanStarted { active } => self.scan_started(active),
            Request::WakeNotification(msg) => self.on_wake_notification(&msg),
            Request::NewWiphy(msg) => self.on_new_wiphy(&msg),
            Request::AddWakePattern { addr, reply } => {
                let _ = reply.send(self.add_wake_pattern(&addr));
            }
            Request::RemoveWakePattern { addr, reply } => {
                let _ = reply.send(self.remove_wake_pattern(&addr));
            }
            Request::ClearWakePatterns { reply } => {
                let _ = reply.send(self.clear_wake_patterns());
            }
            Request::SetFeaturesEnabled { features, reply } => {
                let _ = reply.send(self.set_features_enabled(features));
            }
        }
    }

    /// Serve requests until every handle is dropped.
    ///
    /// Deferred work runs before the loop waits again, and due timers fire
    /// when no request is pending. Returns the controller so its final state
    /// can be inspected.
    pub async fn run(mut self, mut requests: mpsc::Receiver<Request>) -> Self {
        loop {
            self.run_pending_tasks().await;
            let deadline = self.next_deadline();

            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = sleep_until(deadline) => self.fire_due_timers(Instant::now()).await,
            }
        }
        tracing::debug!("wake-on-WiFi service stopped");
        self
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Forward wake notifications from `events` to the controller.
///
/// `events` must be a connection of its own with
/// [`subscribe_wake_events`](Nl80211Connection::subscribe_wake_events)
/// already called. Returns once the service has stopped.
pub async fn forward_wake_notifications(
    events: &Nl80211Connection,
    handle: &WakeOnWifiHandle,
) -> Result<()> {
    loop {
        for msg in events.recv_notifications().await? {
            if handle.wake_notification(msg).await.is_err() {
                return Ok(());
            }
        }
    }
}
