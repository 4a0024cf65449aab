//! Subscribe/reconnect state machine for the live feed.
//!
//! A single driver task owns the subscription. Because every subscribe call
//! and every backoff timer lives inside that one task, at most one reconnect
//! attempt is ever in flight. Other components talk to the driver through a
//! control channel:
//!
//! - `notify_disconnect` while connected drops the subscription and starts
//!   backoff; while retrying it restarts the pending timer for the current
//!   attempt (the attempt counter is kept).
//! - `reconnect` resets the attempt counter and connects immediately, also
//!   from `PermanentlyFailed`.
//! - `shutdown` unsubscribes cleanly and stops the driver.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::BackoffPolicy;
use crate::collaborators::{FeedEvent, FeedSubscription, LiveFeed};
use crate::config::BackoffConfig;
use crate::liveness::Liveness;
use crate::models::{ConnectionState, RawComplaintRecord};

/// How long `shutdown` waits for the driver before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Record change forwarded from the feed to the orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedUpdate {
    /// The complete current record set.
    Snapshot(Vec<RawComplaintRecord>),
    /// Records changed upstream and must be refetched.
    Changed,
}

#[derive(Debug)]
enum Control {
    Disconnected(Option<u16>),
    Reconnect,
    Stop,
}

enum SessionEnd {
    Dropped(Option<u16>),
    Restart,
    Stop,
}

/// Keeps the live feed subscribed across failures.
pub struct ConnectionSupervisor {
    feed: Arc<dyn LiveFeed>,
    policy: BackoffPolicy,
    liveness: Liveness,
    state: watch::Sender<ConnectionState>,
    control: Mutex<Option<mpsc::UnboundedSender<Control>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub fn new(feed: Arc<dyn LiveFeed>, config: BackoffConfig, liveness: Liveness) -> Self {
        let (state, _receiver) = watch::channel(ConnectionState::Idle);
        Self {
            feed,
            policy: BackoffPolicy::new(config),
            liveness,
            state,
            control: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| {
            warn!("Connection supervisor mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Spawns the driver. Feed updates are forwarded to `updates`.
    ///
    /// Calling `start` on a running supervisor does nothing.
    pub fn start(self: &Arc<Self>, updates: mpsc::UnboundedSender<FeedUpdate>) {
        let mut driver = self.lock(&self.driver);
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Connection supervisor already running");
            return;
        }
        if !self.liveness.is_live() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock(&self.control) = Some(tx);
        *driver = Some(tokio::spawn(Arc::clone(self).drive(rx, updates)));
    }

    /// Report a disconnect observed outside the feed (for example a lost network).
    pub fn notify_disconnect(&self, code: Option<u16>) {
        self.send(Control::Disconnected(code));
    }

    /// Manual reconnect: resets backoff and subscribes immediately.
    pub fn reconnect(&self) {
        self.send(Control::Reconnect);
    }

    /// Stops the driver and cancels any pending backoff timer.
    pub async fn shutdown(&self) {
        self.send(Control::Stop);
        let handle = self.lock(&self.driver).take();
        self.lock(&self.control).take();

        if let Some(mut handle) = handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("Connection supervisor did not stop in time, aborting driver");
                handle.abort();
            }
        }
    }

    fn send(&self, control: Control) {
        if let Some(tx) = self.lock(&self.control).as_ref() {
            if tx.send(control).is_err() {
                debug!("Connection supervisor driver is not running");
            }
        }
    }

    /// Applies a state transition. Refused after disposal or when the state
    /// machine does not allow it.
    fn transition(&self, next: ConnectionState) -> bool {
        if !self.liveness.is_live() {
            return false;
        }

        let current = self.state();
        if !current.can_transition_to(&next) {
            warn!(
                "Connection supervisor: refusing transition {} -> {}",
                current, next
            );
            return false;
        }

        info!("Connection supervisor: {} -> {}", current, next);
        self.state.send_replace(next);
        true
    }

    async fn drive(
        self: Arc<Self>,
        mut control: mpsc::UnboundedReceiver<Control>,
        updates: mpsc::UnboundedSender<FeedUpdate>,
    ) {
        let mut attempt: u32 = 0;

        loop {
            if !self.liveness.is_live() {
                return;
            }
            self.transition(ConnectionState::Connecting);

            let subscribed = {
                let subscribe = self.feed.subscribe();
                tokio::pin!(subscribe);
                loop {
                    tokio::select! {
                        result = &mut subscribe => break Some(result),
                        ctrl = control.recv() => match ctrl {
                            Some(Control::Stop) | None => break None,
                            Some(other) => debug!("Ignoring {:?} while connecting", other),
                        },
                    }
                }
            };

            let Some(subscribed) = subscribed else {
                self.feed.unsubscribe().await;
                self.transition(ConnectionState::Idle);
                return;
            };

            if !self.liveness.is_live() {
                if subscribed.is_ok() {
                    self.feed.unsubscribe().await;
                }
                return;
            }

            match subscribed {
                Ok(subscription) => {
                    self.transition(ConnectionState::Connected);
                    attempt = 0;

                    match self.pump(subscription, &mut control, &updates).await {
                        SessionEnd::Dropped(code) => {
                            warn!("Live feed dropped (code {:?}), backing off", code);
                        }
                        SessionEnd::Restart => {
                            self.feed.unsubscribe().await;
                            continue;
                        }
                        SessionEnd::Stop => {
                            self.feed.unsubscribe().await;
                            self.transition(ConnectionState::Idle);
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Live feed subscribe failed: {}", e);
                }
            }

            if !self.liveness.is_live() {
                return;
            }

            // Backoff, one timer at a time.
            attempt = attempt.saturating_add(1);
            if self.policy.is_exhausted(attempt) {
                self.transition(ConnectionState::PermanentlyFailed);
                loop {
                    match control.recv().await {
                        Some(Control::Reconnect) => {
                            attempt = 0;
                            break;
                        }
                        Some(Control::Disconnected(_)) => continue,
                        Some(Control::Stop) | None => {
                            self.transition(ConnectionState::Idle);
                            return;
                        }
                    }
                }
                continue;
            }

            let delay = self.policy.jittered_delay(attempt);
            self.transition(ConnectionState::retrying(attempt, delay));
            let timer = tokio::time::sleep(delay);
            tokio::pin!(timer);

            loop {
                tokio::select! {
                    _ = &mut timer => break,
                    ctrl = control.recv() => match ctrl {
                        Some(Control::Disconnected(code)) => {
                            debug!(
                                "Disconnect (code {:?}) while retrying, restarting attempt {}",
                                code, attempt
                            );
                            timer.as_mut().reset(tokio::time::Instant::now() + delay);
                            self.transition(ConnectionState::retrying(attempt, delay));
                        }
                        Some(Control::Reconnect) => {
                            info!("Manual reconnect requested, resetting backoff");
                            attempt = 0;
                            break;
                        }
                        Some(Control::Stop) | None => {
                            self.transition(ConnectionState::Idle);
                            return;
                        }
                    },
                }
            }
        }
    }

    async fn pump(
        &self,
        mut subscription: FeedSubscription,
        control: &mut mpsc::UnboundedReceiver<Control>,
        updates: &mpsc::UnboundedSender<FeedUpdate>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                event = subscription.next() => {
                    let update = match event {
                        Some(FeedEvent::Snapshot(records)) => FeedUpdate::Snapshot(records),
                        Some(FeedEvent::Changed) => FeedUpdate::Changed,
                        Some(FeedEvent::Closed { code }) => return SessionEnd::Dropped(code),
                        Some(FeedEvent::Error(message)) => {
                            warn!("Live feed error: {}", message);
                            return SessionEnd::Dropped(None);
                        }
                        None => return SessionEnd::Dropped(None),
                    };

                    if !self.liveness.is_live() {
                        return SessionEnd::Stop;
                    }
                    if updates.send(update).is_err() {
                        debug!("Feed update receiver dropped");
                    }
                }
                ctrl = control.recv() => match ctrl {
                    Some(Control::Disconnected(code)) => {
                        self.feed.unsubscribe().await;
                        return SessionEnd::Dropped(code);
                    }
                    Some(Control::Reconnect) => return SessionEnd::Restart,
                    Some(Control::Stop) | None => return SessionEnd::Stop,
                },
            }
        }
    }
}
