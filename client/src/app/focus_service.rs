//! Focus session driver
//!
//! Owns the [`FocusTracker`] and feeds it from three sources: a 30 second
//! poll of `/api/focus/active`, a one second countdown tick and change
//! events from the shared store. Observers read the current [`FocusView`]
//! from a watch channel; nothing else writes to the tracker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::app::focus_api::FocusApi;
use crate::app::focus_tracker::{FocusTracker, FocusView, Tick};
use crate::domain::entities::{FocusSession, PausedSnapshot};
use crate::domain::ports::{ApiTransport, KeyValueStore, StorageSubscription};
use crate::error::{ClientError, StorageError};

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct FocusService<T> {
    api: FocusApi<T>,
    tracker: FocusTracker,
    store_events: StorageSubscription,
    view: watch::Sender<FocusView>,
    poll_interval: Duration,
    tick_interval: Duration,
}

impl<T: ApiTransport> FocusService<T> {
    pub fn new(api: FocusApi<T>, store: Arc<dyn KeyValueStore>) -> Self {
        let store_events = store.subscribe();
        let tracker = FocusTracker::new(store);
        let (view, _) = watch::channel(tracker.view());
        Self {
            api,
            tracker,
            store_events,
            view,
            poll_interval: POLL_INTERVAL,
            tick_interval: TICK_INTERVAL,
        }
    }

    pub fn with_intervals(mut self, poll: Duration, tick: Duration) -> Self {
        self.poll_interval = poll;
        self.tick_interval = tick;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<FocusView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> FocusView {
        self.tracker.view()
    }

    fn publish(&self) {
        self.view.send_replace(self.tracker.view());
    }

    /// Ask the server for the active session. Failures are logged and leave
    /// the current state alone.
    pub async fn refresh(&mut self) {
        match self.api.active().await {
            Ok(active) => self.tracker.reconcile(active.session, Utc::now()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch active focus session");
                self.tracker.mark_loaded();
            }
        }
        self.publish();
    }

    /// Pause on the server, then locally. `None` when nothing is running.
    pub async fn pause(&mut self) -> Result<Option<PausedSnapshot>, ClientError> {
        if !self.tracker.is_active() {
            return Ok(None);
        }
        self.api.pause(self.tracker.time_remaining()).await?;
        let snapshot = self.tracker.pause(Utc::now())?;
        self.publish();
        Ok(snapshot)
    }

    /// Resume on the server and drop the local snapshot. `None` when
    /// nothing is paused.
    pub async fn resume(&mut self) -> Result<Option<FocusSession>, ClientError> {
        if !self.tracker.is_paused() {
            return Ok(None);
        }
        let session = self.api.resume().await?;
        self.tracker.clear_paused_state()?;
        self.tracker.reconcile(Some(session.clone()), Utc::now());
        self.publish();
        Ok(Some(session))
    }

    pub fn clear_paused_state(&mut self) -> Result<(), StorageError> {
        self.tracker.clear_paused_state()?;
        self.publish();
        Ok(())
    }

    /// Drive the tracker until `shutdown` turns true or its sender is
    /// dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.refresh().await;

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;
        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.tick().await;

        let mut store_open = true;
        loop {
            tokio::select! {
                _ = poll.tick() => self.refresh().await,
                _ = tick.tick() => match self.tracker.tick() {
                    Tick::NeedsRefresh => {
                        tracing::debug!("Focus countdown finished, refreshing");
                        self.refresh().await;
                    }
                    Tick::Remaining(_) => self.publish(),
                    Tick::Idle => {}
                },
                event = self.store_events.recv(), if store_open => match event {
                    Some(event) => {
                        if self.tracker.on_storage_event(&event.key, Utc::now()) {
                            self.publish();
                        }
                    }
                    None => store_open = false,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Focus service stopped");
    }
}
