//! Settings sync
//!
//! Keeps a local copy of the user's settings in step with the server.
//! Push is preferred: connect the settings socket, fetch once on connect,
//! then merge `settings_updated` messages. If the socket cannot be opened or
//! later closes or fails, fall back to polling `/api/settings` every 30
//! seconds. Polling never hands back to push.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::app::settings_api::SettingsApi;
use crate::domain::entities::{Accessibility, ServerSettings, SettingsMap, Theme};
use crate::domain::ports::{ApiTransport, SettingsEvent, SettingsFeed};
use crate::error::{ApiError, SyncError};

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
    #[default]
    Connecting,
    Push,
    Polling,
    Stopped,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Connecting => write!(f, "connecting"),
            SyncMode::Push => write!(f, "push"),
            SyncMode::Polling => write!(f, "polling"),
            SyncMode::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSnapshot {
    pub settings: SettingsMap,
    pub mode: SyncMode,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            settings: SettingsMap::new(),
            mode: SyncMode::default(),
            is_loading: true,
            last_error: None,
        }
    }
}

impl SettingsSnapshot {
    pub fn typed(&self) -> ServerSettings {
        ServerSettings::from_map(&self.settings)
    }
}

pub struct SettingsSync<T> {
    api: SettingsApi<T>,
    feed: Option<Arc<dyn SettingsFeed>>,
    state: watch::Sender<SettingsSnapshot>,
    poll_interval: Duration,
}

impl<T: ApiTransport> SettingsSync<T> {
    /// Without a feed the service polls from the start.
    pub fn new(api: SettingsApi<T>, feed: Option<Arc<dyn SettingsFeed>>) -> Self {
        let (state, _) = watch::channel(SettingsSnapshot::default());
        Self {
            api,
            feed,
            state,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.state.borrow().clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.borrow().settings.get(key).cloned()
    }

    pub fn typed(&self) -> ServerSettings {
        self.state.borrow().typed()
    }

    /// Replace the local copy with the server's.
    pub async fn fetch(&self) -> Result<(), ApiError> {
        match self.api.list().await {
            Ok(settings) => {
                self.state.send_modify(|s| {
                    s.settings = settings;
                    s.is_loading = false;
                    s.last_error = None;
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch settings");
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Write a setting; the local copy changes once the server accepts it.
    pub async fn update(&self, key: &str, value: Value) -> Result<(), ApiError> {
        match self.api.update(key, value.clone()).await {
            Ok(()) => {
                self.state.send_modify(|s| {
                    s.settings.insert(key.to_string(), value);
                    s.last_error = None;
                });
                Ok(())
            }
            Err(e) => {
                self.state
                    .send_modify(|s| s.last_error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), ApiError> {
        self.api.delete(key).await?;
        self.state.send_modify(|s| {
            s.settings.remove(key);
        });
        Ok(())
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<(), ApiError> {
        let value = serde_json::to_value(theme).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.update(ServerSettings::THEME, value).await
    }

    pub async fn set_accessibility(&self, accessibility: &Accessibility) -> Result<(), ApiError> {
        let value = serde_json::to_value(accessibility)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.update(ServerSettings::ACCESSIBILITY, value).await
    }

    fn set_mode(&self, mode: SyncMode) {
        tracing::info!(mode = %mode, "Settings sync mode");
        self.state.send_modify(|s| s.mode = mode);
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if let Some(feed) = &self.feed {
            match feed.connect().await {
                Ok(events) => {
                    if self.run_push(events, &mut shutdown).await {
                        self.set_mode(SyncMode::Stopped);
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Settings socket unavailable, polling instead");
                    self.state
                        .send_modify(|s| s.last_error = Some(e.to_string()));
                }
            }
        }

        self.run_polling(&mut shutdown).await;
        self.set_mode(SyncMode::Stopped);
    }

    /// Returns true when stopped by shutdown, false when the socket ended.
    async fn run_push(
        &self,
        mut events: tokio::sync::mpsc::Receiver<Result<SettingsEvent, SyncError>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        self.set_mode(SyncMode::Push);
        let _ = self.fetch().await;

        loop {
            tokio::select! {
                message = events.recv() => match message {
                    Some(Ok(SettingsEvent::Updated(partial))) => {
                        tracing::debug!(keys = partial.len(), "Settings pushed");
                        self.state.send_modify(|s| s.settings.extend(partial));
                    }
                    Some(Ok(SettingsEvent::Other(kind))) => {
                        tracing::debug!(kind = %kind, "Ignoring settings message");
                    }
                    Some(Err(SyncError::InvalidMessage(e))) => {
                        tracing::warn!(error = %e, "Failed to parse settings message");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Settings socket error, falling back to polling");
                        return false;
                    }
                    None => {
                        tracing::info!("Settings socket closed, falling back to polling");
                        return false;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return true;
                    }
                }
            }
        }
    }

    async fn run_polling(&self, shutdown: &mut watch::Receiver<bool>) {
        self.set_mode(SyncMode::Polling);

        // The first tick fires immediately
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let _ = self.fetch().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
