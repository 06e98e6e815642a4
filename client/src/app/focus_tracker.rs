//! Focus countdown state machine
//!
//! Pure state: no timers and no network. The caller feeds in server
//! snapshots, one-second ticks and store change notifications, always with
//! an explicit `now`.
//!
//! ```text
//! Idle ──reconcile(active)──> Running ──pause──> Paused
//!  ^                             │                  │
//!  └────reconcile(none)──────────┘<──clear/expire───┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entities::{FocusMode, FocusSession, PausedSnapshot};
use crate::domain::ports::KeyValueStore;
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub enum FocusState {
    Idle,
    Running { session: FocusSession, remaining: u64 },
    Paused(PausedSnapshot),
}

/// Result of a one-second tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing is counting down
    Idle,
    Remaining(u64),
    /// Countdown reached zero; the server should be asked again
    NeedsRefresh,
}

/// What observers see
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocusView {
    pub session: Option<FocusSession>,
    pub paused: Option<PausedSnapshot>,
    pub time_remaining: u64,
    pub is_loading: bool,
}

impl FocusView {
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(FocusSession::is_active)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    pub fn mode(&self) -> Option<FocusMode> {
        self.session
            .as_ref()
            .map(|s| s.mode)
            .or_else(|| self.paused.as_ref().map(|p| p.mode))
    }
}

pub struct FocusTracker {
    store: Arc<dyn KeyValueStore>,
    state: FocusState,
    loaded: bool,
}

impl FocusTracker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: FocusState::Idle,
            loaded: false,
        }
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, FocusState::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, FocusState::Paused(_))
    }

    pub fn mode(&self) -> Option<FocusMode> {
        match &self.state {
            FocusState::Idle => None,
            FocusState::Running { session, .. } => Some(session.mode),
            FocusState::Paused(snapshot) => Some(snapshot.mode),
        }
    }

    pub fn time_remaining(&self) -> u64 {
        match &self.state {
            FocusState::Idle => 0,
            FocusState::Running { remaining, .. } => *remaining,
            FocusState::Paused(snapshot) => snapshot.time_remaining,
        }
    }

    pub fn view(&self) -> FocusView {
        let (session, paused) = match &self.state {
            FocusState::Idle => (None, None),
            FocusState::Running { session, .. } => (Some(session.clone()), None),
            FocusState::Paused(snapshot) => (None, Some(snapshot.clone())),
        };
        FocusView {
            session,
            paused,
            time_remaining: self.time_remaining(),
            is_loading: !self.loaded,
        }
    }

    /// Apply the server's view of the active session. An active session
    /// wins over any local pause; otherwise a fresh paused snapshot is
    /// restored.
    pub fn reconcile(&mut self, server_session: Option<FocusSession>, now: DateTime<Utc>) {
        self.loaded = true;
        match server_session.filter(FocusSession::is_active) {
            Some(session) => {
                let remaining = session.remaining_at(now);
                self.state = FocusState::Running { session, remaining };
            }
            None => {
                self.state = FocusState::Idle;
                self.check_paused_state(now);
            }
        }
    }

    /// First load finished without a server answer.
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    pub fn tick(&mut self) -> Tick {
        match &mut self.state {
            FocusState::Running { remaining, .. } => {
                if *remaining <= 1 {
                    *remaining = 0;
                    Tick::NeedsRefresh
                } else {
                    *remaining -= 1;
                    Tick::Remaining(*remaining)
                }
            }
            _ => Tick::Idle,
        }
    }

    /// Pause a running countdown and persist the snapshot for other
    /// instances. Returns `None` when nothing was running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<Option<PausedSnapshot>, StorageError> {
        let FocusState::Running { session, remaining } = &self.state else {
            return Ok(None);
        };

        let snapshot = PausedSnapshot {
            mode: session.mode,
            time_remaining: *remaining,
            paused_at: now,
        };
        self.store.set(
            PausedSnapshot::STORAGE_KEY,
            &serde_json::to_string(&snapshot)?,
        )?;
        self.state = FocusState::Paused(snapshot.clone());
        Ok(Some(snapshot))
    }

    pub fn clear_paused_state(&mut self) -> Result<(), StorageError> {
        self.store.remove(PausedSnapshot::STORAGE_KEY)?;
        if self.is_paused() {
            self.state = FocusState::Idle;
        }
        Ok(())
    }

    /// React to a store change made elsewhere. Returns true when the key
    /// was the paused snapshot.
    pub fn on_storage_event(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if key != PausedSnapshot::STORAGE_KEY {
            return false;
        }
        self.check_paused_state(now);
        true
    }

    /// Adopt a fresh stored snapshot, or drop a stale paused state.
    fn check_paused_state(&mut self, now: DateTime<Utc>) -> bool {
        match self.load_snapshot(now) {
            Some(snapshot) => {
                self.state = FocusState::Paused(snapshot);
                true
            }
            None => {
                if self.is_paused() {
                    self.state = FocusState::Idle;
                }
                false
            }
        }
    }

    /// Expired or unreadable snapshots are removed from the store.
    fn load_snapshot(&self, now: DateTime<Utc>) -> Option<PausedSnapshot> {
        let raw = match self.store.get(PausedSnapshot::STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read paused focus state");
                return None;
            }
        };

        match serde_json::from_str::<PausedSnapshot>(&raw) {
            Ok(snapshot) if snapshot.is_fresh(now) => Some(snapshot),
            Ok(_) => {
                tracing::debug!("Paused focus state expired");
                self.discard_snapshot();
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt paused focus state");
                self.discard_snapshot();
                None
            }
        }
    }

    fn discard_snapshot(&self) {
        if let Err(e) = self.store.remove(PausedSnapshot::STORAGE_KEY) {
            tracing::warn!(error = %e, "Failed to remove paused focus state");
        }
    }
}
