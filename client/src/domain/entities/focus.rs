//! Focus session domain entities
//!
//! Pomodoro-style focus sessions owned by the backend, plus the paused
//! snapshot the client keeps locally while a timer is paused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Focus,
    Break,
    LongBreak,
}

impl std::fmt::Display for FocusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FocusMode::Focus => write!(f, "focus"),
            FocusMode::Break => write!(f, "break"),
            FocusMode::LongBreak => write!(f, "long_break"),
        }
    }
}

impl std::str::FromStr for FocusMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "focus" => Ok(FocusMode::Focus),
            "break" => Ok(FocusMode::Break),
            "long_break" | "longbreak" => Ok(FocusMode::LongBreak),
            _ => Err(format!("Unknown focus mode: {}", s)),
        }
    }
}

/// Server-side session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusStatus {
    Active,
    Paused,
    Completed,
    Abandoned,
    Expired,
}

impl std::fmt::Display for FocusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FocusStatus::Active => write!(f, "active"),
            FocusStatus::Paused => write!(f, "paused"),
            FocusStatus::Completed => write!(f, "completed"),
            FocusStatus::Abandoned => write!(f, "abandoned"),
            FocusStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A focus session as returned by `/api/focus*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: String,
    pub mode: FocusMode,
    /// Planned length of the session in seconds
    #[serde(alias = "planned_duration")]
    pub duration_seconds: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub abandoned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub status: FocusStatus,
    #[serde(default)]
    pub xp_awarded: i64,
    #[serde(default)]
    pub coins_awarded: i64,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining_seconds: Option<i64>,
}

impl FocusSession {
    pub fn is_active(&self) -> bool {
        self.status == FocusStatus::Active
    }

    /// Whole seconds left at `now`, never negative.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - self.started_at).num_seconds();
        (self.duration_seconds - elapsed).max(0) as u64
    }
}

/// Server-side pause record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseState {
    pub mode: String,
    pub time_remaining_seconds: i64,
    pub paused_at: DateTime<Utc>,
}

/// Body of `GET /api/focus/active`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActiveFocusResponse {
    #[serde(default)]
    pub session: Option<FocusSession>,
    #[serde(default)]
    pub pause_state: Option<PauseState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusStats {
    pub completed_sessions: i64,
    pub abandoned_sessions: i64,
    pub total_sessions: i64,
    pub total_focus_seconds: i64,
    pub total_xp_earned: i64,
    pub total_coins_earned: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FocusSessionsList {
    pub sessions: Vec<FocusSession>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteSessionResult {
    pub session: FocusSession,
    pub xp_awarded: i64,
    pub coins_awarded: i64,
    pub leveled_up: bool,
    #[serde(default)]
    pub new_level: Option<i64>,
}

/// Body of `POST /api/focus`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateFocusRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<FocusMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
}

/// Reporting window for focus stats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Day,
    Week,
    Month,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Day => "day",
            StatsPeriod::Week => "week",
            StatsPeriod::Month => "month",
        }
    }
}

impl std::str::FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(StatsPeriod::Day),
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            _ => Err(format!("Unknown stats period: {}", s)),
        }
    }
}

/// Local snapshot of a paused timer. Stored as camelCase JSON under
/// `focus_paused_state` and shared with every instance using the same store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedSnapshot {
    pub mode: FocusMode,
    pub time_remaining: u64,
    pub paused_at: DateTime<Utc>,
}

impl PausedSnapshot {
    pub const STORAGE_KEY: &'static str = "focus_paused_state";

    /// Snapshots older than this are discarded.
    pub const TTL_SECS: i64 = 60 * 60;

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.paused_at).num_seconds() < Self::TTL_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn session_accepts_planned_duration_alias() {
        let json = r#"{"id": "s1", "mode": "long_break", "planned_duration": 900,
            "started_at": "2026-01-01T10:00:00Z", "status": "active"}"#;
        let session: FocusSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.duration_seconds, 900);
        assert_eq!(session.mode, FocusMode::LongBreak);
        assert!(session.is_active());
        assert_eq!(session.xp_awarded, 0);
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let json = r#"{"id": "s1", "mode": "focus", "duration_seconds": 60,
            "started_at": "2026-01-01T10:00:00Z", "status": "active"}"#;
        let session: FocusSession = serde_json::from_str(json).unwrap();
        let start = session.started_at;
        assert_eq!(session.remaining_at(start + Duration::seconds(15)), 45);
        assert_eq!(session.remaining_at(start + Duration::milliseconds(15_900)), 45);
        assert_eq!(session.remaining_at(start + Duration::seconds(600)), 0);
    }

    #[test]
    fn paused_snapshot_uses_camel_case() {
        let snapshot = PausedSnapshot {
            mode: FocusMode::Break,
            time_remaining: 120,
            paused_at: "2026-01-01T10:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(r#""timeRemaining":120"#));
        assert!(json.contains(r#""pausedAt""#));
        assert!(json.contains(r#""mode":"break""#));
    }

    #[test]
    fn paused_snapshot_freshness() {
        let paused_at: DateTime<Utc> = "2026-01-01T10:00:00Z".parse().unwrap();
        let snapshot = PausedSnapshot {
            mode: FocusMode::Focus,
            time_remaining: 300,
            paused_at,
        };
        assert!(snapshot.is_fresh(paused_at + Duration::minutes(59)));
        assert!(!snapshot.is_fresh(paused_at + Duration::minutes(60)));
    }

    #[test]
    fn create_request_skips_unset_fields() {
        let req = CreateFocusRequest {
            mode: Some(FocusMode::Focus),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"{"mode":"focus"}"#);
    }
}
