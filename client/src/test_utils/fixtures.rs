//! Test fixtures
//!
//! Factory functions for backend payloads used across tests.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::domain::entities::{FocusMode, FocusSession, FocusStatus};

pub fn test_focus_session(started_at: DateTime<Utc>, duration_seconds: i64) -> FocusSession {
    FocusSession {
        id: "session-1".to_string(),
        mode: FocusMode::Focus,
        duration_seconds,
        started_at,
        completed_at: None,
        abandoned_at: None,
        expires_at: Some(started_at + Duration::seconds(duration_seconds)),
        status: FocusStatus::Active,
        xp_awarded: 0,
        coins_awarded: 0,
        task_title: None,
        time_remaining_seconds: None,
    }
}

pub fn test_focus_session_json(started_at: DateTime<Utc>, duration_seconds: i64) -> Value {
    json!({
        "id": "session-1",
        "mode": "focus",
        "duration_seconds": duration_seconds,
        "started_at": started_at.to_rfc3339(),
        "status": "active"
    })
}

/// `GET /api/focus/active` body with an active session
pub fn active_focus_body(started_at: DateTime<Utc>, duration_seconds: i64) -> Value {
    json!({
        "session": test_focus_session_json(started_at, duration_seconds),
        "pause_state": null
    })
}

pub fn idle_focus_body() -> Value {
    json!({"session": null, "pause_state": null})
}

pub fn test_user_json() -> Value {
    json!({
        "id": "user-1",
        "email": "ada@example.com",
        "name": "Ada",
        "role": "user",
        "tosAccepted": true
    })
}

/// `GET /api/settings` body from `(key, value)` pairs
pub fn settings_body(entries: &[(&str, Value)]) -> Value {
    let settings: Vec<Value> = entries
        .iter()
        .map(|(key, value)| json!({"key": key, "value": value}))
        .collect();
    json!({ "settings": settings })
}
