//! Settings push channel port
//!
//! A live connection that announces settings changes made on other devices.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::entities::SettingsMap;
use crate::error::SyncError;

/// Message pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEvent {
    /// Partial settings to merge into the local copy
    Updated(SettingsMap),
    /// Any other message type; carried for logging only
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct UpdatedPayload {
    #[serde(default)]
    settings: SettingsMap,
}

impl SettingsEvent {
    /// Parse `{"type": "...", "payload": {...}}`.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| SyncError::InvalidMessage(e.to_string()))?;

        if envelope.kind != "settings_updated" {
            return Ok(SettingsEvent::Other(envelope.kind));
        }

        let payload: UpdatedPayload = serde_json::from_value(envelope.payload)
            .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
        Ok(SettingsEvent::Updated(payload.settings))
    }
}

/// Opens push connections. The returned receiver yields events until the
/// connection ends; the channel closing means the socket closed.
#[async_trait]
pub trait SettingsFeed: Send + Sync {
    async fn connect(&self) -> Result<mpsc::Receiver<Result<SettingsEvent, SyncError>>, SyncError>;
}
