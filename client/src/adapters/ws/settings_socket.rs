//! WebSocket implementation of the settings push channel
//!
//! Connects to `/api/settings/ws` and forwards parsed messages to the sync
//! service until the socket closes.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use crate::domain::ports::{SettingsEvent, SettingsFeed};
use crate::error::SyncError;

const CHANNEL_CAPACITY: usize = 32;

pub struct WebSocketSettingsFeed {
    url: String,
    session: Option<String>,
}

impl WebSocketSettingsFeed {
    pub fn new(url: impl Into<String>, session: Option<String>) -> Self {
        Self {
            url: url.into(),
            session,
        }
    }

    /// Derive the socket URL from the API base URL: `https` becomes `wss`,
    /// `http` becomes `ws`.
    pub fn from_api_url(api_url: &str, session: Option<String>) -> Self {
        let base = api_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        Self::new(format!("{}/api/settings/ws", ws_base), session)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SettingsFeed for WebSocketSettingsFeed {
    async fn connect(
        &self,
    ) -> Result<mpsc::Receiver<Result<SettingsEvent, SyncError>>, SyncError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SyncError::Connect(e.to_string()))?;

        if let Some(session) = &self.session {
            let cookie = HeaderValue::from_str(&format!("session={}", session))
                .map_err(|e| SyncError::Connect(e.to_string()))?;
            request.headers_mut().insert(COOKIE, cookie);
        }

        let (mut socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SyncError::Connect(e.to_string()))?;
        tracing::info!(url = %self.url, "Settings WebSocket connected");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(message) = socket.next().await {
                let (forwarded, fatal) = match message {
                    Ok(Message::Text(text)) => (SettingsEvent::parse(&text), false),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => (Err(SyncError::Connect(e.to_string())), true),
                };
                if tx.send(forwarded).await.is_err() || fatal {
                    break;
                }
            }
            tracing::info!("Settings WebSocket disconnected");
        });

        Ok(rx)
    }
}
