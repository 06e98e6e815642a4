//! Auth service
//!
//! Session lookup, sign-in URLs, sign-out and session-expiry teardown.
//! Talks to the transport directly rather than through `ApiClient` so a 401
//! here never re-enters the expiry handler.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::app::api_client::{error_from_response, SessionExpiryHandler};
use crate::domain::entities::{AuthProvider, AuthUser, SessionResponse, SessionTermination};
use crate::domain::ports::{ApiRequest, ApiTransport, KeyValueStore};
use crate::error::ApiError;

/// Substrings marking store keys that belong to the session.
const SESSION_KEY_MARKERS: &[&str] = &["session", "auth", "token"];

pub struct AuthService<T> {
    transport: T,
    store: Arc<dyn KeyValueStore>,
    base_url: String,
}

impl<T: ApiTransport> AuthService<T> {
    pub fn new(transport: T, store: Arc<dyn KeyValueStore>, base_url: &str) -> Self {
        Self {
            transport,
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Current user, or `None` when signed out or the backend is
    /// unreachable.
    pub async fn get_session(&self) -> Option<AuthUser> {
        let response = match self.transport.send(ApiRequest::get("/auth/session")).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed");
                return None;
            }
        };

        if !response.is_success() {
            tracing::debug!(status = response.status, "No active session");
            return None;
        }

        match response.json::<SessionResponse>() {
            Ok(body) => body.user.map(AuthUser::from),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed session response");
                None
            }
        }
    }

    /// URL that starts the OAuth flow for `provider`.
    pub fn sign_in_url(&self, provider: AuthProvider, callback_url: Option<&str>) -> String {
        let url = format!("{}/auth/signin/{}", self.base_url, provider);
        match callback_url {
            Some(callback) => format!("{}?callbackUrl={}", url, urlencoding::encode(callback)),
            None => url,
        }
    }

    pub async fn sign_out(&self) -> Result<(), ApiError> {
        let response = self.transport.send(ApiRequest::post("/auth/signout")).await?;
        if response.is_success() {
            tracing::info!("Signed out");
            Ok(())
        } else {
            Err(error_from_response(&response))
        }
    }

    /// Tear down local session state: drop session-related keys, sign out
    /// on the server (best effort), then leave a termination marker so other
    /// instances sharing the store notice.
    pub async fn handle_session_expired(&self) {
        tracing::warn!("Session expired, clearing local session data");

        match self.store.keys() {
            Ok(keys) => {
                for key in keys
                    .iter()
                    .filter(|k| SESSION_KEY_MARKERS.iter().any(|m| k.contains(m)))
                {
                    if let Err(e) = self.store.remove(key) {
                        tracing::error!(key = %key, error = %e, "Failed to clear stored key");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to list stored keys"),
        }

        if let Err(e) = self.sign_out().await {
            tracing::error!(error = %e, "Sign-out after expiry failed");
        }

        let marker = SessionTermination::expired(Utc::now());
        let written = serde_json::to_string(&marker)
            .map_err(crate::error::StorageError::from)
            .and_then(|json| self.store.set(SessionTermination::STORAGE_KEY, &json));
        if let Err(e) = written {
            tracing::error!(error = %e, "Failed to broadcast session termination");
        }
    }

    /// Termination marker left by the last expiry, if any.
    pub fn last_termination(&self) -> Option<SessionTermination> {
        self.store
            .get(SessionTermination::STORAGE_KEY)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }
}

#[async_trait]
impl<T: ApiTransport> SessionExpiryHandler for AuthService<T> {
    async fn on_session_expired(&self) {
        self.handle_session_expired().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalStore;
    use crate::domain::ports::{ApiResponse, Method};
    use crate::test_utils::{test_user_json, ScriptedTransport};
    use serde_json::json;

    fn service(transport: ScriptedTransport) -> (AuthService<ScriptedTransport>, Arc<LocalStore>) {
        let store = Arc::new(LocalStore::in_memory());
        let service = AuthService::new(transport, store.clone(), "https://api.ecent.online/");
        (service, store)
    }

    #[tokio::test]
    async fn session_user_is_normalized() {
        let transport = ScriptedTransport::new();
        transport.push_response(ApiResponse::json_body(200, &json!({"user": test_user_json()})));
        let (auth, _) = service(transport);

        let user = auth.get_session().await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(user.tos_accepted);
        assert!(!user.approved);
        assert!(user.entitlements.is_empty());
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn failures_mean_no_session() {
        let transport = ScriptedTransport::new();
        transport.push_response(ApiResponse::json_body(401, &json!({"error": "unauthorized"})));
        transport.push_error(ApiError::Network("offline".into()));
        transport.push_response(ApiResponse::json_body(200, &json!({"user": null})));
        let (auth, _) = service(transport);

        assert!(auth.get_session().await.is_none());
        assert!(auth.get_session().await.is_none());
        assert!(auth.get_session().await.is_none());
    }

    #[test]
    fn builds_sign_in_urls() {
        let (auth, _) = service(ScriptedTransport::new());
        assert_eq!(
            auth.sign_in_url(AuthProvider::Google, None),
            "https://api.ecent.online/auth/signin/google"
        );
        assert_eq!(
            auth.sign_in_url(AuthProvider::Azure, Some("https://ignition.ecent.online/today")),
            "https://api.ecent.online/auth/signin/azure?callbackUrl=https%3A%2F%2Fignition.ecent.online%2Ftoday"
        );
    }

    #[tokio::test]
    async fn expiry_clears_session_keys_and_leaves_marker() {
        let transport = ScriptedTransport::new();
        transport.route(Method::Post, "/auth/signout", ApiResponse::new(204, Vec::new()));
        let (auth, store) = service(transport);
        store.set("session_cache", "x").unwrap();
        store.set("oauth_state", "y").unwrap();
        store.set("refresh_token", "z").unwrap();
        store.set("theme", "dark").unwrap();

        auth.handle_session_expired().await;

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec![SessionTermination::STORAGE_KEY.to_string(), "theme".to_string()]);
        assert_eq!(auth.last_termination().unwrap().reason, "session_expired");
        assert_eq!(auth.transport.requests_to(Method::Post, "/auth/signout"), 1);
    }

    #[tokio::test]
    async fn expiry_survives_sign_out_failure() {
        let transport = ScriptedTransport::new();
        transport.set_offline(true);
        let (auth, store) = service(transport);
        store.set("auth_user", "x").unwrap();

        auth.handle_session_expired().await;

        assert!(store.get("auth_user").unwrap().is_none());
        assert!(auth.last_termination().is_some());
    }
}
