//! Settings endpoints

use std::sync::Arc;

use serde_json::Value;

use crate::app::api_client::{ApiClient, MutationOutcome};
use crate::domain::entities::settings::validate_key;
use crate::domain::entities::{SettingEntry, SettingsMap, SettingsResponse, UpdateSettingRequest};
use crate::domain::ports::{ApiRequest, ApiTransport};
use crate::error::ApiError;

pub struct SettingsApi<T> {
    client: Arc<ApiClient<T>>,
}

impl<T> Clone for SettingsApi<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<T: ApiTransport> SettingsApi<T> {
    pub fn new(client: Arc<ApiClient<T>>) -> Self {
        Self { client }
    }

    /// All settings as a map. Later duplicates of a key win.
    pub async fn list(&self) -> Result<SettingsMap, ApiError> {
        let body: SettingsResponse = self.client.get("/api/settings").await?;
        Ok(body.into_map())
    }

    /// One setting; `None` when the server has no value for it.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, ApiError> {
        validate_key(key).map_err(ApiError::InvalidRequest)?;
        let path = format!("/api/settings/{}", urlencoding::encode(key));
        match self.client.get::<SettingEntry>(&path).await {
            Ok(entry) => Ok(Some(entry.value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn update(&self, key: &str, value: Value) -> Result<(), ApiError> {
        let request = UpdateSettingRequest::new(key, value).map_err(ApiError::InvalidRequest)?;
        let _: Value = self.client.post("/api/settings", &request).await?;
        Ok(())
    }

    /// Like [`update`](Self::update), but queued for later replay when the
    /// server is unreachable.
    pub async fn update_or_queue(
        &self,
        key: &str,
        value: Value,
    ) -> Result<MutationOutcome<Value>, ApiError> {
        let request = UpdateSettingRequest::new(key, value).map_err(ApiError::InvalidRequest)?;
        self.client
            .mutate(ApiRequest::post("/api/settings").json(&request)?)
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<(), ApiError> {
        validate_key(key).map_err(ApiError::InvalidRequest)?;
        let path = format!("/api/settings/{}", urlencoding::encode(key));
        let _: Value = self.client.delete(&path).await?;
        Ok(())
    }
}
