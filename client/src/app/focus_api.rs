//! Focus session endpoints
//!
//! The backend wraps each payload in a named key (`{session}`, `{stats}`,
//! `{pause_state}`, `{result}`); these wrappers unwrap it.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::app::api_client::ApiClient;
use crate::domain::entities::{
    ActiveFocusResponse, CompleteSessionResult, CreateFocusRequest, FocusSession,
    FocusSessionsList, FocusStats, PauseState, StatsPeriod,
};
use crate::domain::ports::{ApiRequest, ApiTransport};
use crate::error::ApiError;

#[derive(Deserialize)]
struct SessionBody {
    session: FocusSession,
}

#[derive(Deserialize)]
struct StatsBody {
    stats: FocusStats,
}

#[derive(Deserialize)]
struct ResultBody {
    result: CompleteSessionResult,
}

#[derive(Deserialize)]
struct PauseBody {
    #[serde(default)]
    pause_state: Option<PauseState>,
}

pub struct FocusApi<T> {
    client: Arc<ApiClient<T>>,
}

impl<T> Clone for FocusApi<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<T: ApiTransport> FocusApi<T> {
    pub fn new(client: Arc<ApiClient<T>>) -> Self {
        Self { client }
    }

    pub async fn start(&self, request: &CreateFocusRequest) -> Result<FocusSession, ApiError> {
        let body: SessionBody = self.client.post("/api/focus", request).await?;
        Ok(body.session)
    }

    pub async fn active(&self) -> Result<ActiveFocusResponse, ApiError> {
        self.client.get("/api/focus/active").await
    }

    pub async fn list(&self, page: u32, page_size: u32) -> Result<FocusSessionsList, ApiError> {
        self.client
            .request(
                ApiRequest::get("/api/focus")
                    .query("page", Some(page))
                    .query("page_size", Some(page_size)),
            )
            .await
    }

    pub async fn stats(&self, period: StatsPeriod) -> Result<FocusStats, ApiError> {
        let body: StatsBody = self
            .client
            .request(
                ApiRequest::get("/api/focus")
                    .query("stats", Some("true"))
                    .query("period", Some(period.as_str())),
            )
            .await?;
        Ok(body.stats)
    }

    pub async fn complete(&self, session_id: &str) -> Result<CompleteSessionResult, ApiError> {
        let path = format!("/api/focus/{}/complete", urlencoding::encode(session_id));
        let body: ResultBody = self.client.request(ApiRequest::post(path)).await?;
        Ok(body.result)
    }

    pub async fn abandon(&self, session_id: &str) -> Result<FocusSession, ApiError> {
        let path = format!("/api/focus/{}/abandon", urlencoding::encode(session_id));
        let body: SessionBody = self.client.request(ApiRequest::post(path)).await?;
        Ok(body.session)
    }

    pub async fn pause_state(&self) -> Result<Option<PauseState>, ApiError> {
        let body: PauseBody = self.client.get("/api/focus/pause").await?;
        Ok(body.pause_state)
    }

    pub async fn pause(&self, time_remaining_seconds: u64) -> Result<Option<PauseState>, ApiError> {
        let body: PauseBody = self
            .client
            .post(
                "/api/focus/pause",
                &json!({ "time_remaining_seconds": time_remaining_seconds }),
            )
            .await?;
        Ok(body.pause_state)
    }

    pub async fn resume(&self) -> Result<FocusSession, ApiError> {
        let body: SessionBody = self.client.delete("/api/focus/pause").await?;
        Ok(body.session)
    }
}
