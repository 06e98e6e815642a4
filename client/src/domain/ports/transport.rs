//! HTTP transport port
//!
//! A transport sends one request and returns the raw response. Non-2xx
//! statuses are ordinary responses; only failures to reach the server are
//! errors.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// HTTP methods used by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request. `path` is relative to the API base URL unless it is
/// already absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Add a query parameter; `None` values are skipped.
    pub fn query<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.query.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value =
            serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Path component without scheme, host or query string.
    pub fn pathname(&self) -> &str {
        let path = match self.path.split_once("://") {
            Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/"),
            None => self.path.as_str(),
        };
        path.split(|c: char| c == '?' || c == '#').next().unwrap_or(path)
    }

    /// Stable cache key: method, pathname and sorted query parameters.
    pub fn cache_key(&self) -> String {
        let mut query = self.query.clone();
        query.sort();
        let query = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        if query.is_empty() {
            format!("{} {}", self.method, self.pathname())
        } else {
            format!("{} {}?{}", self.method, self.pathname(), query)
        }
    }
}

/// Raw response. Header names are lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_status_text(mut self, text: &str) -> Self {
        self.status_text = text.to_string();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }
}

/// Sends requests to the backend
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[async_trait]
impl<T: ApiTransport + ?Sized> ApiTransport for std::sync::Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        (**self).send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pathname_strips_origin_and_query() {
        assert_eq!(ApiRequest::get("/api/focus?page=1").pathname(), "/api/focus");
        assert_eq!(
            ApiRequest::get("https://api.ecent.online/api/settings#x").pathname(),
            "/api/settings"
        );
        assert_eq!(ApiRequest::get("https://api.ecent.online").pathname(), "/");
    }

    #[test]
    fn cache_key_sorts_query() {
        let a = ApiRequest::get("/api/focus")
            .query("page_size", Some(20))
            .query("page", Some(1));
        let b = ApiRequest::get("/api/focus")
            .query("page", Some(1))
            .query("page_size", Some(20));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "GET /api/focus?page=1&page_size=20");
    }

    #[test]
    fn query_skips_none() {
        let req = ApiRequest::get("/api/focus").query::<i32>("page", None);
        assert!(req.query.is_empty());
        assert_eq!(req.cache_key(), "GET /api/focus");
    }

    #[test]
    fn response_headers_are_case_insensitive() {
        let resp = ApiResponse::new(200, "ok").with_header("X-Cache-Version", "7");
        assert_eq!(resp.header("x-cache-version"), Some("7"));
        assert_eq!(resp.header("X-CACHE-VERSION"), Some("7"));
        assert!(resp.is_success());
        assert!(!ApiResponse::new(404, "").is_success());
    }

    #[test]
    fn mutation_methods() {
        assert!(!Method::Get.is_mutation());
        assert!(Method::Post.is_mutation());
        assert!(Method::Delete.is_mutation());
    }
}
