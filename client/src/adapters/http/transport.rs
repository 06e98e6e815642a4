//! reqwest implementation of the transport port

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, ORIGIN};

use crate::domain::ports::{ApiRequest, ApiResponse, ApiTransport, Method};
use crate::error::ApiError;

/// HTTP transport talking to the Ignition backend
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    origin: Option<HeaderValue>,
    default_timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport. The session cookie, when present, is sent with
    /// every request as `Cookie: session=<value>`.
    pub fn new(
        base_url: &str,
        session: Option<&str>,
        default_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(session) = session {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&format!("session={}", session))
                    .map_err(|_| ApiError::InvalidRequest("Invalid session cookie".into()))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            origin: None,
            default_timeout,
        })
    }

    /// Send `Origin` on mutations; the backend's CSRF check expects it.
    pub fn with_origin(mut self, origin: &str) -> Result<Self, ApiError> {
        let value = HeaderValue::from_str(origin)
            .map_err(|_| ApiError::InvalidRequest(format!("Invalid origin: {}", origin)))?;
        self.origin = Some(value);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        let lower = path.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(&request.path);
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &url)
            .timeout(request.timeout.unwrap_or(self.default_timeout));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if request.method.is_mutation() {
            if let Some(origin) = &self.origin {
                builder = builder.header(ORIGIN, origin.clone());
            }
        }

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidRequest(format!("Invalid header: {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::InvalidRequest(format!("Invalid header value for {}", name)))?;
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %url, "Sending request");
        let response = builder.send().await.map_err(map_error)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_error)?.to_vec();

        Ok(ApiResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
