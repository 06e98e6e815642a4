//! reqwest implementation of the upstream pool

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header;
use reqwest::{redirect, Client};

use crate::domain::entities::{strip_hop_by_hop, ForwardRequest, ForwardResponse};
use crate::domain::ports::Upstream;
use crate::error::UpstreamError;

/// Backend instances reached over HTTP
pub struct HttpUpstream {
    http: Client,
    instances: Vec<String>,
}

impl HttpUpstream {
    /// Redirects are passed back to the caller rather than followed.
    pub fn new(instances: Vec<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            instances: instances
                .into_iter()
                .map(|url| url.trim_end_matches('/').to_string())
                .collect(),
        })
    }

    fn url_for(&self, instance: usize, path_and_query: &str) -> Result<String, UpstreamError> {
        let base = self
            .instances
            .get(instance)
            .ok_or(UpstreamError::UnknownInstance(instance))?;
        Ok(format!("{}{}", base, path_and_query))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn instance_count(&self) -> usize {
        self.instances.len()
    }

    async fn forward(
        &self,
        instance: usize,
        request: ForwardRequest,
    ) -> Result<ForwardResponse, UpstreamError> {
        let url = self.url_for(instance, &request.path_and_query)?;

        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let response = self
            .http
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);
        let body = response.bytes().await?;

        Ok(ForwardResponse {
            status,
            headers,
            body,
        })
    }
}
