//! HTTP Transport
//!
//! Posts the request as JSON to `{base_url}/api/chat` and streams the response
//! body. The body is plain text of arbitrary chunking; end of body is the end
//! of the reply.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use super::traits::{ChatTransport, ChunkStream, TransportError};
use crate::config::ChatConfig;
use crate::messages::ChatRequest;

/// Chat backend reached over HTTP
#[derive(Clone, Debug)]
pub struct HttpTransport {
    /// Full endpoint URL
    endpoint: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the given endpoint URL
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    /// Create from `ChatConfig`
    pub fn from_config(config: &ChatConfig) -> anyhow::Result<Self> {
        Self::new(config.endpoint_url(), config.connect_timeout)
    }

    /// The endpoint URL requests go to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn send(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        let pending = self.http_client.post(&self.endpoint).json(request).send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = pending => result.map_err(|e| TransportError::Request(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Err(TransportError::StreamUnavailable(
                "backend answered 204 No Content".to_string(),
            ));
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            status = status.as_u16(),
            "Response stream opened"
        );

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Stream(e.to_string())));

        Ok(stream.boxed())
    }
}
