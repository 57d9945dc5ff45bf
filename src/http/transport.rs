use futures::StreamExt;
use reqwest::header::ACCEPT;

use crate::{
    core::{
        errors::TransportError,
        traits::transport::{ByteStream, StreamTransport},
    },
    http::join_url,
};

/// POSTs JSON to the execution backend and exposes the raw event-stream body.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl StreamTransport for ReqwestTransport {
    #[tracing::instrument(skip(self, body))]
    async fn open(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ByteStream, TransportError> {
        let url = join_url(&self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Stream request to {} rejected with {}", url, status);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("Stream opened: {}", url);
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Network(e.to_string()))
        });
        Ok(Box::pin(stream))
    }
}
