use std::sync::Mutex;
use std::time::Duration;

use crate::core::{
    errors::TransportError,
    traits::transport::{ByteStream, StreamTransport},
};

/// Replays canned body chunks, one per poll, optionally after a delay.
#[derive(Debug)]
pub struct TransportStub {
    result: Result<Vec<String>, TransportError>,
    delay: Duration,
    requests: Mutex<Vec<(String, serde_json::Value)>>,
}

impl TransportStub {
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            result: Ok(chunks),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: TransportError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn last_request(&self) -> Option<(String, serde_json::Value)> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait::async_trait]
impl StreamTransport for TransportStub {
    #[tracing::instrument(skip(self))]
    async fn open(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ByteStream, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((endpoint.to_string(), body.clone()));
        tokio::time::sleep(self.delay).await;

        let chunks = self.result.clone()?;
        let chunks: Vec<Result<Vec<u8>, TransportError>> =
            chunks.into_iter().map(|c| Ok(c.into_bytes())).collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
