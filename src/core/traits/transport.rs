use std::pin::Pin;

use futures::Stream;

use crate::core::errors::TransportError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Opens a chunked response body for a POST to `endpoint`.
#[async_trait::async_trait]
pub trait StreamTransport: std::fmt::Debug + Send + Sync {
    async fn open(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ByteStream, TransportError>;
}
