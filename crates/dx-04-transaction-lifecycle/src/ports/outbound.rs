//! Driven Ports (SPI - Outbound Dependencies)

use crate::error::ContentError;
use async_trait::async_trait;

/// Content-addressed storage for listing payloads.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `content` and return its reference.
    async fn publish(&self, content: &[u8]) -> Result<String, ContentError>;

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ContentError>;
}
