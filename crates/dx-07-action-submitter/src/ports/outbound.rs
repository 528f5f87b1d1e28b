//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Submission goes through `shared_types::LedgerClient`.

use crate::error::SignerError;
use async_trait::async_trait;
use shared_types::Address;

/// Account key custody. Private keys never enter the core.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, actor: Address, message: &[u8]) -> Result<Vec<u8>, SignerError>;
}
