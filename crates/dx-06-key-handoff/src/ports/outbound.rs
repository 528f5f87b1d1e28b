//! Driven Ports (SPI - Outbound Dependencies)

use crate::domain::Ciphertext;
use crate::error::KeyServiceError;
use async_trait::async_trait;
use shared_types::Address;

/// External re-encryption service.
///
/// Takes a key sealed for `from` and returns the same key sealed for `to`.
#[async_trait]
pub trait KeyService: Send + Sync {
    async fn reencrypt(
        &self,
        ciphertext: &Ciphertext,
        from: Address,
        to: Address,
    ) -> Result<Ciphertext, KeyServiceError>;
}
