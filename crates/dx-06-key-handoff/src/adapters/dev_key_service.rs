//! In-process key service for development and tests.
//!
//! Models custody as `owner address ‖ payload`: re-encryption checks that
//! the input is sealed for `from` and reseals the payload for `to`.

use crate::domain::Ciphertext;
use crate::error::KeyServiceError;
use crate::ports::outbound::KeyService;
use async_trait::async_trait;
use shared_types::Address;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

const OWNER_LEN: usize = 20;

#[derive(Debug, Default)]
pub struct DevKeyService {
    deny: AtomicBool,
    unavailable: AtomicU32,
}

impl DevKeyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal `payload` for `owner`.
    pub fn seal(owner: Address, payload: &[u8]) -> Ciphertext {
        let mut bytes = Vec::with_capacity(OWNER_LEN + payload.len());
        bytes.extend_from_slice(owner.as_bytes());
        bytes.extend_from_slice(payload);
        Ciphertext::new(bytes)
    }

    /// Owner a ciphertext is sealed for.
    pub fn owner_of(ciphertext: &Ciphertext) -> Option<Address> {
        let bytes = ciphertext.as_bytes();
        if bytes.len() <= OWNER_LEN {
            return None;
        }
        let mut owner = [0u8; OWNER_LEN];
        owner.copy_from_slice(&bytes[..OWNER_LEN]);
        Some(Address(owner))
    }

    /// Refuse every request until toggled back.
    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Report `Unavailable` for the next `n` requests.
    pub fn fail_next(&self, n: u32) {
        self.unavailable.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyService for DevKeyService {
    async fn reencrypt(
        &self,
        ciphertext: &Ciphertext,
        from: Address,
        to: Address,
    ) -> Result<Ciphertext, KeyServiceError> {
        let pending = self.unavailable.load(Ordering::SeqCst);
        if pending > 0 {
            self.unavailable.store(pending - 1, Ordering::SeqCst);
            return Err(KeyServiceError::Unavailable("dev key service offline".into()));
        }
        if self.deny.load(Ordering::SeqCst) {
            return Err(KeyServiceError::Denied("dev key service denies all".into()));
        }

        let owner = Self::owner_of(ciphertext)
            .ok_or_else(|| KeyServiceError::Malformed(format!("{} bytes", ciphertext.len())))?;
        if owner != from {
            return Err(KeyServiceError::Denied(format!(
                "ciphertext sealed for {}, not {}",
                owner, from
            )));
        }

        debug!(%from, %to, "Resealing key");
        Ok(Self::seal(to, &ciphertext.as_bytes()[OWNER_LEN..]))
    }
}
