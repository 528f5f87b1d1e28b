//! Deterministic signer for development and tests.
//!
//! The signature is `keccak256(actor ‖ message)`. It proves nothing and is
//! only accepted by in-process ledgers.

use crate::error::SignerError;
use crate::ports::Signer;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha3::{Digest, Keccak256};
use shared_types::Address;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DevSigner {
    /// When set, only these accounts can sign.
    accounts: Option<HashSet<Address>>,
    locked: RwLock<HashSet<Address>>,
}

impl DevSigner {
    /// Signs for any account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs only for `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Address>) -> Self {
        Self {
            accounts: Some(accounts.into_iter().collect()),
            locked: RwLock::new(HashSet::new()),
        }
    }

    /// Refuse to sign for `actor` until unlocked.
    pub fn lock(&self, actor: Address) {
        self.locked.write().insert(actor);
    }

    pub fn unlock(&self, actor: &Address) {
        self.locked.write().remove(actor);
    }
}

#[async_trait]
impl Signer for DevSigner {
    async fn sign(&self, actor: Address, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        if let Some(accounts) = &self.accounts {
            if !accounts.contains(&actor) {
                return Err(SignerError(format!("no key for {}", actor)));
            }
        }
        if self.locked.read().contains(&actor) {
            return Err(SignerError(format!("account {} is locked", actor)));
        }

        let mut hasher = Keccak256::new();
        hasher.update(actor.as_bytes());
        hasher.update(message);
        Ok(hasher.finalize().to_vec())
    }
}
