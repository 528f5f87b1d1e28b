//! In-memory content store. References are the hex Keccak-256 of the content.

use crate::error::ContentError;
use crate::ports::outbound::ContentStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    items: RwLock<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference `publish` would return for `content`.
    pub fn reference_of(content: &[u8]) -> String {
        hex::encode(Keccak256::digest(content))
    }

    /// Fail every call with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn check_online(&self) -> Result<(), ContentError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ContentError::Unavailable("content store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn publish(&self, content: &[u8]) -> Result<String, ContentError> {
        self.check_online()?;
        let reference = Self::reference_of(content);
        self.items
            .write()
            .entry(reference.clone())
            .or_insert_with(|| content.to_vec());
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ContentError> {
        self.check_online()?;
        self.items
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(reference.to_string()))
    }
}
