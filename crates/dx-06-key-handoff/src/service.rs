//! Handoff Manager - Core business logic

use crate::domain::{Ciphertext, HandoffRecord, HandoffStatus};
use crate::error::{HandoffError, HandoffResult, KeyServiceError};
use crate::ports::inbound::KeyHandoffApi;
use crate::ports::outbound::KeyService;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{Address, RetryPolicy, TransactionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handoff configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Budget for `Unavailable` responses from the key service.
    pub retry: RetryPolicy,
}

/// Drives seller-to-buyer re-encryption and remembers the outcome per
/// transaction.
pub struct HandoffManager {
    key_service: Arc<dyn KeyService>,
    config: HandoffConfig,
    records: Mutex<HashMap<TransactionId, HandoffRecord>>,
}

impl HandoffManager {
    pub fn new(key_service: Arc<dyn KeyService>, config: HandoffConfig) -> Self {
        Self {
            key_service,
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, tx_id: &TransactionId) -> Option<HandoffRecord> {
        self.records.lock().get(tx_id).cloned()
    }

    fn fail(&self, tx_id: TransactionId, reason: String) -> HandoffError {
        error!(%tx_id, %reason, "Key handoff failed");
        if let Some(record) = self.records.lock().get_mut(&tx_id) {
            record.status = HandoffStatus::Failed {
                reason: reason.clone(),
            };
        }
        HandoffError::HandoffFailed { tx_id, reason }
    }
}

#[async_trait]
impl KeyHandoffApi for HandoffManager {
    async fn hand_off(
        &self,
        tx_id: TransactionId,
        seller_ciphertext: Ciphertext,
        seller: Address,
        buyer: Address,
    ) -> HandoffResult<Ciphertext> {
        {
            let mut records = self.records.lock();
            if let Some(done) = records.get(&tx_id).and_then(|r| r.verified_ciphertext()) {
                return Ok(done.clone());
            }
            records.insert(tx_id, HandoffRecord::pending(tx_id, seller, buyer));
        }

        if seller_ciphertext.is_empty() {
            return Err(self.fail(tx_id, "seller ciphertext is empty".to_string()));
        }

        let attempts = AtomicU32::new(0);
        let outcome = self
            .config
            .retry
            .run(
                || {
                    let n = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(record) = self.records.lock().get_mut(&tx_id) {
                        record.status = HandoffStatus::Pending { attempts: n };
                    }
                    self.key_service.reencrypt(&seller_ciphertext, seller, buyer)
                },
                KeyServiceError::is_transient,
            )
            .await;

        match outcome {
            Ok(buyer_ciphertext) if buyer_ciphertext.is_empty() => Err(self.fail(
                tx_id,
                KeyServiceError::Malformed("key service returned an empty ciphertext".into())
                    .to_string(),
            )),
            Ok(buyer_ciphertext) => {
                if let Some(record) = self.records.lock().get_mut(&tx_id) {
                    record.status = HandoffStatus::Complete {
                        buyer_ciphertext: buyer_ciphertext.clone(),
                    };
                }
                info!(
                    %tx_id,
                    attempts = attempts.load(Ordering::Relaxed),
                    "Key handoff complete"
                );
                Ok(buyer_ciphertext)
            }
            Err(exhausted) => {
                if exhausted.error.is_transient() {
                    warn!(%tx_id, attempts = exhausted.attempts, "Key service retry budget spent");
                }
                Err(self.fail(tx_id, exhausted.to_string()))
            }
        }
    }

    fn verified_ciphertext(&self, tx_id: &TransactionId) -> Option<Ciphertext> {
        self.records
            .lock()
            .get(tx_id)
            .and_then(|r| r.verified_ciphertext().cloned())
    }

    fn status(&self, tx_id: &TransactionId) -> Option<HandoffStatus> {
        self.records.lock().get(tx_id).map(|r| r.status.clone())
    }

    fn forget(&self, tx_id: &TransactionId) {
        self.records.lock().remove(tx_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Key service that fails `unavailable` times, then answers with `reply`.
    struct MockKeyService {
        calls: AtomicUsize,
        unavailable: usize,
        reply: Result<Ciphertext, KeyServiceError>,
    }

    impl MockKeyService {
        fn new(unavailable: usize, reply: Result<Ciphertext, KeyServiceError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                unavailable,
                reply,
            }
        }
    }

    #[async_trait]
    impl KeyService for MockKeyService {
        async fn reencrypt(
            &self,
            _ciphertext: &Ciphertext,
            _from: Address,
            _to: Address,
        ) -> Result<Ciphertext, KeyServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.unavailable {
                return Err(KeyServiceError::Unavailable("timeout".into()));
            }
            self.reply.clone()
        }
    }

    fn fast_config(max_retries: u32) -> HandoffConfig {
        HandoffConfig {
            retry: RetryPolicy {
                max_retries,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        }
    }

    fn seller() -> Address {
        Address([1u8; 20])
    }

    fn buyer() -> Address {
        Address([2u8; 20])
    }

    #[tokio::test]
    async fn test_handoff_retries_unavailable_then_completes() {
        let service = Arc::new(MockKeyService::new(2, Ok(Ciphertext::new(vec![9, 9]))));
        let manager = HandoffManager::new(service.clone(), fast_config(3));
        let tx = TransactionId::from(42);

        let ct = manager
            .hand_off(tx, Ciphertext::new(vec![1]), seller(), buyer())
            .await
            .unwrap();

        assert_eq!(ct.as_bytes(), &[9, 9]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(manager.verified_ciphertext(&tx), Some(ct));
    }

    #[tokio::test]
    async fn test_denied_fails_without_retry() {
        let service = Arc::new(MockKeyService::new(
            0,
            Err(KeyServiceError::Denied("not the owner".into())),
        ));
        let manager = HandoffManager::new(service.clone(), fast_config(5));
        let tx = TransactionId::from(7);

        let err = manager
            .hand_off(tx, Ciphertext::new(vec![1]), seller(), buyer())
            .await
            .unwrap_err();

        assert!(matches!(err, HandoffError::HandoffFailed { .. }));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            manager.status(&tx),
            Some(HandoffStatus::Failed { .. })
        ));
        assert_eq!(manager.verified_ciphertext(&tx), None);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails() {
        let service = Arc::new(MockKeyService::new(10, Ok(Ciphertext::new(vec![1]))));
        let manager = HandoffManager::new(service.clone(), fast_config(2));

        let result = manager
            .hand_off(TransactionId::from(1), Ciphertext::new(vec![1]), seller(), buyer())
            .await;

        assert!(result.is_err());
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_ciphertexts_fail_stop() {
        let service = Arc::new(MockKeyService::new(0, Ok(Ciphertext::default())));
        let manager = HandoffManager::new(service.clone(), fast_config(2));

        let empty_input = manager
            .hand_off(TransactionId::from(1), Ciphertext::default(), seller(), buyer())
            .await;
        assert!(empty_input.is_err());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);

        let empty_output = manager
            .hand_off(TransactionId::from(2), Ciphertext::new(vec![1]), seller(), buyer())
            .await;
        assert!(empty_output.is_err());
    }

    #[tokio::test]
    async fn test_completed_handoff_is_not_repeated() {
        let service = Arc::new(MockKeyService::new(0, Ok(Ciphertext::new(vec![5]))));
        let manager = HandoffManager::new(service.clone(), fast_config(0));
        let tx = TransactionId::from(3);

        manager
            .hand_off(tx, Ciphertext::new(vec![1]), seller(), buyer())
            .await
            .unwrap();
        let again = manager
            .hand_off(tx, Ciphertext::new(vec![1]), seller(), buyer())
            .await
            .unwrap();

        assert_eq!(again.as_bytes(), &[5]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        manager.forget(&tx);
        assert!(manager.status(&tx).is_none());
    }
}
