//! Transaction registry
//!
//! The only process-wide map of state machines. Purchases wait in the
//! pending set, keyed by `(buyer, publish_id)`, until the ledger assigns a
//! transaction id; they then move to the active map until they terminate.

use super::machine::TransactionStateMachine;
use crate::error::{LifecycleError, LifecycleResult};
use parking_lot::RwLock;
use shared_types::{Address, PublishId, TransactionId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared handle to one state machine. Held across `.await` while effects run.
pub type MachineHandle = Arc<tokio::sync::Mutex<TransactionStateMachine>>;

type PendingKey = (Address, PublishId);

#[derive(Default)]
pub struct TransactionRegistry {
    pending: RwLock<HashMap<PendingKey, MachineHandle>>,
    active: RwLock<HashMap<TransactionId, MachineHandle>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a purchase awaiting its transaction id.
    pub fn add_pending(&self, machine: TransactionStateMachine) -> LifecycleResult<MachineHandle> {
        let key = (machine.buyer(), machine.publish_id().clone());
        let mut pending = self.pending.write();
        if pending.contains_key(&key) {
            return Err(LifecycleError::AlreadyPending {
                buyer: key.0,
                publish_id: key.1,
            });
        }
        let handle = Arc::new(tokio::sync::Mutex::new(machine));
        debug!(buyer = %key.0, publish_id = %key.1, "Purchase pending");
        pending.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn has_pending(&self, buyer: &Address, publish_id: &PublishId) -> bool {
        self.pending
            .read()
            .contains_key(&(*buyer, publish_id.clone()))
    }

    pub fn take_pending(&self, buyer: &Address, publish_id: &PublishId) -> Option<MachineHandle> {
        self.pending.write().remove(&(*buyer, publish_id.clone()))
    }

    /// Whether `buyer` has any purchase awaiting its id.
    pub fn buyer_has_pending(&self, buyer: &Address) -> bool {
        self.pending.read().keys().any(|(b, _)| b == buyer)
    }

    /// Move a machine into the active map. An id binds exactly once.
    pub fn bind(&self, tx_id: TransactionId, handle: MachineHandle) -> LifecycleResult<()> {
        let mut active = self.active.write();
        if active.contains_key(&tx_id) {
            return Err(LifecycleError::AlreadyBound { tx_id });
        }
        active.insert(tx_id, handle);
        debug!(%tx_id, "Transaction bound");
        Ok(())
    }

    /// Move the pending purchase of `(buyer, publish_id)` to the active map
    /// under `tx_id`. `Ok(None)` when no such purchase is pending; on error
    /// the purchase stays pending.
    pub fn bind_pending(
        &self,
        buyer: &Address,
        publish_id: &PublishId,
        tx_id: TransactionId,
    ) -> LifecycleResult<Option<MachineHandle>> {
        let mut pending = self.pending.write();
        let key = (*buyer, publish_id.clone());
        if !pending.contains_key(&key) {
            return Ok(None);
        }
        let mut active = self.active.write();
        if active.contains_key(&tx_id) {
            return Err(LifecycleError::AlreadyBound { tx_id });
        }
        let Some(handle) = pending.remove(&key) else {
            return Ok(None);
        };
        active.insert(tx_id, Arc::clone(&handle));
        debug!(%tx_id, %buyer, %publish_id, "Pending purchase bound");
        Ok(Some(handle))
    }

    /// Whether `tx_id` is bound to exactly this machine.
    pub fn is_bound_to(&self, tx_id: &TransactionId, handle: &MachineHandle) -> bool {
        self.active
            .read()
            .get(tx_id)
            .is_some_and(|bound| Arc::ptr_eq(bound, handle))
    }

    pub fn get(&self, tx_id: &TransactionId) -> Option<MachineHandle> {
        self.active.read().get(tx_id).cloned()
    }

    pub fn is_active(&self, tx_id: &TransactionId) -> bool {
        self.active.read().contains_key(tx_id)
    }

    /// Remove a terminated transaction.
    pub fn evict(&self, tx_id: &TransactionId) -> Option<MachineHandle> {
        let removed = self.active.write().remove(tx_id);
        if removed.is_some() {
            debug!(%tx_id, "Transaction evicted");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    pub fn active_handles(&self) -> Vec<(TransactionId, MachineHandle)> {
        self.active
            .read()
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect()
    }

    pub fn pending_handles(&self) -> Vec<MachineHandle> {
        self.pending.read().values().cloned().collect()
    }
}
