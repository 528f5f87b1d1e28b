//! Engine snapshot
//!
//! What a restart needs besides the scan cursor: known listings, purchases
//! still waiting for their id, and every active state machine with its last
//! applied log position. Replayed events at or before that position are
//! ignored after a restore.

use super::handlers::subscribe_transaction;
use super::LifecycleEngine;
use crate::domain::{Applied, TransactionStateMachine};
use crate::error::{LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockNumber, Listing, PublishId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    /// Highest finalized block the engine had seen.
    pub block: BlockNumber,
    pub listings: Vec<Listing>,
    pub pending: Vec<TransactionStateMachine>,
    pub active: Vec<TransactionStateMachine>,
    pub awaiting_approval: Vec<(Address, PublishId)>,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl LifecycleEngine {
    /// Capture the engine state. Waits for machines busy in their lanes.
    pub async fn snapshot(&self) -> EngineSnapshot {
        let mut pending = Vec::new();
        for handle in self.registry.pending_handles() {
            pending.push(handle.lock().await.clone());
        }
        let mut active = Vec::new();
        for (_, handle) in self.registry.active_handles() {
            active.push(handle.lock().await.clone());
        }
        active.sort_by_key(|machine| machine.tx_id());

        let awaiting_approval = self
            .awaiting_approval
            .lock()
            .iter()
            .flat_map(|(buyer, ids)| ids.iter().map(move |id| (*buyer, id.clone())))
            .collect();

        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            block: self.current_block(),
            listings: self.listings.all(),
            pending,
            active,
            awaiting_approval,
        }
    }

    /// Load a snapshot into a fresh engine and resubscribe every machine.
    /// Handoffs a restart interrupted are run again.
    pub async fn restore(&self, snapshot: EngineSnapshot) -> LifecycleResult<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LifecycleError::IncompatibleSnapshot {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        self.current_block.fetch_max(snapshot.block, Ordering::SeqCst);
        self.last_reconcile.store(snapshot.block, Ordering::SeqCst);

        for listing in snapshot.listings {
            self.listings.insert(listing);
        }

        let pending_count = snapshot.pending.len();
        for machine in snapshot.pending {
            let buyer = machine.buyer();
            self.registry.add_pending(machine)?;
            self.ensure_creation_subscription(buyer);
        }

        let mut interrupted = Vec::new();
        let mut active_count = 0;
        for machine in snapshot.active {
            let Some(tx_id) = machine.tx_id() else {
                warn!(publish_id = %machine.publish_id(), "Skipping unbound machine in the active set");
                continue;
            };
            let resume = machine.pending_handoff();
            let handle = Arc::new(tokio::sync::Mutex::new(machine));
            self.registry.bind(tx_id, Arc::clone(&handle))?;
            {
                let machine = handle.lock().await;
                subscribe_transaction(self, tx_id, &machine, &handle);
            }
            if let Some(effect) = resume {
                interrupted.push((handle, effect));
            }
            active_count += 1;
        }

        for (buyer, publish_id) in snapshot.awaiting_approval {
            self.awaiting_approval
                .lock()
                .entry(buyer)
                .or_default()
                .push(publish_id);
            self.ensure_approval_subscription(buyer);
        }

        info!(
            block = snapshot.block,
            listings = self.listings.len(),
            pending = pending_count,
            active = active_count,
            resumed_handoffs = interrupted.len(),
            "Lifecycle state restored"
        );

        for (handle, effect) in interrupted {
            let mut machine = handle.lock().await;
            let applied = Applied::Absorbed {
                effects: vec![effect],
            };
            if let Err(e) = self.settle(&handle, &mut machine, applied, None).await {
                let _ = self.degrade(&mut machine, "HandoffResume", None, e).await;
            }
        }
        Ok(())
    }
}
