//! # Integration Harness
//!
//! A node running against an in-process ledger. Scenarios write contract
//! logs with [`Harness::emit`], then wait for the pipeline to finalize the
//! block with [`Harness::settle`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dx_01_event_decoder::{marketplace_schema, MarketEvent};
use dx_02_event_scanner::InMemoryLedger;
use dx_04_transaction_lifecycle::InMemoryContentStore;
use dx_05_verifier_coordination::DecisionRule;
use dx_06_key_handoff::DevKeyService;
use dx_07_action_submitter::DevSigner;
use node_runtime::{ExchangeRuntime, NodeConfig, RuntimePorts};
use parking_lot::Mutex;
use shared_bus::{AnomalyKind, NotificationFilter, NotificationKind, NotificationPayload};
use shared_types::{
    Address, BlockNumber, LogPosition, PublishId, RawLog, RetryPolicy, TransactionId, TxState,
    U256,
};
use tempfile::TempDir;

pub const PROTOCOL: Address = Address([0xee; 20]);
pub const SELLER: Address = Address([0x11; 20]);
pub const BUYER: Address = Address([0x22; 20]);
pub const V1: Address = Address([0x31; 20]);
pub const V2: Address = Address([0x32; 20]);
pub const V3: Address = Address([0x33; 20]);
pub const ARBITRATOR: Address = Address([0xaa; 20]);

pub const PUBLISH_ID: &str = "pub-1";
pub const SECOND_PUBLISH_ID: &str = "pub-2";
pub const DATA_KEY: &[u8] = b"data-key";

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub keys: Arc<DevKeyService>,
    pub runtime: ExchangeRuntime,
    dir: TempDir,
    log_indices: Mutex<HashMap<BlockNumber, u32>>,
}

impl Harness {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        Self::start_in(
            dir,
            Arc::new(InMemoryLedger::new()),
            Arc::new(DevKeyService::new()),
            HashMap::new(),
        )
        .await
    }

    async fn start_in(
        dir: TempDir,
        ledger: Arc<InMemoryLedger>,
        keys: Arc<DevKeyService>,
        log_indices: HashMap<BlockNumber, u32>,
    ) -> Self {
        let ports = RuntimePorts {
            ledger: ledger.clone(),
            signer: Arc::new(DevSigner::new()),
            key_service: keys.clone(),
            content: Arc::new(InMemoryContentStore::new()),
        };
        let runtime = ExchangeRuntime::new(node_config(dir.path()), ports).expect("runtime");
        runtime.start().await.expect("start");
        Self {
            ledger,
            keys,
            runtime,
            dir,
            log_indices: Mutex::new(log_indices),
        }
    }

    /// Shut the node down cleanly and start a new one on the same data
    /// directory and ledger.
    pub async fn restart(self) -> Self {
        self.restart_with(|_| {}).await
    }

    /// Like [`Harness::restart`], running `between` while no node holds the
    /// data directory.
    pub async fn restart_with(self, between: impl FnOnce(&Path)) -> Self {
        let Harness {
            ledger,
            keys,
            runtime,
            dir,
            log_indices,
        } = self;
        runtime.shutdown().await.expect("shutdown");
        drop(runtime);
        between(dir.path());
        Self::start_in(dir, ledger, keys, log_indices.into_inner()).await
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write `event` into `block` after the logs already there.
    pub fn emit(&self, event: MarketEvent, block: BlockNumber) -> LogPosition {
        self.emit_with(event, block, |_| {})
    }

    /// Like [`Harness::emit`], letting `edit` alter the raw log first.
    pub fn emit_with(
        &self,
        event: MarketEvent,
        block: BlockNumber,
        edit: impl FnOnce(&mut RawLog),
    ) -> LogPosition {
        let log_index = {
            let mut indices = self.log_indices.lock();
            let next = indices.entry(block).or_insert(0);
            let index = *next;
            *next += 1;
            index
        };
        let topic = marketplace_schema(event.name()).topic();
        let mut log = event.to_raw_log(PROTOCOL, topic, block, log_index);
        edit(&mut log);
        self.ledger.push_log(log);
        LogPosition::new(block, log_index)
    }

    /// Let the ledger reach `block` and wait until the node has applied
    /// everything up to it.
    pub async fn settle(&self, block: BlockNumber) {
        if self.ledger.head() < block {
            self.ledger.set_head(block);
        }
        let engine = self.runtime.engine().clone();
        tokio::time::timeout(Duration::from_secs(10), async move {
            while engine.current_block() < block {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("node did not reach block");
        self.runtime.router().wait_idle().await;
    }

    /// Target states of every transition of `tx_id`, oldest first.
    pub fn transitions(&self, tx_id: TransactionId) -> Vec<TxState> {
        self.runtime
            .notifications()
            .recent(&NotificationFilter::transaction(tx_id))
            .into_iter()
            .filter(|n| n.kind() == NotificationKind::Transition)
            .filter_map(|n| n.to_state)
            .collect()
    }

    pub fn anomalies(&self) -> Vec<AnomalyKind> {
        self.runtime
            .notifications()
            .recent(&NotificationFilter::kinds(vec![NotificationKind::Anomaly]))
            .into_iter()
            .filter_map(|n| match n.payload {
                NotificationPayload::Anomaly { anomaly, .. } => Some(anomaly),
                _ => None,
            })
            .collect()
    }

    pub fn failure_parties(&self) -> Vec<Vec<Address>> {
        self.runtime
            .notifications()
            .recent(&NotificationFilter::kinds(vec![NotificationKind::Failure]))
            .into_iter()
            .filter_map(|n| match n.payload {
                NotificationPayload::Failure { parties, .. } => Some(parties),
                _ => None,
            })
            .collect()
    }
}

fn node_config(data_dir: &Path) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.ledger.protocol_contract = PROTOCOL;
    config.scanner.confirmations = 0;
    config.scanner.poll_interval_ms = 5;
    config.voting.rule = DecisionRule::Majority;
    config.voting.min_votes = 2;
    config.voting.vote_timeout_blocks = 50;
    config.voting.arbitrator = Some(ARBITRATOR);
    config.handoff.retry = RetryPolicy::none();
    config.submitter.reconcile_interval_blocks = 0;
    config.storage.data_dir = data_dir.to_path_buf();
    config
}

// =============================================================================
// Contract events
// =============================================================================

pub fn tx(id: u64) -> TransactionId {
    TransactionId::from(id)
}

pub fn publish(verification_required: bool) -> MarketEvent {
    publish_listing(PUBLISH_ID, verification_required)
}

pub fn publish_listing(publish_id: &str, verification_required: bool) -> MarketEvent {
    MarketEvent::DataPublish {
        publish_id: PublishId::from(publish_id),
        price: U256::from(100u64),
        description_ref: "desc-ref".to_string(),
        proof_refs: Vec::new(),
        seller: SELLER,
        verification_required,
    }
}

pub fn created(tx_id: TransactionId, verification_required: bool) -> MarketEvent {
    created_for(tx_id, PUBLISH_ID, verification_required)
}

pub fn created_for(
    tx_id: TransactionId,
    publish_id: &str,
    verification_required: bool,
) -> MarketEvent {
    MarketEvent::TransactionCreate {
        tx_id,
        publish_id: PublishId::from(publish_id),
        buyer: BUYER,
        seller: SELLER,
        proof_refs: Vec::new(),
        verification_required,
        state: 1,
    }
}

pub fn verifiers_chosen(tx_id: TransactionId) -> MarketEvent {
    MarketEvent::VerifiersChosen {
        tx_id,
        publish_id: PublishId::from(PUBLISH_ID),
        verifiers: vec![V1, V2, V3],
        state: 1,
    }
}

pub fn vote(tx_id: TransactionId, verifier: Address, approve: bool) -> MarketEvent {
    MarketEvent::Vote {
        tx_id,
        verifier,
        approve,
        comment: String::new(),
        state: 1,
    }
}

pub fn buy(tx_id: TransactionId) -> MarketEvent {
    MarketEvent::Buy {
        tx_id,
        seller_ciphertext: DevKeyService::seal(SELLER, DATA_KEY).into_bytes(),
        buyer: BUYER,
        state: 3,
    }
}

/// The ciphertext the seller's handoff produces for the buyer.
pub fn buyer_ciphertext() -> Vec<u8> {
    DevKeyService::seal(BUYER, DATA_KEY).into_bytes()
}

pub fn ready_for_download(tx_id: TransactionId) -> MarketEvent {
    MarketEvent::ReadyForDownload {
        tx_id,
        buyer_ciphertext: buyer_ciphertext(),
        state: 4,
    }
}

pub fn data_confirmed(tx_id: TransactionId, truth: bool) -> MarketEvent {
    MarketEvent::DataConfirmed {
        tx_id,
        buyer: BUYER,
        truth,
        state: 6,
    }
}

pub fn arbitration_result(tx_id: TransactionId, approve: bool) -> MarketEvent {
    MarketEvent::ArbitrationResult {
        tx_id,
        arbitrator: ARBITRATOR,
        approve,
        state: 6,
    }
}

pub fn close(tx_id: TransactionId) -> MarketEvent {
    MarketEvent::TransactionClose { tx_id, state: 7 }
}
