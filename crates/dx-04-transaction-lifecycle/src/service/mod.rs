//! Lifecycle Engine - Core business logic
//!
//! Owns the registry of state machines, subscribes them to the router and
//! carries out the effects their transitions ask for.

mod actions;
mod handlers;
mod snapshot;

pub use actions::MAX_CREDIT;
pub use snapshot::{EngineSnapshot, SNAPSHOT_VERSION};

use crate::domain::{
    Applied, Effect, ListingBook, MachineHandle, Stamp, TransactionRegistry,
    TransactionStateMachine, Transition, Trigger,
};
use crate::error::{LifecycleError, LifecycleResult};
use crate::ports::outbound::ContentStore;
use dx_03_event_router::{EventRouter, HandlerError, HandlerResult, SubscriptionId};
use dx_05_verifier_coordination::VotePolicy;
use dx_06_key_handoff::{Ciphertext, HandoffError, KeyHandoffApi};
use dx_07_action_submitter::{Action, ActionApi, ActionKey};
use handlers::{install_global_handlers, subscribe_transaction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_bus::{AnomalyKind, Notification, NotificationPayload, NotificationSink};
use shared_types::{
    Address, BlockNumber, PublishId, ReceiptStatus, TransactionId, TxState,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Lifecycle engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub vote_policy: VotePolicy,
    /// Only this account may decide arbitration cases, when set.
    pub arbitrator: Option<Address>,
    /// Protocol contract; spender of purchase approvals.
    pub protocol_contract: Address,
    /// Blocks between receipt reconciliations. 0 disables them.
    pub reconcile_interval_blocks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vote_policy: VotePolicy::default(),
            arbitrator: None,
            protocol_contract: Address::ZERO,
            reconcile_interval_blocks: 10,
        }
    }
}

/// Drives every business transaction from prepare-to-buy to a terminal
/// state.
///
/// Events reach the engine only through router subscriptions, so the
/// machine of one transaction is driven by one lane at a time.
pub struct LifecycleEngine {
    me: Weak<LifecycleEngine>,
    config: EngineConfig,
    router: EventRouter,
    registry: TransactionRegistry,
    listings: ListingBook,
    submitter: Arc<dyn ActionApi>,
    handoff: Arc<dyn KeyHandoffApi>,
    content: Arc<dyn ContentStore>,
    sink: Arc<dyn NotificationSink>,
    /// Purchases waiting for the buyer's approval to be observed.
    awaiting_approval: Mutex<HashMap<Address, Vec<PublishId>>>,
    approval_subscriptions: Mutex<HashMap<Address, SubscriptionId>>,
    creation_subscriptions: Mutex<HashMap<Address, SubscriptionId>>,
    current_block: AtomicU64,
    last_reconcile: AtomicU64,
    reconciling: AtomicBool,
}

impl LifecycleEngine {
    pub fn new(
        config: EngineConfig,
        router: EventRouter,
        submitter: Arc<dyn ActionApi>,
        handoff: Arc<dyn KeyHandoffApi>,
        content: Arc<dyn ContentStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let engine = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            router,
            registry: TransactionRegistry::new(),
            listings: ListingBook::new(),
            submitter,
            handoff,
            content,
            sink,
            awaiting_approval: Mutex::new(HashMap::new()),
            approval_subscriptions: Mutex::new(HashMap::new()),
            creation_subscriptions: Mutex::new(HashMap::new()),
            current_block: AtomicU64::new(0),
            last_reconcile: AtomicU64::new(0),
            reconciling: AtomicBool::new(false),
        });
        install_global_handlers(&engine);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn listings(&self) -> &ListingBook {
        &self.listings
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    pub fn current_block(&self) -> BlockNumber {
        self.current_block.load(Ordering::SeqCst)
    }

    /// Whether a handler failure was recorded against the transaction.
    pub async fn is_degraded(&self, tx_id: &TransactionId) -> Option<bool> {
        let handle = self.registry.get(tx_id)?;
        let machine = handle.lock().await;
        Some(machine.is_degraded())
    }

    /// A finalized block: resolve vote timeouts and, every few blocks,
    /// reconcile submission receipts.
    pub async fn on_block(&self, height: BlockNumber) {
        for (tx_id, handle) in self.registry.active_handles() {
            // A busy machine is in its lane; the next block retries it.
            let Ok(mut machine) = handle.try_lock() else {
                continue;
            };
            if !machine.awaits_votes() {
                continue;
            }
            match machine.apply(Trigger::Tick, Stamp::Block(height)) {
                Ok(applied) => {
                    if let Err(e) = self.settle(&handle, &mut machine, applied, None).await {
                        let _ = self.degrade(&mut machine, "Tick", Some(height), e).await;
                    }
                }
                Err(e) => warn!(%tx_id, height, error = %e, "Vote timeout check failed"),
            }
        }

        // Published once the block's timeouts are applied.
        self.current_block.fetch_max(height, Ordering::SeqCst);
        self.maybe_reconcile(height);
    }

    fn maybe_reconcile(&self, height: BlockNumber) {
        let interval = self.config.reconcile_interval_blocks;
        if interval == 0 || height < self.last_reconcile.load(Ordering::SeqCst) + interval {
            return;
        }
        if self.reconciling.swap(true, Ordering::SeqCst) {
            return;
        }
        self.last_reconcile.store(height, Ordering::SeqCst);

        let Some(engine) = self.me.upgrade() else {
            self.reconciling.store(false, Ordering::SeqCst);
            return;
        };
        tokio::spawn(async move {
            let updates = engine.submitter.reconcile().await;
            for update in updates {
                if update.status != ReceiptStatus::Failed {
                    continue;
                }
                warn!(key = %update.key, tx_hash = %hex::encode(update.tx_hash), "Submitted action failed on the ledger");
                engine
                    .notify_submission_failed(&update.key, "ledger receipt reports failure".into())
                    .await;
            }
            engine.reconciling.store(false, Ordering::SeqCst);
        });
    }

    /// Carry out the effects of `applied` and of anything they trigger in
    /// turn. The caller holds the machine's lock.
    async fn settle(
        &self,
        handle: &MachineHandle,
        machine: &mut TransactionStateMachine,
        applied: Applied,
        ledger_state: Option<u8>,
    ) -> LifecycleResult<()> {
        let mut queue = VecDeque::from([applied]);
        while let Some(applied) = queue.pop_front() {
            let effects = match applied {
                Applied::Duplicate => continue,
                Applied::Absorbed { effects } => effects,
                Applied::Transitioned(transition) => {
                    self.notify_transition(machine, &transition, ledger_state)
                        .await;
                    transition.effects
                }
            };
            for effect in effects {
                if let Some(next) = self.execute(handle, machine, effect).await? {
                    queue.push_back(next);
                }
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        handle: &MachineHandle,
        machine: &mut TransactionStateMachine,
        effect: Effect,
    ) -> LifecycleResult<Option<Applied>> {
        let Some(tx_id) = machine.tx_id() else {
            warn!(publish_id = %machine.publish_id(), ?effect, "Effect on an unbound transaction ignored");
            return Ok(None);
        };

        match effect {
            Effect::Bind(tx_id) => {
                if !self.registry.is_bound_to(&tx_id, handle) {
                    self.registry.bind(tx_id, Arc::clone(handle))?;
                }
                subscribe_transaction(self, tx_id, machine, handle);
                Ok(None)
            }
            Effect::AwaitVerification => {
                debug!(%tx_id, "Awaiting verifier votes");
                Ok(None)
            }
            Effect::AwaitBuy => {
                debug!(%tx_id, "No verification required, awaiting buy");
                Ok(None)
            }
            Effect::OpenArbitration { reason } => {
                info!(%tx_id, %reason, arbitrator = ?self.config.arbitrator, "Arbitration opened");
                Ok(None)
            }
            Effect::RequestHandoff {
                seller_ciphertext,
                seller,
                buyer,
            } => {
                let outcome = self
                    .handoff
                    .hand_off(tx_id, Ciphertext::new(seller_ciphertext), seller, buyer)
                    .await;
                let trigger = match outcome {
                    Ok(buyer_ciphertext) => Trigger::HandoffComplete {
                        buyer_ciphertext: buyer_ciphertext.into_bytes(),
                    },
                    Err(HandoffError::HandoffFailed { reason, .. }) => {
                        Trigger::HandoffFailed { reason }
                    }
                };
                Ok(Some(machine.apply(trigger, Stamp::Internal)?))
            }
            Effect::SubmitBuyerCiphertext { ciphertext } => {
                let seller = machine.seller().unwrap_or(Address::ZERO);
                let action = Action::SubmitBuyerCiphertext { tx_id, ciphertext };
                if let Err(e) = self.submitter.submit(seller, action.clone()).await {
                    warn!(%tx_id, %seller, error = %e, "Buyer ciphertext submission failed");
                    machine.mark_degraded();
                    self.notify_submission_failed(&action.key(seller), e.to_string())
                        .await;
                }
                Ok(None)
            }
            Effect::NotifyBuyer => {
                info!(%tx_id, buyer = %machine.buyer(), "Data ready for download");
                Ok(None)
            }
            Effect::ReleasePayment => {
                info!(%tx_id, seller = ?machine.seller(), "Payment released");
                Ok(None)
            }
            Effect::Refund => {
                info!(%tx_id, buyer = %machine.buyer(), "Buyer refunded");
                Ok(None)
            }
            Effect::Terminate { failure } => {
                self.terminate(tx_id, machine, failure).await;
                Ok(None)
            }
        }
    }

    async fn terminate(
        &self,
        tx_id: TransactionId,
        machine: &TransactionStateMachine,
        failure: Option<String>,
    ) {
        self.registry.evict(&tx_id);
        self.router.unsubscribe_transaction(&tx_id);
        self.submitter.release_transaction(&tx_id);
        self.handoff.forget(&tx_id);

        let Some(reason) = failure else {
            info!(%tx_id, state = %machine.state(), "Transaction closed");
            return;
        };
        error!(%tx_id, %reason, "Transaction failed");
        let mut parties = Vec::with_capacity(2);
        if let Some(seller) = machine.seller() {
            parties.push(seller);
        }
        parties.push(machine.buyer());
        self.sink
            .notify(Notification {
                transaction_id: Some(tx_id),
                publish_id: Some(machine.publish_id().clone()),
                from_state: None,
                to_state: Some(machine.state()),
                block_number: Some(self.current_block()),
                payload: NotificationPayload::Failure { reason, parties },
            })
            .await;
    }

    async fn notify_transition(
        &self,
        machine: &TransactionStateMachine,
        transition: &Transition,
        ledger_state: Option<u8>,
    ) {
        let Some(tx_id) = machine.tx_id() else {
            return;
        };
        info!(
            %tx_id,
            from = %transition.from,
            to = %transition.to,
            trigger = transition.trigger,
            block = transition.block,
            "Transaction state changed"
        );
        if let Some(code) = ledger_state {
            let reported = TxState::from_ledger_code(code);
            if reported != Some(transition.to) {
                debug!(%tx_id, code, local = %transition.to, "Ledger reports a different state code");
            }
        }

        let detail = (!transition.effects.is_empty()).then(|| {
            transition
                .effects
                .iter()
                .map(Effect::describe)
                .collect::<Vec<_>>()
                .join("; ")
        });
        self.sink
            .notify(Notification::transition(
                tx_id,
                machine.publish_id().clone(),
                transition.from,
                transition.to,
                transition.block,
                transition.trigger,
                detail,
            ))
            .await;
    }

    async fn notify_submission_failed(&self, key: &ActionKey, detail: String) {
        self.sink
            .notify(Notification {
                transaction_id: key.transaction_id(),
                publish_id: None,
                from_state: None,
                to_state: None,
                block_number: Some(self.current_block()),
                payload: NotificationPayload::SubmissionFailed {
                    action: key.kind.to_string(),
                    detail,
                },
            })
            .await;
    }

    async fn report_anomaly(
        &self,
        tx_id: Option<TransactionId>,
        block: Option<BlockNumber>,
        kind: AnomalyKind,
        event: &str,
        detail: String,
    ) {
        self.sink
            .notify(Notification::anomaly(tx_id, block, kind, event, detail))
            .await;
    }

    /// Record a handler failure against the machine and report it.
    async fn degrade(
        &self,
        machine: &mut TransactionStateMachine,
        event: &str,
        block: Option<BlockNumber>,
        e: LifecycleError,
    ) -> HandlerResult {
        machine.mark_degraded();
        error!(tx_id = ?machine.tx_id(), event, error = %e, "Transaction degraded");
        self.report_anomaly(
            machine.tx_id(),
            block,
            AnomalyKind::HandlerFailure,
            event,
            e.to_string(),
        )
        .await;
        Err(HandlerError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryContentStore;
    use crate::ports::{LifecycleApi, PublishRequest};
    use async_trait::async_trait;
    use dx_01_event_decoder::MarketEvent;
    use dx_03_event_router::RoutedEvent;
    use dx_05_verifier_coordination::DecisionRule;
    use dx_06_key_handoff::{DevKeyService, HandoffConfig, HandoffManager};
    use dx_07_action_submitter::{ReceiptUpdate, Submission, SubmissionError, SubmissionResult};
    use shared_bus::{InMemoryNotificationBus, NotificationFilter, NotificationKind};
    use shared_types::{FieldMap, LedgerEvent, Listing, RetryPolicy, U256};
    use std::sync::atomic::AtomicUsize;

    const SELLER: Address = Address([0x11; 20]);
    const BUYER: Address = Address([0x22; 20]);
    const V1: Address = Address([0x31; 20]);
    const V2: Address = Address([0x32; 20]);
    const V3: Address = Address([0x33; 20]);
    const ARBITRATOR: Address = Address([0xaa; 20]);
    const PROTOCOL: Address = Address([0xee; 20]);

    // =========================================================================
    // Mock Implementations
    // =========================================================================

    #[derive(Default)]
    struct MockSubmitter {
        submitted: parking_lot::Mutex<Vec<(Address, Action)>>,
        confirmed: parking_lot::Mutex<Vec<ActionKey>>,
        released: parking_lot::Mutex<Vec<TransactionId>>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockSubmitter {
        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn submitted(&self) -> Vec<(Address, Action)> {
            self.submitted.lock().clone()
        }
    }

    #[async_trait]
    impl ActionApi for MockSubmitter {
        async fn submit(&self, actor: Address, action: Action) -> SubmissionResult<Submission> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(SubmissionError::Unavailable {
                    attempts: 1,
                    reason: "ledger offline".into(),
                });
            }
            let key = action.key(actor);
            self.submitted.lock().push((actor, action));
            Ok(Submission::Submitted {
                key,
                tx_hash: [0u8; 32],
                correlation_id: uuid::Uuid::new_v4(),
            })
        }

        fn confirm(&self, key: &ActionKey) -> bool {
            self.confirmed.lock().push(key.clone());
            true
        }

        fn release_transaction(&self, tx_id: &TransactionId) {
            self.released.lock().push(*tx_id);
        }

        fn is_in_flight(&self, _key: &ActionKey) -> bool {
            false
        }

        async fn reconcile(&self) -> Vec<ReceiptUpdate> {
            Vec::new()
        }
    }

    struct Fixture {
        engine: Arc<LifecycleEngine>,
        router: EventRouter,
        submitter: Arc<MockSubmitter>,
        keys: Arc<DevKeyService>,
        bus: Arc<InMemoryNotificationBus>,
    }

    fn fixture() -> Fixture {
        let router = EventRouter::new();
        let submitter = Arc::new(MockSubmitter::default());
        let keys = Arc::new(DevKeyService::new());
        let handoff = Arc::new(HandoffManager::new(
            keys.clone(),
            HandoffConfig {
                retry: RetryPolicy::none(),
            },
        ));
        let bus = Arc::new(InMemoryNotificationBus::new());
        let config = EngineConfig {
            vote_policy: VotePolicy {
                rule: DecisionRule::Majority,
                min_votes: 2,
                vote_timeout_blocks: 50,
            },
            arbitrator: Some(ARBITRATOR),
            protocol_contract: PROTOCOL,
            reconcile_interval_blocks: 0,
        };
        let engine = LifecycleEngine::new(
            config,
            router.clone(),
            submitter.clone(),
            handoff,
            Arc::new(InMemoryContentStore::new()),
            bus.clone(),
        );
        Fixture {
            engine,
            router,
            submitter,
            keys,
            bus,
        }
    }

    fn tx42() -> TransactionId {
        TransactionId::from(42)
    }

    fn listing(verification_required: bool) -> Listing {
        Listing {
            publish_id: PublishId::from("pub-1"),
            price: U256::from(100u64),
            seller: SELLER,
            metadata_ref: "desc-ref".to_string(),
            proof_refs: Vec::new(),
            verification_required,
            published_at: 1,
        }
    }

    async fn deliver(f: &Fixture, event: MarketEvent, block: BlockNumber, log_index: u32) {
        let ledger = LedgerEvent {
            contract: Address([0xcc; 20]),
            name: event.name().to_string(),
            block_number: block,
            log_index,
            fields: FieldMap::new(),
        };
        f.router.dispatch(RoutedEvent::new(ledger, event));
        f.router.wait_idle().await;
    }

    fn created(verification_required: bool) -> MarketEvent {
        MarketEvent::TransactionCreate {
            tx_id: tx42(),
            publish_id: PublishId::from("pub-1"),
            buyer: BUYER,
            seller: SELLER,
            proof_refs: Vec::new(),
            verification_required,
            state: 1,
        }
    }

    fn vote(verifier: Address, approve: bool) -> MarketEvent {
        MarketEvent::Vote {
            tx_id: tx42(),
            verifier,
            approve,
            comment: String::new(),
            state: 1,
        }
    }

    fn transitions_to(f: &Fixture, state: TxState) -> usize {
        f.bus
            .recent(&NotificationFilter::transaction(tx42()))
            .iter()
            .filter(|n| n.is_transition_to(state))
            .count()
    }

    fn anomalies(f: &Fixture) -> Vec<AnomalyKind> {
        f.bus
            .recent(&NotificationFilter::kinds(vec![NotificationKind::Anomaly]))
            .into_iter()
            .filter_map(|n| match n.payload {
                NotificationPayload::Anomaly { anomaly, .. } => Some(anomaly),
                _ => None,
            })
            .collect()
    }

    /// Listing known, purchase prepared and `TransactionCreate(42)` observed.
    async fn created_tx(verification_required: bool) -> Fixture {
        let f = fixture();
        f.engine.listings().insert(listing(verification_required));
        f.engine
            .prepare_to_buy(BUYER, PublishId::from("pub-1"))
            .await
            .unwrap();
        deliver(&f, created(verification_required), 10, 0).await;
        f
    }

    async fn voted_tx() -> Fixture {
        let f = created_tx(true).await;
        deliver(
            &f,
            MarketEvent::VerifiersChosen {
                tx_id: tx42(),
                publish_id: PublishId::from("pub-1"),
                verifiers: vec![V1, V2, V3],
                state: 1,
            },
            11,
            0,
        )
        .await;
        deliver(&f, vote(V1, true), 12, 0).await;
        deliver(&f, vote(V2, true), 12, 1).await;
        f
    }

    fn buy_event(f: &Fixture) -> MarketEvent {
        MarketEvent::Buy {
            tx_id: tx42(),
            seller_ciphertext: DevKeyService::seal(SELLER, b"data-key").into_bytes(),
            buyer: BUYER,
            state: 3,
        }
    }

    // =========================================================================
    // Purchase flow
    // =========================================================================

    #[tokio::test]
    async fn test_purchase_waits_for_approval_then_prepares() {
        let f = fixture();
        f.engine.listings().insert(listing(true));

        f.engine
            .purchase(BUYER, PublishId::from("pub-1"))
            .await
            .unwrap();
        let submitted = f.submitter.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(matches!(
            submitted[0].1,
            Action::ApproveTransfer { spender: PROTOCOL, .. }
        ));

        deliver(
            &f,
            MarketEvent::Approval {
                owner: BUYER,
                spender: PROTOCOL,
                value: U256::from(100u64),
            },
            5,
            0,
        )
        .await;
        let submitted = f.submitter.submitted();
        assert_eq!(submitted.len(), 2);
        assert!(matches!(submitted[1].1, Action::PrepareToBuy { .. }));
        assert_eq!(f.engine.pending_count(), 1);

        deliver(&f, created(true), 6, 0).await;
        assert_eq!(f.engine.pending_count(), 0);
        assert_eq!(f.engine.active_count(), 1);
        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Created));
        assert_eq!(transitions_to(&f, TxState::Created), 1);
    }

    #[tokio::test]
    async fn test_purchase_of_unknown_listing_is_refused() {
        let f = fixture();
        let result = f.engine.purchase(BUYER, PublishId::from("nope")).await;
        assert!(matches!(result, Err(LifecycleError::UnknownListing { .. })));
        assert_eq!(f.submitter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_prepare_for_same_listing_is_refused() {
        let f = fixture();
        f.engine.listings().insert(listing(true));
        f.engine
            .prepare_to_buy(BUYER, PublishId::from("pub-1"))
            .await
            .unwrap();
        let again = f.engine.prepare_to_buy(BUYER, PublishId::from("pub-1")).await;
        assert!(matches!(again, Err(LifecycleError::AlreadyPending { .. })));
    }

    #[tokio::test]
    async fn test_failed_prepare_forgets_pending_purchase() {
        let f = fixture();
        f.engine.listings().insert(listing(true));
        f.submitter.set_fail(true);
        let result = f.engine.prepare_to_buy(BUYER, PublishId::from("pub-1")).await;
        assert!(matches!(result, Err(LifecycleError::Submission(_))));
        assert_eq!(f.engine.pending_count(), 0);
    }

    // =========================================================================
    // Verification
    // =========================================================================

    #[tokio::test]
    async fn test_two_of_three_approvals_reach_voted() {
        let f = voted_tx().await;
        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Voted));
        assert_eq!(transitions_to(&f, TxState::Voted), 1);
        assert_eq!(transitions_to(&f, TxState::Arbitrating), 0);
    }

    #[tokio::test]
    async fn test_two_of_three_rejections_open_arbitration() {
        let f = created_tx(true).await;
        deliver(
            &f,
            MarketEvent::VerifiersChosen {
                tx_id: tx42(),
                publish_id: PublishId::from("pub-1"),
                verifiers: vec![V1, V2, V3],
                state: 1,
            },
            11,
            0,
        )
        .await;
        deliver(&f, vote(V1, false), 12, 0).await;
        deliver(&f, vote(V2, false), 12, 1).await;

        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Arbitrating));
        assert_eq!(transitions_to(&f, TxState::Voted), 0);
    }

    #[tokio::test]
    async fn test_vote_timeout_opens_arbitration_on_block() {
        let f = created_tx(true).await;
        f.engine.on_block(59).await;
        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Created));

        f.engine.on_block(60).await;
        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Arbitrating));
        assert_eq!(transitions_to(&f, TxState::Arbitrating), 1);
    }

    #[tokio::test]
    async fn test_arbitration_by_configured_arbitrator_only() {
        let f = created_tx(true).await;
        f.engine.on_block(60).await;

        let stranger = f.engine.arbitrate(V1, tx42(), true).await;
        assert!(matches!(stranger, Err(LifecycleError::Rejected { .. })));
        f.engine.arbitrate(ARBITRATOR, tx42(), true).await.unwrap();

        deliver(
            &f,
            MarketEvent::ArbitrationResult {
                tx_id: tx42(),
                arbitrator: ARBITRATOR,
                approve: true,
                state: 6,
            },
            61,
            0,
        )
        .await;
        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Payed));
    }

    // =========================================================================
    // Key handoff
    // =========================================================================

    #[tokio::test]
    async fn test_full_flow_without_verification_closes_and_evicts() {
        let f = created_tx(false).await;
        f.engine.buy(BUYER, tx42()).await.unwrap();

        deliver(&f, buy_event(&f), 11, 0).await;
        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Buying));

        let expected = DevKeyService::seal(BUYER, b"data-key").into_bytes();
        let (actor, action) = f.submitter.submitted().pop().unwrap();
        assert_eq!(actor, SELLER);
        assert_eq!(
            action,
            Action::SubmitBuyerCiphertext {
                tx_id: tx42(),
                ciphertext: expected.clone(),
            }
        );

        deliver(
            &f,
            MarketEvent::ReadyForDownload {
                tx_id: tx42(),
                buyer_ciphertext: expected,
                state: 4,
            },
            12,
            0,
        )
        .await;
        assert_eq!(
            f.engine.state_of(&tx42()).await,
            Some(TxState::ReadyForDownload)
        );

        f.engine.confirm_data_truth(BUYER, tx42(), true).await.unwrap();
        deliver(
            &f,
            MarketEvent::DataConfirmed {
                tx_id: tx42(),
                buyer: BUYER,
                truth: true,
                state: 6,
            },
            13,
            0,
        )
        .await;
        deliver(
            &f,
            MarketEvent::TransactionClose {
                tx_id: tx42(),
                state: 7,
            },
            14,
            0,
        )
        .await;

        assert_eq!(transitions_to(&f, TxState::Closed), 1);
        assert_eq!(f.engine.active_count(), 0);
        assert_eq!(f.router.transaction_subscription_count(&tx42()), 0);
        assert_eq!(f.submitter.released.lock().as_slice(), &[tx42()]);
    }

    #[tokio::test]
    async fn test_handoff_denied_fails_transaction() {
        let f = voted_tx().await;
        f.keys.set_deny(true);

        deliver(&f, buy_event(&f), 13, 0).await;

        assert_eq!(transitions_to(&f, TxState::Failed), 1);
        assert_eq!(f.engine.active_count(), 0);
        let failures = f
            .bus
            .recent(&NotificationFilter::kinds(vec![NotificationKind::Failure]));
        assert_eq!(failures.len(), 1);
        match &failures[0].payload {
            NotificationPayload::Failure { parties, .. } => {
                assert_eq!(parties, &vec![SELLER, BUYER]);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        // The evicted transaction no longer accepts events.
        deliver(
            &f,
            MarketEvent::ReadyForDownload {
                tx_id: tx42(),
                buyer_ciphertext: vec![1, 2, 3],
                state: 4,
            },
            14,
            0,
        )
        .await;
        assert_eq!(transitions_to(&f, TxState::ReadyForDownload), 0);
        assert_eq!(anomalies(&f), vec![AnomalyKind::UnknownTransaction]);
    }

    #[tokio::test]
    async fn test_mismatched_ciphertext_is_dropped() {
        let f = voted_tx().await;
        deliver(&f, buy_event(&f), 13, 0).await;

        deliver(
            &f,
            MarketEvent::ReadyForDownload {
                tx_id: tx42(),
                buyer_ciphertext: b"forged".to_vec(),
                state: 4,
            },
            14,
            0,
        )
        .await;

        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Buying));
        assert_eq!(anomalies(&f), vec![AnomalyKind::InvalidTransition]);
    }

    #[tokio::test]
    async fn test_failed_ciphertext_submission_degrades_and_can_be_resubmitted() {
        let f = voted_tx().await;
        f.submitter.set_fail(true);
        deliver(&f, buy_event(&f), 13, 0).await;

        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Buying));
        assert_eq!(f.engine.is_degraded(&tx42()).await, Some(true));
        let failed = f
            .bus
            .recent(&NotificationFilter::kinds(vec![NotificationKind::Submission]));
        assert_eq!(failed.len(), 1);

        f.submitter.set_fail(false);
        f.engine
            .resubmit_buyer_ciphertext(SELLER, tx42())
            .await
            .unwrap();
        let (actor, action) = f.submitter.submitted().pop().unwrap();
        assert_eq!(actor, SELLER);
        assert!(matches!(action, Action::SubmitBuyerCiphertext { .. }));
    }

    // =========================================================================
    // Delivery guarantees
    // =========================================================================

    #[tokio::test]
    async fn test_duplicate_delivery_applies_once() {
        let f = voted_tx().await;
        let before = f.bus.notifications_sent();

        deliver(&f, vote(V2, true), 12, 1).await;
        deliver(&f, created(true), 10, 0).await;

        assert_eq!(f.bus.notifications_sent(), before);
        assert_eq!(transitions_to(&f, TxState::Voted), 1);
        assert_eq!(transitions_to(&f, TxState::Created), 1);
    }

    #[tokio::test]
    async fn test_event_for_unknown_transaction_is_reported() {
        let f = fixture();
        deliver(&f, vote(V1, true), 3, 0).await;
        assert_eq!(anomalies(&f), vec![AnomalyKind::UnknownTransaction]);
    }

    #[tokio::test]
    async fn test_early_event_is_reported_as_invalid() {
        let f = created_tx(true).await;
        deliver(
            &f,
            MarketEvent::DataConfirmed {
                tx_id: tx42(),
                buyer: BUYER,
                truth: true,
                state: 6,
            },
            11,
            0,
        )
        .await;
        assert_eq!(f.engine.state_of(&tx42()).await, Some(TxState::Created));
        assert_eq!(anomalies(&f), vec![AnomalyKind::InvalidTransition]);
    }

    #[tokio::test]
    async fn test_snapshot_restore_ignores_replayed_events() {
        let f = created_tx(true).await;
        deliver(
            &f,
            MarketEvent::VerifiersChosen {
                tx_id: tx42(),
                publish_id: PublishId::from("pub-1"),
                verifiers: vec![V1, V2, V3],
                state: 1,
            },
            11,
            0,
        )
        .await;
        deliver(&f, vote(V1, true), 12, 0).await;
        let snapshot = f.engine.snapshot().await;
        let bytes = snapshot.to_json().unwrap();

        let g = fixture();
        g.engine
            .restore(EngineSnapshot::from_json(&bytes).unwrap())
            .await
            .unwrap();
        assert_eq!(g.engine.state_of(&tx42()).await, Some(TxState::Created));

        // Replay from block 10: only the unseen vote changes anything.
        deliver(&g, created(true), 10, 0).await;
        deliver(&g, vote(V1, true), 12, 0).await;
        assert_eq!(g.bus.notifications_sent(), 0);

        deliver(&g, vote(V2, true), 12, 1).await;
        assert_eq!(transitions_to(&g, TxState::Voted), 1);
    }

    #[tokio::test]
    async fn test_restore_rejects_other_versions() {
        let f = fixture();
        let mut snapshot = f.engine.snapshot().await;
        snapshot.version = SNAPSHOT_VERSION + 1;
        let result = f.engine.restore(snapshot).await;
        assert!(matches!(
            result,
            Err(LifecycleError::IncompatibleSnapshot { .. })
        ));
    }

    // =========================================================================
    // Listings
    // =========================================================================

    #[tokio::test]
    async fn test_publish_stores_payloads_and_description_is_readable() {
        let f = fixture();
        f.engine
            .publish(
                SELLER,
                PublishRequest {
                    price: U256::from(100u64),
                    metadata: b"sealed".to_vec(),
                    description: b"weather data".to_vec(),
                    proofs: vec![b"sample".to_vec()],
                    verification_required: true,
                },
            )
            .await
            .unwrap();
        let (_, action) = f.submitter.submitted().pop().unwrap();
        let Action::Publish {
            description_ref,
            proof_refs,
            ..
        } = action
        else {
            panic!("expected a publish action");
        };
        assert_eq!(proof_refs.len(), 1);

        deliver(
            &f,
            MarketEvent::DataPublish {
                publish_id: PublishId::from("pub-9"),
                price: U256::from(100u64),
                description_ref,
                proof_refs,
                seller: SELLER,
                verification_required: true,
            },
            2,
            0,
        )
        .await;

        let description = f
            .engine
            .listing_description(&PublishId::from("pub-9"))
            .await
            .unwrap();
        assert_eq!(description, b"weather data".to_vec());
        let listed = f
            .bus
            .recent(&NotificationFilter::kinds(vec![NotificationKind::Listing]));
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_credit_above_maximum_is_refused() {
        let f = voted_tx().await;
        let result = f
            .engine
            .credit_verifier(BUYER, tx42(), V1, MAX_CREDIT + 1)
            .await;
        assert!(matches!(result, Err(LifecycleError::Rejected { .. })));
        f.engine
            .credit_verifier(BUYER, tx42(), V1, MAX_CREDIT)
            .await
            .unwrap();
    }
}
