//! Router subscriptions of the engine

use super::LifecycleEngine;
use crate::domain::{MachineHandle, Stamp, TransactionStateMachine, Trigger};
use crate::error::LifecycleError;
use crate::ports::LifecycleApi;
use async_trait::async_trait;
use dx_01_event_decoder::{EventName, MarketEvent};
use dx_03_event_router::{
    EventHandler, HandlerError, HandlerResult, RoutedEvent, SubscriptionScope,
};
use dx_07_action_submitter::{ActionKey, ActionKind, ActionScope};
use shared_bus::{AnomalyKind, Notification, NotificationPayload};
use shared_types::{Address, Listing, PublishId, TransactionId};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Events a bound transaction subscribes to.
const TRANSACTION_EVENTS: [EventName; 9] = [
    EventName::TransactionCreate,
    EventName::VerifiersChosen,
    EventName::Vote,
    EventName::Buy,
    EventName::ReadyForDownload,
    EventName::DataConfirmed,
    EventName::ArbitrationResult,
    EventName::TransactionClose,
    EventName::VerifierDisable,
];

pub(super) fn install_global_handlers(engine: &Arc<LifecycleEngine>) {
    let me = Arc::downgrade(engine);
    let router = &engine.router;
    router.subscribe(
        Address::ZERO,
        EventName::DataPublish,
        SubscriptionScope::Any,
        Arc::new(ListingHandler { engine: me.clone() }),
    );
    let accounts = Arc::new(AccountHandler { engine: me.clone() });
    router.subscribe(
        Address::ZERO,
        EventName::Approval,
        SubscriptionScope::Any,
        accounts.clone(),
    );
    router.subscribe(
        Address::ZERO,
        EventName::RegisterVerifier,
        SubscriptionScope::Any,
        accounts,
    );
    router.set_fallback(Arc::new(UnroutedHandler { engine: me }));
}

/// Subscribe a bound machine to the events of its transaction.
pub(super) fn subscribe_transaction(
    engine: &LifecycleEngine,
    tx_id: TransactionId,
    machine: &TransactionStateMachine,
    handle: &MachineHandle,
) {
    let handler = Arc::new(TransactionHandler {
        engine: engine.me.clone(),
        machine: Arc::downgrade(handle),
        tx_id,
    });
    for event in TRANSACTION_EVENTS {
        // The party that waits for the event.
        let actor = match event {
            EventName::Buy | EventName::DataConfirmed => machine.seller().unwrap_or(machine.buyer()),
            _ => machine.buyer(),
        };
        engine.router.subscribe(
            actor,
            event,
            SubscriptionScope::Transaction(tx_id),
            handler.clone(),
        );
    }
}

/// Key of the action an event is the ledger's reaction to.
pub(super) fn reaction_key(event: &MarketEvent, seller: Option<Address>) -> Option<ActionKey> {
    use ActionKind as K;
    let tx = |id: &TransactionId| ActionScope::Transaction(*id);
    let key = match event {
        MarketEvent::DataPublish {
            seller,
            description_ref,
            ..
        } => ActionKey::new(*seller, K::Publish, ActionScope::Content(description_ref.clone())),
        MarketEvent::Approval { owner, .. } => {
            ActionKey::new(*owner, K::ApproveTransfer, ActionScope::Account)
        }
        MarketEvent::RegisterVerifier { verifier } => {
            ActionKey::new(*verifier, K::RegisterAsVerifier, ActionScope::Account)
        }
        MarketEvent::TransactionCreate {
            buyer, publish_id, ..
        } => ActionKey::new(*buyer, K::PrepareToBuy, ActionScope::Listing(publish_id.clone())),
        MarketEvent::Vote {
            tx_id, verifier, ..
        } => ActionKey::new(*verifier, K::Vote, tx(tx_id)),
        MarketEvent::Buy { tx_id, buyer, .. } => ActionKey::new(*buyer, K::BuyData, tx(tx_id)),
        MarketEvent::ReadyForDownload { tx_id, .. } => {
            ActionKey::new(seller?, K::SubmitBuyerCiphertext, tx(tx_id))
        }
        MarketEvent::DataConfirmed { tx_id, buyer, .. } => {
            ActionKey::new(*buyer, K::ConfirmDataTruth, tx(tx_id))
        }
        MarketEvent::ArbitrationResult {
            tx_id, arbitrator, ..
        } => ActionKey::new(*arbitrator, K::Arbitrate, tx(tx_id)),
        MarketEvent::VerifiersChosen { .. }
        | MarketEvent::TransactionClose { .. }
        | MarketEvent::VerifierDisable { .. } => return None,
    };
    Some(key)
}

/// The contract's state code carried by the event.
fn ledger_state(event: &MarketEvent) -> Option<u8> {
    match event {
        MarketEvent::TransactionCreate { state, .. }
        | MarketEvent::VerifiersChosen { state, .. }
        | MarketEvent::Vote { state, .. }
        | MarketEvent::Buy { state, .. }
        | MarketEvent::ReadyForDownload { state, .. }
        | MarketEvent::DataConfirmed { state, .. }
        | MarketEvent::ArbitrationResult { state, .. }
        | MarketEvent::TransactionClose { state, .. } => Some(*state),
        MarketEvent::DataPublish { .. }
        | MarketEvent::Approval { .. }
        | MarketEvent::RegisterVerifier { .. }
        | MarketEvent::VerifierDisable { .. } => None,
    }
}

impl LifecycleEngine {
    /// Apply a ledger event to one machine and settle the outcome.
    pub(super) async fn drive(&self, handle: &MachineHandle, routed: &RoutedEvent) -> HandlerResult {
        let Some(trigger) = Trigger::from_event(&routed.event) else {
            return Ok(());
        };
        let position = routed.position();
        let event = routed.name().as_str();

        let mut machine = handle.lock().await;
        if let Some(key) = reaction_key(&routed.event, machine.seller()) {
            self.submitter.confirm(&key);
        }

        let outcome = match machine.apply(trigger, Stamp::Log(position)) {
            Ok(applied) => {
                self.settle(handle, &mut machine, applied, ledger_state(&routed.event))
                    .await
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_rejected_event() => {
                warn!(tx_id = ?machine.tx_id(), state = %machine.state(), event, %position, error = %e, "Event dropped");
                let kind = if matches!(e, LifecycleError::UnknownTransaction { .. }) {
                    AnomalyKind::UnknownTransaction
                } else {
                    AnomalyKind::InvalidTransition
                };
                self.report_anomaly(
                    machine.tx_id().or(routed.transaction_id()),
                    Some(position.block_number),
                    kind,
                    event,
                    e.to_string(),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                self.degrade(&mut machine, event, Some(position.block_number), e)
                    .await
            }
        }
    }

    async fn on_created(&self, buyer: Address, routed: &RoutedEvent) -> HandlerResult {
        let MarketEvent::TransactionCreate {
            tx_id,
            publish_id,
            buyer: event_buyer,
            ..
        } = &routed.event
        else {
            return Ok(());
        };
        if *event_buyer != buyer {
            return Ok(());
        }
        if let Some(handle) = self.registry.get(tx_id) {
            return self.drive(&handle, routed).await;
        }
        let handle = match self.registry.bind_pending(&buyer, publish_id, *tx_id) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!(%tx_id, %buyer, %publish_id, "Transaction created for a purchase not tracked here");
                return Ok(());
            }
            Err(e) => {
                warn!(%tx_id, %buyer, %publish_id, error = %e, "Purchase left pending");
                self.report_anomaly(
                    Some(*tx_id),
                    Some(routed.position().block_number),
                    AnomalyKind::HandlerFailure,
                    routed.name().as_str(),
                    e.to_string(),
                )
                .await;
                return Err(HandlerError::Failed(e.to_string()));
            }
        };

        let result = self.drive(&handle, routed).await;
        self.release_creation_subscription(&buyer);
        result
    }

    /// Watch for `TransactionCreate` of `buyer`'s purchases. Called with the
    /// pending purchase already registered.
    pub(super) fn ensure_creation_subscription(&self, buyer: Address) {
        let mut subscriptions = self.creation_subscriptions.lock();
        if subscriptions.contains_key(&buyer) {
            return;
        }
        let id = self.router.subscribe(
            buyer,
            EventName::TransactionCreate,
            SubscriptionScope::Actor,
            Arc::new(CreationHandler {
                engine: self.me.clone(),
                buyer,
            }),
        );
        subscriptions.insert(buyer, id);
    }

    /// Drop the creation subscription once `buyer` has no pending purchase.
    pub(super) fn release_creation_subscription(&self, buyer: &Address) {
        let mut subscriptions = self.creation_subscriptions.lock();
        if self.registry.buyer_has_pending(buyer) {
            return;
        }
        if let Some(id) = subscriptions.remove(buyer) {
            self.router.unsubscribe(&id);
        }
    }

    pub(super) fn ensure_approval_subscription(&self, buyer: Address) {
        let mut subscriptions = self.approval_subscriptions.lock();
        if subscriptions.contains_key(&buyer) {
            return;
        }
        let id = self.router.subscribe(
            buyer,
            EventName::Approval,
            SubscriptionScope::Actor,
            Arc::new(PurchaseApprovalHandler {
                engine: self.me.clone(),
                buyer,
            }),
        );
        subscriptions.insert(buyer, id);
    }

    /// Forget the purchases `buyer` still awaits approval for.
    pub(super) fn take_awaiting_approval(&self, buyer: &Address) -> Vec<PublishId> {
        let mut awaiting = self.awaiting_approval.lock();
        let publish_ids = awaiting.remove(buyer).unwrap_or_default();
        if let Some(id) = self.approval_subscriptions.lock().remove(buyer) {
            self.router.unsubscribe(&id);
        }
        publish_ids
    }

    async fn on_purchase_approval(&self, buyer: Address, routed: &RoutedEvent) -> HandlerResult {
        let MarketEvent::Approval { owner, spender, .. } = &routed.event else {
            return Ok(());
        };
        if *owner != buyer || *spender != self.config.protocol_contract {
            return Ok(());
        }

        for publish_id in self.take_awaiting_approval(&buyer) {
            info!(%buyer, %publish_id, "Approval observed, preparing to buy");
            if let Err(e) = self.prepare_to_buy(buyer, publish_id.clone()).await {
                warn!(%buyer, %publish_id, error = %e, "Prepare to buy failed");
                let key = ActionKey::new(buyer, ActionKind::PrepareToBuy, ActionScope::Listing(publish_id));
                self.notify_submission_failed(&key, e.to_string()).await;
            }
        }
        Ok(())
    }

    async fn on_listing(&self, routed: &RoutedEvent) -> HandlerResult {
        let MarketEvent::DataPublish {
            publish_id,
            price,
            description_ref,
            proof_refs,
            seller,
            verification_required,
        } = &routed.event
        else {
            return Ok(());
        };
        if let Some(key) = reaction_key(&routed.event, None) {
            self.submitter.confirm(&key);
        }

        let block = routed.position().block_number;
        let recorded = self.listings.insert(Listing {
            publish_id: publish_id.clone(),
            price: *price,
            seller: *seller,
            metadata_ref: description_ref.clone(),
            proof_refs: proof_refs.clone(),
            verification_required: *verification_required,
            published_at: block,
        });
        if !recorded {
            return Ok(());
        }
        info!(%publish_id, %seller, %price, verification_required, "Listing published");
        self.sink
            .notify(Notification {
                transaction_id: None,
                publish_id: Some(publish_id.clone()),
                from_state: None,
                to_state: None,
                block_number: Some(block),
                payload: NotificationPayload::ListingPublished {
                    seller: *seller,
                    price: price.to_string(),
                },
            })
            .await;
        Ok(())
    }

    async fn on_account_event(&self, routed: &RoutedEvent) -> HandlerResult {
        let actor = match &routed.event {
            MarketEvent::Approval { owner, .. } => *owner,
            MarketEvent::RegisterVerifier { verifier } => *verifier,
            _ => return Ok(()),
        };
        if let Some(key) = reaction_key(&routed.event, None) {
            self.submitter.confirm(&key);
        }
        debug!(%actor, event = %routed.name(), "Account event");
        self.sink
            .notify(Notification {
                transaction_id: None,
                publish_id: None,
                from_state: None,
                to_state: None,
                block_number: Some(routed.position().block_number),
                payload: NotificationPayload::ActorEvent {
                    actor,
                    event: routed.name().to_string(),
                },
            })
            .await;
        Ok(())
    }

    async fn on_unrouted(&self, routed: &RoutedEvent) -> HandlerResult {
        if let Some(key) = reaction_key(&routed.event, None) {
            self.submitter.confirm(&key);
        }
        let Some(tx_id) = routed.transaction_id() else {
            debug!(event = %routed.name(), position = %routed.position(), "No subscriber for event");
            return Ok(());
        };
        warn!(%tx_id, event = %routed.name(), position = %routed.position(), "Event for unknown transaction");
        self.report_anomaly(
            Some(tx_id),
            Some(routed.position().block_number),
            AnomalyKind::UnknownTransaction,
            routed.name().as_str(),
            format!("transaction {} is not active", tx_id),
        )
        .await;
        Ok(())
    }
}

fn upgrade(engine: &Weak<LifecycleEngine>) -> Result<Arc<LifecycleEngine>, HandlerError> {
    engine
        .upgrade()
        .ok_or_else(|| HandlerError::Failed(LifecycleError::ShutDown.to_string()))
}

/// Events of one bound transaction.
struct TransactionHandler {
    engine: Weak<LifecycleEngine>,
    machine: Weak<tokio::sync::Mutex<TransactionStateMachine>>,
    tx_id: TransactionId,
}

#[async_trait]
impl EventHandler for TransactionHandler {
    async fn handle(&self, event: &RoutedEvent) -> HandlerResult {
        let engine = upgrade(&self.engine)?;
        let Some(handle) = self.machine.upgrade() else {
            debug!(tx_id = %self.tx_id, "Machine already evicted");
            return Err(HandlerError::TargetGone);
        };
        engine.drive(&handle, event).await
    }

    fn label(&self) -> &str {
        "transaction"
    }
}

/// `TransactionCreate` for a buyer with pending purchases.
struct CreationHandler {
    engine: Weak<LifecycleEngine>,
    buyer: Address,
}

#[async_trait]
impl EventHandler for CreationHandler {
    async fn handle(&self, event: &RoutedEvent) -> HandlerResult {
        upgrade(&self.engine)?.on_created(self.buyer, event).await
    }

    fn label(&self) -> &str {
        "creation"
    }
}

/// The buyer's approval that precedes prepare-to-buy.
struct PurchaseApprovalHandler {
    engine: Weak<LifecycleEngine>,
    buyer: Address,
}

#[async_trait]
impl EventHandler for PurchaseApprovalHandler {
    async fn handle(&self, event: &RoutedEvent) -> HandlerResult {
        upgrade(&self.engine)?
            .on_purchase_approval(self.buyer, event)
            .await
    }

    fn label(&self) -> &str {
        "purchase-approval"
    }
}

struct ListingHandler {
    engine: Weak<LifecycleEngine>,
}

#[async_trait]
impl EventHandler for ListingHandler {
    async fn handle(&self, event: &RoutedEvent) -> HandlerResult {
        upgrade(&self.engine)?.on_listing(event).await
    }

    fn label(&self) -> &str {
        "listing"
    }
}

struct AccountHandler {
    engine: Weak<LifecycleEngine>,
}

#[async_trait]
impl EventHandler for AccountHandler {
    async fn handle(&self, event: &RoutedEvent) -> HandlerResult {
        upgrade(&self.engine)?.on_account_event(event).await
    }

    fn label(&self) -> &str {
        "account"
    }
}

struct UnroutedHandler {
    engine: Weak<LifecycleEngine>,
}

#[async_trait]
impl EventHandler for UnroutedHandler {
    async fn handle(&self, event: &RoutedEvent) -> HandlerResult {
        upgrade(&self.engine)?.on_unrouted(event).await
    }

    fn label(&self) -> &str {
        "unrouted"
    }
}
