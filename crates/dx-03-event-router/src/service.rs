//! Event Router - subscription registry and dispatch lanes

use crate::domain::{LaneKey, RoutedEvent, Subscription, SubscriptionId, SubscriptionScope};
use crate::ports::EventHandler;
use dashmap::DashMap;
use dx_01_event_decoder::EventName;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{Address, TransactionId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, trace, warn};

/// Router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    pub dispatched: u64,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Events no subscription matched.
    pub unrouted: u64,
    pub handler_failures: u64,
    pub active_lanes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    unrouted: AtomicU64,
    handler_failures: AtomicU64,
}

/// Sending side of a lane task.
struct Lane {
    generation: u64,
    sender: mpsc::UnboundedSender<Arc<RoutedEvent>>,
    /// Events sent to the lane and not yet handled.
    queued: Arc<AtomicUsize>,
}

struct RouterInner {
    subscriptions: DashMap<SubscriptionId, Arc<Subscription>>,
    by_transaction: DashMap<TransactionId, Vec<SubscriptionId>>,
    lanes: DashMap<LaneKey, Lane>,
    fallback: RwLock<Option<Arc<dyn EventHandler>>>,
    seq: AtomicU64,
    lane_generation: AtomicU64,
    counters: Counters,
    /// Events dispatched but not yet fully handled.
    in_progress: AtomicUsize,
    idle: Notify,
}

/// Dispatches routed events onto per-key lanes.
///
/// Cloning is cheap; clones share the registry and the lanes.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RouterInner {
                subscriptions: DashMap::new(),
                by_transaction: DashMap::new(),
                lanes: DashMap::new(),
                fallback: RwLock::new(None),
                seq: AtomicU64::new(0),
                lane_generation: AtomicU64::new(0),
                counters: Counters::default(),
                in_progress: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn subscribe(
        &self,
        actor: Address,
        event: EventName,
        scope: SubscriptionScope,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let subscription = Subscription {
            id,
            actor,
            event,
            scope,
            handler,
            seq: self.inner.seq.fetch_add(1, Ordering::SeqCst),
        };
        if let Some(tx_id) = subscription.transaction_id() {
            self.inner.by_transaction.entry(tx_id).or_default().push(id);
        }
        debug!(
            subscription_id = %id,
            actor = %actor,
            event = %event,
            scope = ?scope,
            handler = subscription.handler.label(),
            "Created subscription"
        );
        self.inner.subscriptions.insert(id, Arc::new(subscription));
        id
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let Some((_, subscription)) = self.inner.subscriptions.remove(id) else {
            return false;
        };
        if let Some(tx_id) = subscription.transaction_id() {
            if let Some(mut ids) = self.inner.by_transaction.get_mut(&tx_id) {
                ids.retain(|other| other != id);
            }
        }
        debug!(subscription_id = %id, "Removed subscription");
        true
    }

    /// Remove every subscription scoped to `tx_id` and close its lane.
    /// Events already queued on the lane still run, against no subscribers.
    pub fn unsubscribe_transaction(&self, tx_id: &TransactionId) -> usize {
        let removed = match self.inner.by_transaction.remove(tx_id) {
            Some((_, ids)) => ids
                .iter()
                .filter(|id| self.inner.subscriptions.remove(id).is_some())
                .count(),
            None => 0,
        };
        self.inner.lanes.remove(&LaneKey::Transaction(*tx_id));
        debug!(%tx_id, removed, "Removed all subscriptions for transaction");
        removed
    }

    /// Handler for events no subscription matches.
    pub fn set_fallback(&self, handler: Arc<dyn EventHandler>) {
        *self.inner.fallback.write() = Some(handler);
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    pub fn transaction_subscription_count(&self, tx_id: &TransactionId) -> usize {
        self.inner
            .by_transaction
            .get(tx_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    /// Queue `event` on its lane. Never waits for handlers.
    ///
    /// A lane closes once drained unless subscriptions scoped to its
    /// transaction remain, so events for transactions nobody tracks leave
    /// nothing behind.
    pub fn dispatch(&self, event: RoutedEvent) {
        let key = event.lane_key();
        let event = Arc::new(event);
        self.inner.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        self.inner.in_progress.fetch_add(1, Ordering::SeqCst);
        trace!(lane = %key, event = %event.name(), position = %event.position(), "Dispatching");

        let mut lane = self
            .inner
            .lanes
            .entry(key)
            .or_insert_with(|| self.spawn_lane(key));
        lane.queued.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(event)) = lane.sender.send(event) {
            warn!(lane = %key, "Lane task ended unexpectedly, restarting it");
            let fresh = self.spawn_lane(key);
            fresh.queued.fetch_add(1, Ordering::SeqCst);
            if fresh.sender.send(event).is_err() {
                self.inner.finish_one();
            }
            *lane = fresh;
        }
    }

    pub fn stats(&self) -> RouterStats {
        let counters = &self.inner.counters;
        RouterStats {
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            unrouted: counters.unrouted.load(Ordering::Relaxed),
            handler_failures: counters.handler_failures.load(Ordering::Relaxed),
            active_lanes: self.inner.lanes.len(),
        }
    }

    /// Resolves once every dispatched event has been handled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_progress.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close every lane. Queued events still run.
    pub fn shutdown(&self) {
        self.inner.lanes.clear();
    }

    fn spawn_lane(&self, key: LaneKey) -> Lane {
        let (sender, receiver) = mpsc::unbounded_channel();
        let generation = self.inner.lane_generation.fetch_add(1, Ordering::Relaxed);
        let queued = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_lane(
            Arc::clone(&self.inner),
            key,
            generation,
            Arc::clone(&queued),
            receiver,
        ));
        trace!(lane = %key, generation, "Lane opened");
        Lane {
            generation,
            sender,
            queued,
        }
    }
}

async fn run_lane(
    inner: Arc<RouterInner>,
    key: LaneKey,
    generation: u64,
    queued: Arc<AtomicUsize>,
    mut receiver: mpsc::UnboundedReceiver<Arc<RoutedEvent>>,
) {
    while let Some(event) = receiver.recv().await {
        inner.deliver(key, event).await;
        if queued.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.close_if_drained(key, generation);
        }
        inner.finish_one();
    }
    trace!(lane = %key, generation, "Lane task ended");
}

impl RouterInner {
    /// Drop the lane's sender when nothing is queued and nothing keeps it.
    /// Runs under the shard lock `dispatch` queues under.
    fn close_if_drained(&self, key: LaneKey, generation: u64) {
        let closed = self
            .lanes
            .remove_if(&key, |_, lane| {
                lane.generation == generation
                    && lane.queued.load(Ordering::SeqCst) == 0
                    && !self.keeps_lane(&key)
            })
            .is_some();
        if closed {
            trace!(lane = %key, generation, "Lane closed");
        }
    }

    fn keeps_lane(&self, key: &LaneKey) -> bool {
        match key {
            LaneKey::Transaction(tx_id) => self
                .by_transaction
                .get(tx_id)
                .map(|ids| !ids.is_empty())
                .unwrap_or(false),
            LaneKey::Actor(_) | LaneKey::Contract(_) => false,
        }
    }

    fn finish_one(&self) {
        if self.in_progress.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn deliver(&self, key: LaneKey, event: Arc<RoutedEvent>) {
        let mut matching: Vec<Arc<Subscription>> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().matches(&event))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if matching.is_empty() {
            self.counters.unrouted.fetch_add(1, Ordering::Relaxed);
            let fallback = self.fallback.read().clone();
            match fallback {
                Some(handler) => {
                    self.invoke(key, handler, event).await;
                }
                None => debug!(lane = %key, event = %event.name(), "No subscriber for event"),
            }
            return;
        }

        matching.sort_by_key(|subscription| subscription.seq);
        for subscription in matching {
            // An earlier handler of this event may have removed it.
            if !self.subscriptions.contains_key(&subscription.id) {
                continue;
            }
            self.invoke(key, Arc::clone(&subscription.handler), Arc::clone(&event))
                .await;
        }
    }

    /// Run one handler in its own task so a panic stays contained.
    async fn invoke(&self, key: LaneKey, handler: Arc<dyn EventHandler>, event: Arc<RoutedEvent>) {
        let label = handler.label().to_string();
        let name = event.name();
        let position = event.position();

        match tokio::spawn(async move { handler.handle(&event).await }).await {
            Ok(Ok(())) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    lane = %key,
                    handler = %label,
                    event = %name,
                    position = %position,
                    error = %e,
                    "Handler failed"
                );
            }
            Err(join_error) => {
                self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    lane = %key,
                    handler = %label,
                    event = %name,
                    position = %position,
                    panicked = join_error.is_panic(),
                    "Handler aborted"
                );
            }
        }
    }
}
