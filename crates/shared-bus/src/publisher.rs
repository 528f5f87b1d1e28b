//! # Notification Publisher
//!
//! Defines the publishing side of the notification bus.

use crate::notifications::{Notification, NotificationFilter};
use crate::subscriber::{NotificationStream, NotificationSubscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Push-only sink the lifecycle engine reports to.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification. Returns the number of subscribers that got it.
    async fn notify(&self, notification: Notification) -> usize;

    /// Total notifications accepted.
    fn notifications_sent(&self) -> u64;
}

/// In-memory notification bus.
///
/// Uses `tokio::sync::broadcast` so any number of consumers can watch.
/// Keeps a bounded history of the most recent notifications so a consumer
/// attaching late can catch up.
pub struct InMemoryNotificationBus {
    sender: broadcast::Sender<Notification>,

    /// Active subscription count by filter key.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    history: RwLock<VecDeque<Notification>>,

    sent: AtomicU64,

    capacity: usize,
}

impl InMemoryNotificationBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            sent: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to notifications matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: NotificationFilter) -> NotificationSubscription {
        let receiver = self.sender.subscribe();
        let key = format!("{:?}/{:?}", filter.kinds, filter.transactions);

        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(key.clone()).or_insert(0) += 1;
        }

        debug!(filter = %key, "New notification subscription");

        NotificationSubscription::new(receiver, filter, self.subscriptions.clone(), key)
    }

    /// A `Stream` of notifications matching a filter.
    #[must_use]
    pub fn stream(&self, filter: NotificationFilter) -> NotificationStream {
        NotificationStream::new(self.sender.subscribe(), filter)
    }

    /// Most recent notifications matching `filter`, oldest first.
    pub fn recent(&self, filter: &NotificationFilter) -> Vec<Notification> {
        self.history
            .read()
            .map(|h| h.iter().filter(|n| filter.matches(n)).cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn remember(&self, notification: &Notification) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut history) = self.history.write() {
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }
    }
}

impl Default for InMemoryNotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationBus {
    async fn notify(&self, notification: Notification) -> usize {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.remember(&notification);

        let kind = notification.kind();
        let tx = notification.transaction_id;

        match self.sender.send(notification) {
            Ok(receivers) => {
                debug!(kind = ?kind, transaction = ?tx, receivers, "Notification sent");
                receivers
            }
            Err(_) => {
                trace!(kind = ?kind, transaction = ?tx, "Notification has no live subscribers");
                0
            }
        }
    }

    fn notifications_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{AnomalyKind, NotificationKind};
    use shared_types::TransactionId;

    fn anomaly(tx: u64) -> Notification {
        Notification::anomaly(
            Some(TransactionId::from(tx)),
            Some(10),
            AnomalyKind::UnknownTransaction,
            "Vote",
            "not active",
        )
    }

    #[tokio::test]
    async fn test_notify_no_subscribers() {
        let bus = InMemoryNotificationBus::new();

        let receivers = bus.notify(anomaly(1)).await;
        assert_eq!(receivers, 0);
        assert_eq!(bus.notifications_sent(), 1);
    }

    #[tokio::test]
    async fn test_notify_with_subscribers() {
        let bus = InMemoryNotificationBus::new();

        let _sub1 = bus.subscribe(NotificationFilter::all());
        let _sub2 = bus.subscribe(NotificationFilter::kinds(vec![NotificationKind::Failure]));

        let receivers = bus.notify(anomaly(1)).await;

        // Broadcast reaches every receiver; filtering happens on receive.
        assert_eq!(receivers, 2);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = InMemoryNotificationBus::with_capacity(2);

        bus.notify(anomaly(1)).await;
        bus.notify(anomaly(2)).await;
        bus.notify(anomaly(3)).await;

        let recent = bus.recent(&NotificationFilter::all());
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].transaction_id, Some(TransactionId::from(2)));
        assert_eq!(
            bus.recent(&NotificationFilter::transaction(TransactionId::from(3)))
                .len(),
            1
        );
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryNotificationBus::default();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.notifications_sent(), 0);
    }
}
