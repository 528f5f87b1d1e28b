//! # Notification Subscriber
//!
//! Defines the receiving side of the notification bus.

use crate::notifications::{Notification, NotificationFilter};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("Notification bus closed")]
    Closed,
}

/// A subscription handle. Cleaned up on drop.
pub struct NotificationSubscription {
    receiver: broadcast::Receiver<Notification>,
    filter: NotificationFilter,
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    key: String,
}

impl NotificationSubscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<Notification>,
        filter: NotificationFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            subscriptions,
            key,
        }
    }

    /// Next matching notification, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            let notification = match self.receiver.recv().await {
                Ok(n) => n,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, notifications dropped");
                    continue;
                }
            };

            if self.filter.matches(&notification) {
                return Some(notification);
            }
        }
    }

    /// Next matching notification without waiting.
    ///
    /// - `Ok(Some(n))` - a matching notification was queued
    /// - `Ok(None)` - nothing queued
    /// - `Err(SubscriptionError::Closed)` - the bus was dropped
    pub fn try_recv(&mut self) -> Result<Option<Notification>, SubscriptionError> {
        loop {
            let notification = match self.receiver.try_recv() {
                Ok(n) => n,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&notification) {
                return Ok(Some(notification));
            }
        }
    }

    /// Everything currently queued that matches.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(Some(n)) = self.try_recv() {
            out.push(n);
        }
        out
    }

    #[must_use]
    pub fn filter(&self) -> &NotificationFilter {
        &self.filter
    }
}

impl Drop for NotificationSubscription {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        if let Some(count) = subs.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.key);
            }
        }
        debug!(filter = %self.key, "Notification subscription dropped");
    }
}

/// `Stream` of matching notifications.
pub struct NotificationStream {
    inner: BroadcastStream<Notification>,
    filter: NotificationFilter,
}

impl NotificationStream {
    pub(crate) fn new(receiver: broadcast::Receiver<Notification>, filter: NotificationFilter) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
        }
    }

    #[must_use]
    pub fn filter(&self) -> &NotificationFilter {
        &self.filter
    }
}

impl Stream for NotificationStream {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(n))) => {
                    if self.filter.matches(&n) {
                        return Poll::Ready(Some(n));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Stream lagged, notifications dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{AnomalyKind, NotificationKind};
    use crate::publisher::{InMemoryNotificationBus, NotificationSink};
    use futures::StreamExt;
    use shared_types::{PublishId, TransactionId, TxState};
    use std::time::Duration;
    use tokio::time::timeout;

    fn transition(tx: u64, to: TxState) -> Notification {
        Notification::transition(
            TransactionId::from(tx),
            PublishId::from("p"),
            TxState::Created,
            to,
            5,
            "Vote",
            None,
        )
    }

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryNotificationBus::new();
        let mut sub = bus.subscribe(NotificationFilter::all());

        bus.notify(transition(42, TxState::Voted)).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("notification");
        assert!(received.is_transition_to(TxState::Voted));
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryNotificationBus::new();
        let mut sub = bus.subscribe(NotificationFilter::kinds(vec![NotificationKind::Transition]));

        bus.notify(Notification::anomaly(
            None,
            None,
            AnomalyKind::DecodeFailure,
            "Vote",
            "bad log",
        ))
        .await;
        bus.notify(transition(1, TxState::Voted)).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("notification");
        assert_eq!(received.kind(), NotificationKind::Transition);
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryNotificationBus::new();
        {
            let _a = bus.subscribe(NotificationFilter::all());
            let _b = bus.subscribe(NotificationFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_try_recv_and_drain() {
        let bus = InMemoryNotificationBus::new();
        let mut sub = bus.subscribe(NotificationFilter::transaction(TransactionId::from(7)));

        assert!(matches!(sub.try_recv(), Ok(None)));

        bus.notify(transition(7, TxState::Voted)).await;
        bus.notify(transition(8, TxState::Voted)).await;
        bus.notify(transition(7, TxState::Buying)).await;

        let drained = sub.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained[1].is_transition_to(TxState::Buying));
    }

    #[tokio::test]
    async fn test_stream_waits_for_matching_notification() {
        let bus = Arc::new(InMemoryNotificationBus::new());
        let mut stream = bus.stream(NotificationFilter::transaction(TransactionId::from(3)));

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.notify(transition(2, TxState::Voted)).await;
            publisher.notify(transition(3, TxState::Voted)).await;
        });

        let received = timeout(Duration::from_millis(500), stream.next())
            .await
            .expect("timeout")
            .expect("notification");
        assert_eq!(received.transaction_id, Some(TransactionId::from(3)));
    }
}
