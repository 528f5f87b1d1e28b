//! Driven Ports (SPI - Outbound Dependencies)

use crate::domain::RoutedEvent;
use crate::error::HandlerResult;
use async_trait::async_trait;

/// Receives routed events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &RoutedEvent) -> HandlerResult;

    /// Label used in logs.
    fn label(&self) -> &str {
        "handler"
    }
}
