//! Error types for the Event Router

use thiserror::Error;

/// Error returned by an `EventHandler`. Logged and counted by the router,
/// never propagated to the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    /// The handler's target no longer exists (evicted transaction).
    #[error("Handler target is gone")]
    TargetGone,
}

pub type HandlerResult = Result<(), HandlerError>;
