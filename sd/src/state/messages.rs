//! State manager messages
//!
//! Commands and responses for the mailbox worker.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("State store worker is not running")]
    Unavailable,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands consumed by the state store worker, strictly in arrival order
#[derive(Debug)]
pub enum StateCommand {
    Get {
        key: String,
        reply: oneshot::Sender<StateResponse<Option<Value>>>,
    },

    /// Fire-and-forget write
    Set { key: String, value: Value },

    /// Close the store and stop the worker once everything queued before it is applied
    Quit { reply: oneshot::Sender<StateResponse<()>> },
}
