// ============================================================================
// Messaging - status-change event publishing
// ============================================================================
//
// Events are keyed by order id so the broker keeps per-order ordering.
// Publishing is fire-and-forget: `publish` fails only when the event cannot
// be serialized or handed to the producer.
//
// ============================================================================

mod in_memory;
mod redpanda;

use async_trait::async_trait;

use crate::domain::order::{OrderId, StatusChangeEvent};
use crate::health::ComponentHealth;

pub use in_memory::{InMemoryPublisher, PublishedMessage};
pub use redpanda::RedpandaClient;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to submit event to broker: {0}")]
    Submission(String),

    #[error("Circuit breaker open - broker unavailable")]
    CircuitOpen,

    #[error("Timed out submitting event after {0:?}")]
    TimedOut(std::time::Duration),
}

impl PublishError {
    pub fn reason(&self) -> &'static str {
        match self {
            PublishError::Serialization(_) => "serialization",
            PublishError::Submission(_) => "submission",
            PublishError::CircuitOpen => "circuit_open",
            PublishError::TimedOut(_) => "timeout",
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &OrderId, event: &StatusChangeEvent) -> Result<(), PublishError>;

    async fn health_check(&self) -> ComponentHealth;
}
