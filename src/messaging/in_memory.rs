use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{EventPublisher, PublishError};
use crate::domain::order::{OrderId, StatusChangeEvent};
use crate::health::{ComponentHealth, HealthStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

impl PublishedMessage {
    pub fn event(&self) -> Result<StatusChangeEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Records every accepted message in send order. Used when running without a
/// broker and as the broker stand-in for tests.
#[derive(Default)]
pub struct InMemoryPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    failing: AtomicBool,
    fail_next: AtomicUsize,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reject the next `count` publishes.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn messages_for(&self, key: &OrderId) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.key == key.as_str())
            .cloned()
            .collect()
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, key: &OrderId, event: &StatusChangeEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;

        if self.should_fail() {
            return Err(PublishError::Submission("in-memory broker rejected message".into()));
        }

        self.messages.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        if self.failing.load(Ordering::SeqCst) {
            ComponentHealth::new("broker", HealthStatus::Unhealthy("in-memory broker failing".into()))
        } else {
            ComponentHealth::new("broker", HealthStatus::Healthy).with_details("in-memory")
        }
    }
}
