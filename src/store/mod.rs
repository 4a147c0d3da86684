// ============================================================================
// Order Store - durable source of truth for orders
// ============================================================================
//
// OrderStore is the only authoritative copy of an order. Adapters:
// - ScyllaOrderStore:  one row per order in ScyllaDB
// - InMemoryOrderStore: process-local, for development and tests
//
// ============================================================================

mod in_memory;
mod scylla_store;

use async_trait::async_trait;

use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::health::ComponentHealth;
use crate::utils::IsTransient;

pub use in_memory::InMemoryOrderStore;
pub use scylla_store::ScyllaOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order already exists: {0}")]
    Conflict(OrderId),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Stored order {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Optional, independent filters. Both present means AND, neither means all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<String>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |status| order.status == status)
            && self
                .customer_id
                .as_deref()
                .map_or(true, |customer_id| order.customer_id == customer_id)
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order. Fails with `Conflict` if the id is taken.
    async fn insert(&self, order: &Order) -> Result<OrderId, StoreError>;

    async fn get_by_id(&self, id: &OrderId) -> Result<Order, StoreError>;

    /// Ordering of the result is unspecified.
    async fn list_filtered(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    /// Replace the stored record for `order.id` as a single atomic write.
    /// Fails with `NotFound` if the id does not exist.
    async fn update(&self, order: &Order) -> Result<(), StoreError>;

    async fn health_check(&self) -> ComponentHealth;
}
