use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{OrderFilter, OrderStore, StoreError};
use crate::domain::order::{Order, OrderId};
use crate::health::{ComponentHealth, HealthStatus};

/// Process-local store. `list_filtered` returns orders in insertion order;
/// callers must not rely on that.
#[derive(Default)]
pub struct InMemoryOrderStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: Vec<Order>,
    index: HashMap<OrderId, usize>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<OrderId, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.index.contains_key(&order.id) {
            return Err(StoreError::Conflict(order.id.clone()));
        }

        let slot = inner.orders.len();
        inner.orders.push(order.clone());
        inner.index.insert(order.id.clone(), slot);
        Ok(order.id.clone())
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<Order, StoreError> {
        let inner = self.inner.read().await;
        inner
            .index
            .get(id)
            .map(|&slot| inner.orders[slot].clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list_filtered(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .iter()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect())
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let slot = *inner
            .index
            .get(&order.id)
            .ok_or_else(|| StoreError::NotFound(order.id.clone()))?;

        // whole-record swap under the write lock
        inner.orders[slot] = order.clone();
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        let count = self.inner.read().await.orders.len();
        ComponentHealth::new("store", HealthStatus::Healthy)
            .with_details(format!("in-memory, {} orders", count))
    }
}
