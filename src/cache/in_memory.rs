use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{CacheError, OrderCache};
use crate::domain::order::{Order, OrderId};
use crate::health::{ComponentHealth, HealthStatus};

/// Process-local cache with the same version guard as the Redis adapter.
#[derive(Default)]
pub struct InMemoryOrderCache {
    entries: RwLock<HashMap<OrderId, Order>>,
    unavailable: AtomicBool,
}

impl InMemoryOrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderCache for InMemoryOrderCache {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, CacheError> {
        self.check_available()?;
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn put(&self, id: &OrderId, order: &Order) -> Result<bool, CacheError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;

        if let Some(current) = entries.get(id) {
            if current.version() > order.version() {
                return Ok(false);
            }
        }

        entries.insert(id.clone(), order.clone());
        Ok(true)
    }

    async fn invalidate(&self, id: &OrderId) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        match self.check_available() {
            Ok(()) => ComponentHealth::new("cache", HealthStatus::Healthy).with_details("in-memory"),
            Err(e) => ComponentHealth::new("cache", HealthStatus::Degraded(e.to_string())),
        }
    }
}
