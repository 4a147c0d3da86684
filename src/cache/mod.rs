// ============================================================================
// Order Cache - disposable read-through copy of single orders
// ============================================================================
//
// Cache-aside: reads check here first and populate on a miss; writes only
// ever invalidate. Entries carry the order's version (updated_at in millis)
// and a put never replaces a newer entry with an older one.
//
// Nothing here is authoritative. Every error is swallowed by the caller.
//
// ============================================================================

mod in_memory;
mod redis_cache;

use async_trait::async_trait;

use crate::domain::order::{Order, OrderId};
use crate::health::ComponentHealth;

pub use in_memory::InMemoryOrderCache;
pub use redis_cache::RedisOrderCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cached entry for {id} is unreadable: {reason}")]
    Corrupt { id: OrderId, reason: String },
}

#[async_trait]
pub trait OrderCache: Send + Sync {
    /// A miss is `Ok(None)`, never an error.
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, CacheError>;

    /// Store `order` unless a newer version is already cached.
    /// Returns whether the entry was written.
    async fn put(&self, id: &OrderId, order: &Order) -> Result<bool, CacheError>;

    /// Removing an absent key is a no-op.
    async fn invalidate(&self, id: &OrderId) -> Result<(), CacheError>;

    async fn health_check(&self) -> ComponentHealth;
}
