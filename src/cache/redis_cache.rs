use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{CacheError, OrderCache};
use crate::domain::order::{Order, OrderId};
use crate::health::{ComponentHealth, HealthStatus};

// ============================================================================
// Redis Order Cache
// ============================================================================
//
// Each order lives in a hash `orders::{id}` with two fields:
//   version - updated_at in epoch millis
//   body    - the order as JSON
//
// The guarded put runs as a Lua script so the version comparison and the
// write are one atomic step on the server.
//
// ============================================================================

const PUT_IF_NEWER: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if current and tonumber(current) > tonumber(ARGV[1]) then
    return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[1], 'body', ARGV[2])
return 1
"#;

pub struct RedisOrderCache {
    conn: ConnectionManager,
    put_script: Script,
}

impl RedisOrderCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;

        tracing::info!(redis_url = %redis_url, "Connected to Redis cache");

        Ok(Self {
            conn,
            put_script: Script::new(PUT_IF_NEWER),
        })
    }

    fn key(id: &OrderId) -> String {
        format!("orders::{}", id)
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, CacheError> {
        let mut conn = self.conn.clone();
        let body: Option<String> = conn.hget(Self::key(id), "body").await.map_err(unavailable)?;

        body.map(|body| {
            serde_json::from_str(&body).map_err(|e| CacheError::Corrupt {
                id: id.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn put(&self, id: &OrderId, order: &Order) -> Result<bool, CacheError> {
        let body = serde_json::to_string(order).map_err(|e| CacheError::Corrupt {
            id: id.clone(),
            reason: e.to_string(),
        })?;

        let mut conn = self.conn.clone();
        let written: i32 = self
            .put_script
            .key(Self::key(id))
            .arg(order.version())
            .arg(body)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(written == 1)
    }

    async fn invalidate(&self, id: &OrderId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(id)).await.map_err(unavailable)?;
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        let mut conn = self.conn.clone();
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;

        match pong {
            Ok(_) => ComponentHealth::new("cache", HealthStatus::Healthy),
            // the service keeps working on cache misses
            Err(e) => ComponentHealth::new("cache", HealthStatus::Degraded(e.to_string())),
        }
    }
}
