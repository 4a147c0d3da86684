use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::value::Row;
use std::sync::Arc;

use super::{OrderFilter, OrderStore, StoreError};
use crate::domain::order::{Order, OrderId, OrderItem};
use crate::health::{ComponentHealth, HealthStatus};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// One row per order:
//
//   orders(id text PRIMARY KEY, customer_id text, status text,
//          items text, created_at timestamp, updated_at timestamp)
//
// `items` holds the JSON array `[{sku, quantity, price}]`.
//
// Inserts and updates are lightweight transactions (IF NOT EXISTS / IF EXISTS)
// so id collisions and updates of unknown ids are detected by the server.
// An update writes every column of a single row in one statement, which
// Scylla applies atomically and in isolation.
//
// ============================================================================

const SELECT_COLUMNS: &str = "SELECT id, customer_id, status, items, created_at, updated_at FROM orders";

type OrderRow = (String, String, String, String, DateTime<Utc>, DateTime<Utc>);

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

impl ScyllaOrderStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Create keyspace, table and indexes if they are missing, then switch the
    /// session to the keyspace.
    pub async fn ensure_schema(session: &Session, keyspace: &str) -> anyhow::Result<()> {
        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    keyspace
                ),
                &[],
            )
            .await?;

        session.use_keyspace(keyspace, false).await?;

        session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS orders (
                    id text PRIMARY KEY,
                    customer_id text,
                    status text,
                    items text,
                    created_at timestamp,
                    updated_at timestamp
                )",
                &[],
            )
            .await?;

        session
            .query_unpaged("CREATE INDEX IF NOT EXISTS orders_by_status ON orders (status)", &[])
            .await?;
        session
            .query_unpaged("CREATE INDEX IF NOT EXISTS orders_by_customer ON orders (customer_id)", &[])
            .await?;

        tracing::info!(keyspace = %keyspace, "✅ Order schema ready");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn insert(&self, order: &Order) -> Result<OrderId, StoreError> {
        let items = encode_items(order)?;

        let result = self
            .session
            .query_unpaged(
                "INSERT INTO orders (id, customer_id, status, items, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                (
                    order.id.as_str(),
                    order.customer_id.as_str(),
                    order.status.as_str(),
                    items,
                    order.created_at,
                    order.updated_at,
                ),
            )
            .await
            .map_err(backend)?;

        if !lwt_applied(result)? {
            return Err(StoreError::Conflict(order.id.clone()));
        }

        tracing::debug!(order_id = %order.id, "Inserted order row");
        Ok(order.id.clone())
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<Order, StoreError> {
        let result = self
            .session
            .query_unpaged(format!("{} WHERE id = ?", SELECT_COLUMNS), (id.as_str(),))
            .await
            .map_err(backend)?;

        let rows_result = result.into_rows_result().map_err(backend)?;
        match rows_result.maybe_first_row::<OrderRow>().map_err(backend)? {
            Some(row) => decode_row(row),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn list_filtered(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(status.as_str().to_string());
        }
        if let Some(customer_id) = &filter.customer_id {
            clauses.push("customer_id = ?");
            values.push(customer_id.clone());
        }

        let cql = match clauses.len() {
            0 => SELECT_COLUMNS.to_string(),
            1 => format!("{} WHERE {}", SELECT_COLUMNS, clauses[0]),
            // two indexed columns: Scylla needs ALLOW FILTERING for the conjunction
            _ => format!("{} WHERE {} ALLOW FILTERING", SELECT_COLUMNS, clauses.join(" AND ")),
        };

        let pager = self.session.query_iter(cql, values).await.map_err(backend)?;
        let mut rows = pager.rows_stream::<OrderRow>().map_err(backend)?;

        let mut orders = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(backend)? {
            orders.push(decode_row(row)?);
        }
        Ok(orders)
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let items = encode_items(order)?;

        let result = self
            .session
            .query_unpaged(
                "UPDATE orders
                 SET customer_id = ?, status = ?, items = ?, created_at = ?, updated_at = ?
                 WHERE id = ? IF EXISTS",
                (
                    order.customer_id.as_str(),
                    order.status.as_str(),
                    items,
                    order.created_at,
                    order.updated_at,
                    order.id.as_str(),
                ),
            )
            .await
            .map_err(backend)?;

        if !lwt_applied(result)? {
            return Err(StoreError::NotFound(order.id.clone()));
        }

        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        match self
            .session
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
        {
            Ok(_) => ComponentHealth::new("store", HealthStatus::Healthy),
            Err(e) => ComponentHealth::new("store", HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// First column of an LWT result is `[applied]`; a rejected INSERT also
/// carries the existing row, so the row is read untyped.
fn lwt_applied(result: QueryResult) -> Result<bool, StoreError> {
    let rows_result = result.into_rows_result().map_err(backend)?;
    let row = rows_result.maybe_first_row::<Row>().map_err(backend)?;

    Ok(row
        .and_then(|row| row.columns.into_iter().next().flatten())
        .and_then(|applied| applied.as_boolean())
        .unwrap_or(false))
}

fn encode_items(order: &Order) -> Result<String, StoreError> {
    serde_json::to_string(&order.items).map_err(|e| StoreError::Corrupt {
        id: order.id.to_string(),
        reason: e.to_string(),
    })
}

fn decode_row(row: OrderRow) -> Result<Order, StoreError> {
    let (id, customer_id, status, items, created_at, updated_at) = row;

    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };

    let status = status.parse().map_err(|e: crate::domain::order::OrderError| corrupt(e.to_string()))?;
    let items: Vec<OrderItem> = serde_json::from_str(&items).map_err(|e| corrupt(e.to_string()))?;

    Ok(Order {
        id: OrderId::from(id),
        customer_id,
        status,
        items,
        created_at,
        updated_at,
    })
}
