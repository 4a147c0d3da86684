use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::errors::{LifecycleError, STORE_UPDATE};
use super::keyed_lock::KeyedLocks;
use crate::cache::OrderCache;
use crate::domain::order::{Order, OrderId, OrderItem, OrderStatus, TransitionPolicy};
use crate::health::SystemHealth;
use crate::messaging::{EventPublisher, PublishError};
use crate::metrics::Metrics;
use crate::store::{OrderFilter, OrderStore, StoreError};
use crate::utils::{retry_on_transient, with_timeout, RetryConfig};

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub topic: String,
    pub call_timeout: Duration,
    pub cache_timeout: Duration,
    pub read_retry: RetryConfig,
    pub transition_policy: TransitionPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            topic: "orders.events".to_string(),
            call_timeout: Duration::from_secs(2),
            cache_timeout: Duration::from_millis(200),
            read_retry: RetryConfig::default(),
            transition_policy: TransitionPolicy::Unrestricted,
        }
    }
}

/// Coordinates the store, the cache and the broker for every order operation.
///
/// Cheap to clone; clones share adapters and per-order locks.
#[derive(Clone)]
pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    locks: Arc<KeyedLocks>,
    config: LifecycleConfig,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCache>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            metrics,
            locks: Arc::new(KeyedLocks::new()),
            config,
        }
    }

    /// Same adapters and locks, with a different bound on store and broker calls.
    pub fn with_call_timeout(&self, call_timeout: Duration) -> Self {
        let mut scoped = self.clone();
        scoped.config.call_timeout = call_timeout;
        scoped
    }

    // ========================================================================
    // Operations
    // ========================================================================

    pub async fn create(&self, customer_id: &str, items: Vec<OrderItem>) -> Result<Order, LifecycleError> {
        let started = Instant::now();

        let order = Order::new(customer_id, items, Utc::now()).inspect_err(|e| {
            tracing::debug!(customer_id = %customer_id, error = %e, "Rejected order creation");
        })?;

        self.store_call("insert", self.store.insert(&order)).await?;

        self.metrics.record_order_created();
        self.metrics.observe_duration("create", started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            items = order.items.len(),
            total = ?order.total(),
            "✅ Order created"
        );
        Ok(order)
    }

    /// Cache-aside read. Cache failures count as misses.
    pub async fn get_by_id(&self, id: &OrderId) -> Result<Order, LifecycleError> {
        let started = Instant::now();

        if let Some(order) = self.cached(id).await {
            self.metrics.observe_duration("get_by_id", started.elapsed().as_secs_f64());
            return Ok(order);
        }

        // Held across read and put so the put cannot land after a
        // concurrent update's invalidation with the pre-update state.
        let _guard = self.locks.lock(id).await;

        let order = self.read_by_id(id).await?;
        self.populate(&order).await;

        self.metrics.observe_duration("get_by_id", started.elapsed().as_secs_f64());
        Ok(order)
    }

    /// Filtered listing straight from the store; results are never cached.
    pub async fn get_filtered(&self, filter: &OrderFilter) -> Result<Vec<Order>, LifecycleError> {
        let started = Instant::now();

        let orders = retry_on_transient(&self.config.read_retry, "store.list_filtered", || {
            self.store_call("list_filtered", self.store.list_filtered(filter))
        })
        .await?;

        tracing::debug!(
            status = ?filter.status,
            customer_id = ?filter.customer_id,
            count = orders.len(),
            "Listed orders"
        );
        self.metrics.observe_duration("get_filtered", started.elapsed().as_secs_f64());
        Ok(orders)
    }

    /// Move an order to `new_status`, invalidate its cache entry and announce
    /// the change.
    ///
    /// `Err(LifecycleError::Notification)` means the new status is durable but
    /// the event was not handed to the broker.
    pub async fn update_status(&self, id: &OrderId, new_status: &str) -> Result<Order, LifecycleError> {
        let started = Instant::now();
        let _guard = self.locks.lock(id).await;

        let mut order = self.read_by_id(id).await?;

        let new_status: OrderStatus = new_status.parse()?;
        self.config.transition_policy.check(order.status, new_status)?;

        let event = order.transition_to(new_status, Utc::now());

        match with_timeout(STORE_UPDATE, self.config.call_timeout, self.store.update(&order)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.store_failure("update", e)),
            Err(elapsed) => {
                // The write may still land.
                self.metrics.record_store_error("update");
                tracing::warn!(order_id = %id, after = ?elapsed.after, "Store update timed out, invalidating cache");
                self.evict(id).await;
                return Err(elapsed.into());
            }
        }

        self.metrics
            .record_transition(event.old_status.as_str(), event.new_status.as_str());
        tracing::info!(
            order_id = %id,
            old_status = %event.old_status,
            new_status = %event.new_status,
            "🔄 Order status changed"
        );

        self.evict(id).await;

        let published = with_timeout(
            "broker.publish",
            self.config.call_timeout,
            self.publisher.publish(&self.config.topic, id, &event),
        )
        .await
        .unwrap_or_else(|elapsed| Err(PublishError::TimedOut(elapsed.after)));

        self.metrics.observe_duration("update_status", started.elapsed().as_secs_f64());

        match published {
            Ok(()) => {
                tracing::debug!(order_id = %id, topic = %self.config.topic, "Status change event published");
                Ok(order)
            }
            Err(source) => {
                self.metrics.record_publish_failure(source.reason());
                tracing::error!(
                    order_id = %id,
                    new_status = %event.new_status,
                    error = %source,
                    "❌ Status committed but event was not published"
                );
                Err(LifecycleError::Notification {
                    order: Box::new(order),
                    source,
                })
            }
        }
    }

    pub async fn health(&self) -> SystemHealth {
        let (store, cache, broker) = tokio::join!(
            self.store.health_check(),
            self.cache.health_check(),
            self.publisher.health_check(),
        );
        SystemHealth::from_components(vec![store, cache, broker])
    }

    // ========================================================================
    // Store helpers
    // ========================================================================

    async fn read_by_id(&self, id: &OrderId) -> Result<Order, LifecycleError> {
        retry_on_transient(&self.config.read_retry, "store.get_by_id", || {
            self.store_call("get_by_id", self.store.get_by_id(id))
        })
        .await
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, LifecycleError> {
        match with_timeout(operation, self.config.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.store_failure(operation, e)),
            Err(elapsed) => {
                self.metrics.record_store_error(operation);
                tracing::warn!(operation, after = ?elapsed.after, "Store call timed out");
                Err(elapsed.into())
            }
        }
    }

    fn store_failure(&self, operation: &'static str, err: StoreError) -> LifecycleError {
        if !matches!(err, StoreError::NotFound(_)) {
            self.metrics.record_store_error(operation);
            tracing::error!(operation, error = %err, "Store call failed");
        }
        err.into()
    }

    // ========================================================================
    // Cache helpers - failures are logged and swallowed
    // ========================================================================

    async fn cached(&self, id: &OrderId) -> Option<Order> {
        match with_timeout("cache.get", self.config.cache_timeout, self.cache.get(id)).await {
            Ok(Ok(Some(order))) => {
                self.metrics.record_cache_lookup("hit");
                Some(order)
            }
            Ok(Ok(None)) => {
                self.metrics.record_cache_lookup("miss");
                None
            }
            Ok(Err(e)) => {
                self.cache_degraded("get", id, &e);
                None
            }
            Err(elapsed) => {
                self.cache_degraded("get", id, &elapsed);
                None
            }
        }
    }

    async fn populate(&self, order: &Order) {
        match with_timeout("cache.put", self.config.cache_timeout, self.cache.put(&order.id, order)).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => tracing::debug!(order_id = %order.id, "Cache already holds a newer version"),
            Ok(Err(e)) => self.cache_degraded("put", &order.id, &e),
            Err(elapsed) => self.cache_degraded("put", &order.id, &elapsed),
        }
    }

    async fn evict(&self, id: &OrderId) {
        match with_timeout("cache.invalidate", self.config.cache_timeout, self.cache.invalidate(id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.cache_degraded("invalidate", id, &e),
            Err(elapsed) => self.cache_degraded("invalidate", id, &elapsed),
        }
    }

    fn cache_degraded(&self, operation: &'static str, id: &OrderId, error: &dyn std::fmt::Display) {
        if operation == "get" {
            self.metrics.record_cache_lookup("error");
        }
        self.metrics.record_cache_error(operation);
        tracing::warn!(operation, order_id = %id, error = %error, "Cache call failed, continuing without cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryOrderCache;
    use crate::domain::order::OrderError;
    use crate::health::{ComponentHealth, HealthStatus};
    use crate::messaging::InMemoryPublisher;
    use crate::store::InMemoryOrderStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    /// In-memory store with switches for latency and failures.
    #[derive(Default)]
    struct ScriptedStore {
        inner: InMemoryOrderStore,
        delay_ms: AtomicU64,
        update_delay_ms: AtomicU64,
        fail_updates: AtomicBool,
        fail_reads: AtomicUsize,
        inserts: AtomicUsize,
        reads: AtomicUsize,
    }

    impl ScriptedStore {
        async fn pause(&self) {
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }

    #[async_trait]
    impl OrderStore for ScriptedStore {
        async fn insert(&self, order: &Order) -> Result<OrderId, StoreError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.inner.insert(order).await
        }

        async fn get_by_id(&self, id: &OrderId) -> Result<Order, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            if self
                .fail_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Backend("connection reset".into()));
            }
            self.inner.get_by_id(id).await
        }

        async fn list_filtered(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
            self.pause().await;
            self.inner.list_filtered(filter).await
        }

        async fn update(&self, order: &Order) -> Result<(), StoreError> {
            self.pause().await;
            let delay = self.update_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("write rejected".into()));
            }
            self.inner.update(order).await
        }

        async fn health_check(&self) -> ComponentHealth {
            ComponentHealth::new("store", HealthStatus::Healthy)
        }
    }

    struct Harness {
        lifecycle: OrderLifecycle,
        store: Arc<ScriptedStore>,
        cache: Arc<InMemoryOrderCache>,
        publisher: Arc<InMemoryPublisher>,
        metrics: Arc<Metrics>,
    }

    fn harness_with(config: LifecycleConfig) -> Harness {
        let store = Arc::new(ScriptedStore::default());
        let cache = Arc::new(InMemoryOrderCache::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let metrics = Arc::new(Metrics::new().unwrap());

        let lifecycle = OrderLifecycle::new(store.clone(), cache.clone(), publisher.clone(), metrics.clone(), config);
        Harness {
            lifecycle,
            store,
            cache,
            publisher,
            metrics,
        }
    }

    fn harness() -> Harness {
        harness_with(LifecycleConfig {
            read_retry: RetryConfig {
                initial_delay: Duration::from_millis(1),
                ..RetryConfig::default()
            },
            ..LifecycleConfig::default()
        })
    }

    fn item(sku: &str, quantity: u32, price: Decimal) -> OrderItem {
        OrderItem {
            sku: sku.to_string(),
            quantity,
            unit_price: price,
        }
    }

    fn one_item() -> Vec<OrderItem> {
        vec![item("SKU-1", 1, Decimal::new(999, 2))]
    }

    // ------------------------------------------------------------------------
    // create
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_persists_new_order_without_side_effects() {
        let h = harness();

        let order = h.lifecycle.create("c1", one_item()).await.unwrap();

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.created_at, order.updated_at);
        assert_eq!(h.store.inner.get_by_id(&order.id).await.unwrap(), order);
        assert_eq!(h.cache.len().await, 0);
        assert!(h.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_before_touching_store() {
        let h = harness();

        let empty = h.lifecycle.create("c1", vec![]).await.unwrap_err();
        assert!(matches!(empty, LifecycleError::Validation(OrderError::EmptyItems)));

        let zero = h.lifecycle.create("c1", vec![item("SKU-1", 0, Decimal::ONE)]).await.unwrap_err();
        assert!(matches!(zero, LifecycleError::Validation(OrderError::InvalidQuantity { .. })));

        let negative = h
            .lifecycle
            .create("c1", vec![item("SKU-1", 1, Decimal::new(-1, 0))])
            .await
            .unwrap_err();
        assert!(matches!(negative, LifecycleError::Validation(OrderError::InvalidPrice { .. })));

        let no_customer = h.lifecycle.create("  ", one_item()).await.unwrap_err();
        assert!(matches!(no_customer, LifecycleError::Validation(OrderError::EmptyCustomerId)));

        assert_eq!(h.store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_overflowing_total_before_insert() {
        let h = harness();
        let huge = Decimal::from_str_exact("10000000000000000000000000000").unwrap();

        let err = h.lifecycle.create("c1", vec![item("BIG", 10, huge)]).await.unwrap_err();

        assert!(matches!(err, LifecycleError::Validation(OrderError::TotalOverflow { .. })));
        assert_eq!(h.store.inserts.load(Ordering::SeqCst), 0);
        assert_eq!(h.metrics.orders_created.get(), 0);
    }

    #[tokio::test]
    async fn test_create_times_out_on_slow_store() {
        let h = harness();
        h.store.delay_ms.store(200, Ordering::SeqCst);

        let err = h
            .lifecycle
            .with_call_timeout(Duration::from_millis(20))
            .create("c1", one_item())
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Timeout { operation: "insert", .. }));
        assert!(err.is_retryable());
    }

    // ------------------------------------------------------------------------
    // get_by_id
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_by_id_populates_cache_then_serves_from_it() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();

        let first = h.lifecycle.get_by_id(&order.id).await.unwrap();
        assert_eq!(first, order);
        assert_eq!(h.cache.get(&order.id).await.unwrap(), Some(order.clone()));

        let second = h.lifecycle.get_by_id(&order.id).await.unwrap();
        assert_eq!(second, order);
        assert_eq!(h.store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_by_id_missing_is_not_found() {
        let h = harness();

        let err = h.lifecycle.get_by_id(&OrderId::from("missing-id")).await.unwrap_err();

        assert!(matches!(err, LifecycleError::NotFound(ref id) if id.as_str() == "missing-id"));
        assert_eq!(h.cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_get_by_id_retries_transient_store_errors() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.store.fail_reads.store(2, Ordering::SeqCst);

        let fetched = h.lifecycle.get_by_id(&order.id).await.unwrap();

        assert_eq!(fetched, order);
        assert_eq!(h.store.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_get_by_id_gives_up_after_retry_budget() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.store.fail_reads.store(10, Ordering::SeqCst);

        let err = h.lifecycle.get_by_id(&order.id).await.unwrap_err();

        assert!(matches!(err, LifecycleError::Store(StoreError::Backend(_))));
        assert_eq!(h.store.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_get_by_id_survives_cache_outage() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.cache.set_unavailable(true);

        let fetched = h.lifecycle.get_by_id(&order.id).await.unwrap();

        assert_eq!(fetched, order);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_leave_cache_equal_to_store() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let lifecycle = h.lifecycle.clone();
            let id = order.id.clone();
            tasks.push(tokio::spawn(async move { lifecycle.get_by_id(&id).await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), order);
        }

        let stored = h.store.inner.get_by_id(&order.id).await.unwrap();
        assert_eq!(h.cache.get(&order.id).await.unwrap(), Some(stored));
    }

    // ------------------------------------------------------------------------
    // get_filtered
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_filtered_matches_conjunction() {
        let h = harness();
        let a = h.lifecycle.create("c1", one_item()).await.unwrap();
        let b = h.lifecycle.create("c1", one_item()).await.unwrap();
        let c = h.lifecycle.create("c2", one_item()).await.unwrap();
        h.lifecycle.update_status(&b.id, "DELIVERED").await.unwrap();

        let by_customer = h
            .lifecycle
            .get_filtered(&OrderFilter {
                status: None,
                customer_id: Some("c1".into()),
            })
            .await
            .unwrap();
        let ids: HashSet<_> = by_customer.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, HashSet::from([a.id.clone(), b.id.clone()]));

        let both = h
            .lifecycle
            .get_filtered(&OrderFilter {
                status: Some(OrderStatus::New),
                customer_id: Some("c1".into()),
            })
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, a.id);

        let everything = h.lifecycle.get_filtered(&OrderFilter::default()).await.unwrap();
        assert_eq!(everything.len(), 3);
        assert!(everything.iter().any(|o| o.id == c.id));

        let nobody = h
            .lifecycle
            .get_filtered(&OrderFilter {
                status: None,
                customer_id: Some("c9".into()),
            })
            .await
            .unwrap();
        assert!(nobody.is_empty());
        assert_eq!(h.cache.len().await, 0);
    }

    // ------------------------------------------------------------------------
    // update_status
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_update_status_end_to_end() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        // Prime the cache with the NEW state.
        h.lifecycle.get_by_id(&order.id).await.unwrap();

        let updated = h.lifecycle.update_status(&order.id, "DELIVERED").await.unwrap();
        assert_eq!(updated.status, OrderStatus::Delivered);
        assert!(updated.updated_at > order.updated_at);

        let fetched = h.lifecycle.get_by_id(&order.id).await.unwrap();
        assert_eq!(fetched.status, OrderStatus::Delivered);

        let messages = h.publisher.messages_for(&order.id).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "orders.events");
        assert_eq!(messages[0].key, order.id.as_str());
        let event = messages[0].event().unwrap();
        assert_eq!(event.old_status, OrderStatus::New);
        assert_eq!(event.new_status, OrderStatus::Delivered);
        assert_eq!(event.order_id, order.id);
        assert_eq!(event.timestamp.timestamp(), updated.updated_at.timestamp());
    }

    #[tokio::test]
    async fn test_delivered_back_to_new_is_accepted_by_default() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();

        let delivered = h.lifecycle.update_status(&order.id, "DELIVERED").await.unwrap();
        let reopened = h.lifecycle.update_status(&order.id, "NEW").await.unwrap();

        assert_eq!(reopened.status, OrderStatus::New);
        assert!(reopened.updated_at > delivered.updated_at);

        let statuses: Vec<_> = h
            .publisher
            .messages_for(&order.id)
            .await
            .iter()
            .map(|m| m.event().unwrap().new_status)
            .collect();
        assert_eq!(statuses, vec![OrderStatus::Delivered, OrderStatus::New]);
    }

    #[tokio::test]
    async fn test_terminal_locked_policy_refuses_reopening() {
        let h = harness_with(LifecycleConfig {
            transition_policy: TransitionPolicy::TerminalLocked,
            ..LifecycleConfig::default()
        });
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.lifecycle.update_status(&order.id, "CANCELLED").await.unwrap();

        let err = h.lifecycle.update_status(&order.id, "NEW").await.unwrap_err();

        assert_eq!(err.code(), "transition_not_allowed");
        let stored = h.store.inner.get_by_id(&order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(h.publisher.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_status_leaves_everything_untouched() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.lifecycle.get_by_id(&order.id).await.unwrap();

        let err = h.lifecycle.update_status(&order.id, "SHIPPED").await.unwrap_err();

        assert!(matches!(err, LifecycleError::Validation(OrderError::InvalidStatus(ref s)) if s == "SHIPPED"));
        assert_eq!(h.store.inner.get_by_id(&order.id).await.unwrap(), order);
        assert_eq!(h.cache.get(&order.id).await.unwrap(), Some(order));
        assert!(h.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_status_missing_id_is_not_found() {
        let h = harness();

        let err = h
            .lifecycle
            .update_status(&OrderId::from("missing-id"), "DELIVERED")
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::NotFound(_)));
        assert!(h.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_broker_failure_reports_notification_with_committed_order() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.lifecycle.get_by_id(&order.id).await.unwrap();
        h.publisher.set_failing(true);

        let err = h.lifecycle.update_status(&order.id, "CANCELLED").await.unwrap_err();

        match err {
            LifecycleError::Notification { order: committed, source } => {
                assert_eq!(committed.status, OrderStatus::Cancelled);
                assert!(matches!(source, PublishError::Submission(_)));
            }
            other => panic!("expected notification error, got {other:?}"),
        }

        let stored = h.store.inner.get_by_id(&order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(h.cache.get(&order.id).await.unwrap(), None);
        assert!(h.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_update_failure_skips_invalidation_and_event() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.lifecycle.get_by_id(&order.id).await.unwrap();
        h.store.fail_updates.store(true, Ordering::SeqCst);

        let err = h.lifecycle.update_status(&order.id, "DELIVERED").await.unwrap_err();

        assert!(matches!(err, LifecycleError::Store(_)));
        assert_eq!(h.cache.get(&order.id).await.unwrap(), Some(order.clone()));
        assert_eq!(h.store.inner.get_by_id(&order.id).await.unwrap(), order);
        assert!(h.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_cache_outage_does_not_block_status_change() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.cache.set_unavailable(true);

        let updated = h.lifecycle.update_status(&order.id, "IN_PROGRESS").await.unwrap();

        assert_eq!(updated.status, OrderStatus::InProgress);
        assert_eq!(h.publisher.messages_for(&order.id).await.len(), 1);

        h.cache.set_unavailable(false);
        let fetched = h.lifecycle.get_by_id(&order.id).await.unwrap();
        assert_eq!(fetched.status, OrderStatus::InProgress);
    }

    #[tokio::test]
    async fn test_update_timeout_evicts_cache_and_is_not_published() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.lifecycle.get_by_id(&order.id).await.unwrap();
        assert!(h.cache.get(&order.id).await.unwrap().is_some());
        h.store.update_delay_ms.store(200, Ordering::SeqCst);

        let err = h
            .lifecycle
            .with_call_timeout(Duration::from_millis(20))
            .update_status(&order.id, "DELIVERED")
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Timeout { operation: STORE_UPDATE, .. }));
        assert!(!err.is_retryable());
        assert_eq!(h.cache.get(&order.id).await.unwrap(), None);
        assert!(h.publisher.messages().await.is_empty());
        assert_eq!(h.metrics.store_errors.with_label_values(&["update"]).get(), 1);
    }

    #[tokio::test]
    async fn test_read_timeout_during_update_is_retryable() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.store.delay_ms.store(200, Ordering::SeqCst);

        let err = h
            .lifecycle
            .with_call_timeout(Duration::from_millis(20))
            .update_status(&order.id, "DELIVERED")
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Timeout { operation: "get_by_id", .. }));
        assert!(err.is_retryable());
        assert!(h.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_are_counted() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.lifecycle.create("c1", one_item()).await.unwrap();
        assert_eq!(h.metrics.orders_created.get(), 2);

        h.lifecycle.get_by_id(&order.id).await.unwrap();
        h.lifecycle.get_by_id(&order.id).await.unwrap();
        assert_eq!(h.metrics.cache_requests.with_label_values(&["miss"]).get(), 1);
        assert_eq!(h.metrics.cache_requests.with_label_values(&["hit"]).get(), 1);

        h.lifecycle.update_status(&order.id, "IN_PROGRESS").await.unwrap();
        h.publisher.set_failing(true);
        h.lifecycle.update_status(&order.id, "DELIVERED").await.unwrap_err();

        assert_eq!(
            h.metrics.status_transitions.with_label_values(&["NEW", "IN_PROGRESS"]).get(),
            1
        );
        assert_eq!(
            h.metrics.status_transitions.with_label_values(&["IN_PROGRESS", "DELIVERED"]).get(),
            1
        );
        assert_eq!(h.metrics.publish_failures.with_label_values(&["submission"]).get(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_keep_record_whole_and_events_ordered() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        let targets = ["IN_PROGRESS", "DELIVERED", "CANCELLED", "NEW"];

        let mut tasks = Vec::new();
        for i in 0..16 {
            let lifecycle = h.lifecycle.clone();
            let id = order.id.clone();
            let target = targets[i % targets.len()];
            tasks.push(tokio::spawn(async move { lifecycle.update_status(&id, target).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = h.store.inner.get_by_id(&order.id).await.unwrap();
        assert_eq!(stored.customer_id, order.customer_id);
        assert_eq!(stored.items, order.items);
        assert_eq!(stored.created_at, order.created_at);

        // Each event starts where the previous one ended.
        let events: Vec<_> = h
            .publisher
            .messages_for(&order.id)
            .await
            .iter()
            .map(|m| m.event().unwrap())
            .collect();
        assert_eq!(events.len(), 16);
        assert_eq!(events[0].old_status, OrderStatus::New);
        for pair in events.windows(2) {
            assert_eq!(pair[0].new_status, pair[1].old_status);
        }
        assert_eq!(events[15].new_status, stored.status);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_read_racing_update_never_caches_stale_state() {
        let h = harness();
        let order = h.lifecycle.create("c1", one_item()).await.unwrap();
        h.store.delay_ms.store(5, Ordering::SeqCst);

        let reader = {
            let lifecycle = h.lifecycle.clone();
            let id = order.id.clone();
            tokio::spawn(async move { lifecycle.get_by_id(&id).await })
        };
        let writer = {
            let lifecycle = h.lifecycle.clone();
            let id = order.id.clone();
            tokio::spawn(async move { lifecycle.update_status(&id, "DELIVERED").await })
        };
        reader.await.unwrap().unwrap();
        writer.await.unwrap().unwrap();

        let fetched = h.lifecycle.get_by_id(&order.id).await.unwrap();
        assert_eq!(fetched.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_health_aggregates_components() {
        let h = harness();
        assert!(h.lifecycle.health().await.overall_status.is_healthy());

        h.cache.set_unavailable(true);
        let degraded = h.lifecycle.health().await;
        assert!(matches!(degraded.overall_status, HealthStatus::Degraded(_)));
        assert!(degraded.summary().starts_with("DEGRADED"));
    }
}
