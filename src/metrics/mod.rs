// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order pipeline
// ============================================================================
//
// - Order creation and status transitions
// - Cache hit / miss / error outcomes
// - Store errors and publish failures
// - Per-operation latency
// - Broker circuit breaker state
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub status_transitions: IntCounterVec,

    pub cache_requests: IntCounterVec,
    pub cache_errors: IntCounterVec,

    pub store_errors: IntCounterVec,
    pub publish_failures: IntCounterVec,

    pub operation_duration: HistogramVec,

    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let cache_requests = IntCounterVec::new(
            Opts::new("order_cache_requests_total", "Order cache lookups by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(cache_requests.clone()))?;

        let cache_errors = IntCounterVec::new(
            Opts::new("order_cache_errors_total", "Swallowed cache failures"),
            &["operation"],
        )?;
        registry.register(Box::new(cache_errors.clone()))?;

        let store_errors = IntCounterVec::new(
            Opts::new("order_store_errors_total", "Store failures surfaced to callers"),
            &["operation"],
        )?;
        registry.register(Box::new(store_errors.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new("order_publish_failures_total", "Status-change events that were not published"),
            &["reason"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order lifecycle operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Broker circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            status_transitions,
            cache_requests,
            cache_errors,
            store_errors,
            publish_failures,
            operation_duration,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    /// `outcome` is one of hit, miss, error
    pub fn record_cache_lookup(&self, outcome: &str) {
        self.cache_requests.with_label_values(&[outcome]).inc();
    }

    pub fn record_cache_error(&self, operation: &str) {
        self.cache_errors.with_label_values(&[operation]).inc();
    }

    pub fn record_store_error(&self, operation: &str) {
        self.store_errors.with_label_values(&[operation]).inc();
    }

    pub fn record_publish_failure(&self, reason: &str) {
        self.publish_failures.with_label_values(&[reason]).inc();
    }

    pub fn observe_duration(&self, operation: &str, duration_secs: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }

    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions.with_label_values(&[from_state, to_state]).inc();
    }
}
