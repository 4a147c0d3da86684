//! Service configuration, read once from the environment at startup.

use anyhow::{bail, Context};
use std::time::Duration;

use crate::domain::order::TransitionPolicy;
use crate::lifecycle::LifecycleConfig;
use crate::utils::RetryConfig;

/// Which adapters back the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// ScyllaDB, Redis and Redpanda
    Live,
    /// Process-local store, cache and publisher
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    /// Order API listen address
    pub http_bind: String,
    /// Prometheus scrape port
    pub metrics_port: u16,
    /// Comma-separated `host:port` list
    pub scylla_nodes: Vec<String>,
    pub scylla_keyspace: String,
    pub redis_url: String,
    pub kafka_brokers: String,
    pub events_topic: String,
    pub call_timeout: Duration,
    pub cache_timeout: Duration,
    pub read_retry_attempts: u32,
    pub transition_policy: TransitionPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str, default: &str| lookup(name).filter(|v| !v.is_empty()).unwrap_or_else(|| default.into());

        let backend = match var("ORDERS_BACKEND", "live").as_str() {
            "live" => Backend::Live,
            "memory" => Backend::Memory,
            other => bail!("ORDERS_BACKEND must be `live` or `memory`, got `{other}`"),
        };

        let transition_policy = match var("TRANSITION_POLICY", "unrestricted").as_str() {
            "unrestricted" => TransitionPolicy::Unrestricted,
            "terminal_locked" => TransitionPolicy::TerminalLocked,
            other => bail!("TRANSITION_POLICY must be `unrestricted` or `terminal_locked`, got `{other}`"),
        };

        Ok(Self {
            backend,
            http_bind: var("HTTP_BIND", "0.0.0.0:8080"),
            metrics_port: parse(&var("METRICS_PORT", "9090"), "METRICS_PORT")?,
            scylla_nodes: var("SCYLLA_NODES", "127.0.0.1:9042")
                .split(',')
                .map(|node| node.trim().to_string())
                .filter(|node| !node.is_empty())
                .collect(),
            scylla_keyspace: var("SCYLLA_KEYSPACE", "orders_ks"),
            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),
            kafka_brokers: var("KAFKA_BROKERS", "127.0.0.1:9092"),
            events_topic: var("ORDERS_EVENTS_TOPIC", "orders.events"),
            call_timeout: Duration::from_millis(parse(&var("CALL_TIMEOUT_MS", "2000"), "CALL_TIMEOUT_MS")?),
            cache_timeout: Duration::from_millis(parse(&var("CACHE_TIMEOUT_MS", "200"), "CACHE_TIMEOUT_MS")?),
            read_retry_attempts: parse(&var("READ_RETRY_ATTEMPTS", "3"), "READ_RETRY_ATTEMPTS")?,
            transition_policy,
        })
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            topic: self.events_topic.clone(),
            call_timeout: self.call_timeout,
            cache_timeout: self.cache_timeout,
            read_retry: RetryConfig {
                max_attempts: self.read_retry_attempts,
                ..RetryConfig::default()
            },
            transition_policy: self.transition_policy,
        }
    }
}

fn parse<T>(raw: &str, name: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().with_context(|| format!("{name} has invalid value `{raw}`"))
}
