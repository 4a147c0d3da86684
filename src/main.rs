use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cache;
mod config;
mod domain;
mod health;
mod lifecycle;
mod messaging;
mod metrics;
mod store;
mod utils;

use cache::{InMemoryOrderCache, OrderCache, RedisOrderCache};
use config::{AppConfig, Backend};
use lifecycle::OrderLifecycle;
use messaging::{EventPublisher, InMemoryPublisher, RedpandaClient};
use store::{InMemoryOrderStore, OrderStore, ScyllaOrderStore};

type Adapters = (Arc<dyn OrderStore>, Arc<dyn OrderCache>, Arc<dyn EventPublisher>);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // RUST_LOG overrides the default filter, e.g. RUST_LOG=debug
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,order_lifecycle=debug")))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(backend = ?config.backend, policy = ?config.transition_policy, "🚀 Starting order lifecycle service");

    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let (store, cache, publisher) = match config.backend {
        Backend::Live => connect_live(&config, metrics.clone()).await?,
        Backend::Memory => {
            tracing::warn!("Running on in-memory adapters; nothing is persisted");
            in_memory()
        }
    };

    let lifecycle = OrderLifecycle::new(store, cache, publisher, metrics.clone(), config.lifecycle());
    tracing::info!("{}", lifecycle.health().await.summary());

    tokio::try_join!(
        metrics::start_metrics_server(metrics.registry().clone(), config.metrics_port),
        api::start_api_server(lifecycle, &config.http_bind),
    )?;

    tracing::info!("👋 Order lifecycle service stopped");
    Ok(())
}

async fn connect_live(config: &AppConfig, metrics: Arc<metrics::Metrics>) -> anyhow::Result<Adapters> {
    tracing::info!(nodes = ?config.scylla_nodes, "Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new()
        .known_nodes(&config.scylla_nodes)
        .build()
        .await?;
    ScyllaOrderStore::ensure_schema(&session, &config.scylla_keyspace).await?;
    let store = ScyllaOrderStore::new(Arc::new(session));

    let cache = RedisOrderCache::connect(&config.redis_url).await?;
    let publisher = RedpandaClient::new(&config.kafka_brokers, metrics)?;
    tracing::info!(brokers = %config.kafka_brokers, topic = %config.events_topic, "Redpanda producer ready");

    Ok((Arc::new(store), Arc::new(cache), Arc::new(publisher)))
}

fn in_memory() -> Adapters {
    (
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryOrderCache::new()),
        Arc::new(InMemoryPublisher::new()),
    )
}
