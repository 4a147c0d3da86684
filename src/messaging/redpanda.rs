use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
};
use std::sync::Arc;

use super::{EventPublisher, PublishError};
use crate::domain::order::{OrderId, StatusChangeEvent};
use crate::health::{ComponentHealth, HealthStatus};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl RedpandaClient {
    pub fn new(brokers: &str, metrics: Arc<Metrics>) -> Result<Self, PublishError> {
        // Idempotent producer: retries cannot reorder messages within a partition,
        // so events for one order id arrive in submission order.
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .create()
            .map_err(|e| PublishError::Submission(format!("Failed to create Redpanda producer: {}", e)))?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_for: std::time::Duration::from_secs(30),
            success_threshold: 3,
        };
        let observer = metrics.clone();
        let circuit_breaker = CircuitBreaker::new("redpanda", cb_config).with_observer(move |from, to| {
            observer.record_circuit_breaker_transition(from.as_str(), to.as_str());
            observer.update_circuit_breaker_state(to.code());
        });

        Ok(Self {
            producer,
            circuit_breaker,
            metrics,
        })
    }

    pub async fn get_circuit_breaker_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }
}

#[async_trait]
impl EventPublisher for RedpandaClient {
    async fn publish(&self, topic: &str, key: &OrderId, event: &StatusChangeEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;

        // Only the hand-off to the producer queue is guarded; the delivery
        // report is observed in the background.
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key.as_str()).payload(&payload);
                self.producer.send_result(record).map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(delivery) => {
                let metrics = self.metrics.clone();
                let topic_name = topic.to_string();
                let order_id = key.clone();

                tokio::spawn(async move {
                    match delivery.await {
                        Ok(Ok(_)) => {
                            tracing::debug!(topic = %topic_name, order_id = %order_id, "Delivery confirmed");
                        }
                        Ok(Err((e, _))) => {
                            metrics.record_publish_failure("delivery");
                            tracing::error!(
                                error = %e,
                                topic = %topic_name,
                                order_id = %order_id,
                                "Broker rejected status-change event"
                            );
                        }
                        Err(_) => {
                            metrics.record_publish_failure("delivery");
                            tracing::warn!(order_id = %order_id, "Producer dropped before delivery report");
                        }
                    }
                });

                tracing::info!(
                    topic = %topic,
                    key = %key,
                    event_type = event.event_type(),
                    old_status = %event.old_status,
                    new_status = %event.new_status,
                    "Published to Redpanda"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    topic = %topic,
                    "Circuit breaker open - Redpanda unavailable"
                );
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    topic = %topic,
                    "Failed to publish to Redpanda"
                );
                Err(PublishError::Submission(e.to_string()))
            }
        }
    }

    async fn health_check(&self) -> ComponentHealth {
        let state = self.get_circuit_breaker_state().await;
        self.metrics.update_circuit_breaker_state(state.code());

        let status = match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
        };
        ComponentHealth::new("broker", status)
    }
}
