use crate::adapters::store::ConversationStore;
use crate::config::DatabaseConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("duet-server");
        Self {
            status: meter
                .i64_gauge("duet_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    store: Arc<dyn ConversationStore>,
    store_timeout: Duration,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, config: &DatabaseConfig) -> Self {
        Self { store, store_timeout: Duration::from_millis(config.health_timeout_ms), metrics: Metrics::new() }
    }

    /// Checks that the conversation store answers.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_store(&self) -> Result<(), String> {
        let component = [KeyValue::new("component", "store")];
        match timeout(self.store_timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &component);
                Err(format!("Store check failed: {e}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &component);
                Err("Store check timed out".to_string())
            }
        }
    }
}
