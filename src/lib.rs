#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::store::{ConversationStore, MemoryConversationStore, PgConversationStore};
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use std::sync::Arc;
use tokio::sync::watch;

/// Picks the conversation store for this process.
///
/// With a database URL the Postgres store is used and migrations are applied.
/// Without one conversations only live as long as the process.
///
/// # Errors
/// Returns an error if the database is unreachable or a migration fails.
pub async fn init_store(config: &Config) -> anyhow::Result<Arc<dyn ConversationStore>> {
    if let Some(url) = &config.database.url {
        let pool = adapters::database::init_pool(url, &config.database).await?;
        adapters::database::run_migrations(&pool).await?;
        tracing::info!("Using Postgres conversation store");
        Ok(Arc::new(PgConversationStore::new(pool)))
    } else {
        tracing::warn!("No database URL configured, conversations are kept in memory and lost on restart");
        Ok(Arc::new(MemoryConversationStore::new()))
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn ConversationStore>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wires every service. Falls back to an in-memory store if none was given.
    #[must_use]
    pub fn build(self) -> App {
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryConversationStore::new()));

        let gateway_service = GatewayService::from_config(&self.config, Arc::clone(&store));
        let message_service = gateway_service.message_service().clone();
        let health_service = HealthService::new(store, &self.config.database);

        App { services: ServiceContainer { message_service, gateway_service }, health_service }
    }
}

/// Routes panics through tracing so they reach the structured log.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let location = panic_info.location().map(ToString::to_string).unwrap_or_default();
        tracing::error!(panic.payload = %payload, panic.location = %location, "Panic occurred");
    }));
}

/// Flips the shutdown flag on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, starting graceful shutdown");
        let _ = shutdown_tx.send(true);
    });
}
