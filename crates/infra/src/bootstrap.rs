//! Process wiring: configuration in, ready engine out.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use courier_orders::{OrderLifecycleEngine, OrderRepository};

use crate::config::{AppConfig, StorageBackend};
use crate::repository::{InMemoryOrderRepository, PostgresOrderRepository};

/// Engine over whichever backend the configuration selects.
pub type Engine = OrderLifecycleEngine<Arc<dyn OrderRepository>>;

/// Initialize tracing, open the configured storage and build the engine.
///
/// The Postgres backend connects eagerly and creates its tables if missing.
pub async fn build_engine(config: &AppConfig) -> anyhow::Result<Engine> {
    courier_observability::init_with(config.log_format);

    let repo = build_repository(config).await?;
    let engine = OrderLifecycleEngine::new(repo, config.engine_config())
        .context("invalid engine configuration")?;

    info!(
        backend = ?config.storage_backend,
        tracking_prefix = %config.tracking_prefix,
        "order engine ready"
    );
    Ok(engine)
}

/// Open the configured repository.
pub async fn build_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn OrderRepository>> {
    match config.storage_backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryOrderRepository::new())),
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres backend")?;

            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;

            let repo = PostgresOrderRepository::new(pool);
            repo.ensure_schema()
                .await
                .context("failed to create order tables")?;
            Ok(Arc::new(repo))
        }
    }
}
