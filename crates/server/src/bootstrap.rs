use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use helplane_agent::llm::RetryingLlm;
use helplane_agent::pipeline::ChatPipeline;
use helplane_agent::retrieval::{NoopRetrieval, RetrievalClient};
use helplane_core::config::{AppConfig, ConfigError, LoadOptions};
use helplane_core::ratelimit::RateLimiter;
use helplane_db::repositories::{
    SqlAnalyticsRepository, SqlConversationRepository, SqlTenantRepository,
};
use helplane_db::{connect_with_settings, migrations, DbPool, TenantConfigLoader};

use crate::providers::{HttpLlmClient, HttpRetrievalClient, LogAuditSink, LogNotifier};
use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("provider setup failed: {0}")]
    Provider(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let applied = migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        applied,
        "database migrations applied"
    );

    let tenants = Arc::new(SqlTenantRepository::new(db_pool.clone()));
    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let analytics = Arc::new(SqlAnalyticsRepository::new(db_pool.clone()));

    let llm = RetryingLlm::new(
        HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Provider)?,
        Duration::from_secs(config.llm.timeout_secs),
        config.llm.max_retries,
    );

    let retrieval: Arc<dyn RetrievalClient> = if config.retrieval.enabled {
        Arc::new(
            HttpRetrievalClient::from_config(&config.retrieval)
                .map_err(BootstrapError::Provider)?,
        )
    } else {
        Arc::new(NoopRetrieval)
    };

    let audit = Arc::new(LogAuditSink);
    let pipeline = Arc::new(ChatPipeline::new(
        conversations.clone(),
        Arc::new(llm),
        retrieval.clone(),
        Arc::new(LogNotifier),
        audit.clone(),
    ));

    let state = AppState {
        loader: Arc::new(TenantConfigLoader::new(tenants)),
        limiter: Arc::new(RateLimiter::new()),
        pipeline,
        conversations,
        analytics,
        retrieval,
        audit,
    };

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        retrieval_enabled = config.retrieval.enabled,
        "application wired"
    );

    Ok(Application { config, db_pool, state })
}
