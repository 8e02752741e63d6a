use std::sync::Arc;

use explorer::api::{ApiServer, ApiServerConfig};
use explorer::config::{AppConfig, log_dir_from_env};
use explorer::database::{AnalyticsDatabase, PgAnalyticsDatabase};
use explorer::logging::init_logging;
use explorer::queries::QueryRegistry;
use explorer::services::ServiceContainer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Keep the guard alive for the whole process or buffered log lines are lost.
    let (logging_config, _log_guard) = init_logging(&log_dir_from_env())?;

    info!("Starting explorer v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let database: Arc<dyn AnalyticsDatabase> =
        match PgAnalyticsDatabase::connect(&config.database).await {
            Ok(db) => Arc::new(db),
            Err(e) => {
                error!(error = %e, "Could not connect to the analytics database");
                std::process::exit(1);
            }
        };

    let container = ServiceContainer::new(config, database, QueryRegistry::with_builtins()).await?;
    container.initialize();

    let cancel_token = container.cancellation_token();
    logging_config.start_retention_cleanup(cancel_token.child_token());

    let state = container.app_state().with_logging_config(logging_config);
    let server = ApiServer::new(ApiServerConfig::from_env_or_default(), state)
        .with_cancel_token(cancel_token.child_token());

    let shutdown = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            shutdown.cancel();
        }
    });

    let result = server.run().await;
    container.shutdown().await;
    result?;

    Ok(())
}
