//! rewind-api server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};

use rewind_api::config::{ServerConfig, StoreBackend};
use rewind_api::logging::init_tracing;
use rewind_api::{build_router, AppState};
use rewind_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let _file_guard = init_tracing(&config.log);

    info!(
        subsystem = "api",
        backend = ?config.store_backend,
        max_age_secs = config.retention.max_age.num_seconds(),
        max_entries_per_user = config.retention.max_entries_per_user,
        "Starting rewind-api"
    );
    if config.api_tokens.is_empty() {
        warn!(
            subsystem = "api",
            "API_TOKENS is empty, every authenticated endpoint will return 401"
        );
    }

    let state = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required when STORE_BACKEND=postgres")?;
            let db = Database::connect_with_config(url, config.pool.clone()).await?;
            db.migrate().await.context("Failed to run migrations")?;
            info!(subsystem = "db", "Migrations applied");
            AppState::postgres(db, config.api_tokens.clone(), config.retention)?
        }
        StoreBackend::Memory => {
            warn!(
                subsystem = "api",
                "Using the in-memory store, all data is lost on restart"
            );
            AppState::in_memory(config.api_tokens.clone(), config.retention)?
        }
    };

    let app = build_router(state);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
