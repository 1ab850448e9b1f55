use std::sync::Arc;

use tracing::{info, warn};

use quest_ledger::api::{self, AppState};
use quest_ledger::catalog::QuestCatalog;
use quest_ledger::config::ServerConfig;
use quest_ledger::Ledger;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let default_directive = config.log_filter.as_deref().unwrap_or("quest_ledger=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_directive.parse()?),
        )
        .init();

    info!(
        "Config: backend={:?}, database={}, catalog={:?}",
        config.backend, config.database_url, config.catalog_dir
    );

    let ledger = Arc::new(Ledger::open(&config).await?);

    if let Some(dir) = &config.catalog_dir {
        let mut catalog = QuestCatalog::new();
        catalog.load_from_directory(dir)?;
        let created = catalog.seed(&ledger).await?;
        info!("Quest catalog: {} definition(s), {} new", catalog.len(), created);
    }

    let app = api::router(AppState::new(ledger.clone()));

    info!("Quest ledger listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ledger.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
