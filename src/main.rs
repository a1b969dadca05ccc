// ABOUTME: Main entry point for the recipe API server
// ABOUTME: Loads configuration, waits for the database, bootstraps the admin, and serves

use std::sync::Arc;

use recipe_api::{accounts, app, config::Config, storage::Storage, AppState};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recipe_api=info,tower_http=info")),
        )
        .init();

    let config = Config::load()?;

    let storage = Arc::new(
        Storage::connect_with_retry(
            &config.database_url,
            config.db_connect_attempts,
            config.db_retry_delay,
        )
        .await?,
    );

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        accounts::ensure_superuser(&storage, email, password).await?;
    }

    tokio::fs::create_dir_all(&config.media_root).await?;

    let address = config.bind_address();
    let app = app(AppState::new(storage, config));

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                warn!("Failed to listen for Ctrl+C: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
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
}
