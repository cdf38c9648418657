use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{
    services::{download_file, health, index, serve_upload, upload_image},
    state::AppState,
    utils::MULTIPART_OVERHEAD,
};
use crate::config::Config;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the HTTP router over a fully wired state
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .limits
        .max_upload_bytes
        .as_usize()
        .saturating_add(MULTIPART_OVERHEAD);
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload_image))
        .route("/download/{filename}", get(download_file))
        .route("/uploads/{filename}", get(serve_upload))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// An empty origin list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(values))
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let sweep_interval = config.retention.sweep_interval.as_duration();

    info!(path = %config.storage.ledger_path.display(), "Opening expiry ledger");
    let state = AppState::from_config(config)
        .map_err(|e| format!("Failed to open expiry ledger: {}", e))?;

    info!(path = %state.store.root().display(), "Preparing upload directory");
    state
        .store
        .ensure_dir()
        .await
        .map_err(|e| format!("Failed to create upload directory: {}", e))?;

    let recovered = state
        .retention
        .recover()
        .map_err(|e| format!("Failed to recover pending expiries: {}", e))?;
    info!(recovered, "Re-armed pending expiries");

    let sweeper = state.retention.spawn_sweeper(sweep_interval);

    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Multimat API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
