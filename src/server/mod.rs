//! HTTP exposition server
//!
//! ## Endpoints
//!
//! - `GET <telemetry path>` - Probe all targets and render the gauges
//! - `GET /` - Landing page (only when the telemetry path is not `/`)
//! - `GET /health` - Health check

pub mod routes;
pub mod state;

pub use state::AppState;

use std::net::SocketAddr;

use axum::{Router, routing::get};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";

/// Fatal errors while starting or running the listener
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid telemetry path {0:?}, it must start with '/'")]
    InvalidPath(String),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Build the router for the given state.
pub fn router(state: AppState) -> Result<Router, ListenerError> {
    let telemetry_path = state.telemetry_path.clone();
    if !telemetry_path.is_empty() && !telemetry_path.starts_with('/') {
        return Err(ListenerError::InvalidPath(telemetry_path));
    }

    let metrics_path = if telemetry_path.is_empty() {
        "/"
    } else {
        telemetry_path.as_str()
    };

    let mut app = Router::new()
        .route(metrics_path, get(routes::metrics::metrics))
        .route("/health", get(routes::health::health_check));

    if metrics_path != "/" {
        app = app.route("/", get(routes::landing::landing_page));
    }

    Ok(app.with_state(state).layer(TraceLayer::new_for_http()))
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })
}

/// Serve until ctrl-c is received.
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), ListenerError> {
    let addr = listener.local_addr()?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received ctrl-c, shutting down"),
        Err(e) => {
            warn!("unable to listen for ctrl-c: {e}");
            std::future::pending::<()>().await
        }
    }
}
