//! Axum-based read-only status API
//!
//! The regulator publishes a [`StatusSnapshot`] after every tick; handlers
//! only read the latest one and never touch controller state.

use crate::regulator::StatusSnapshot;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub status_rx: watch::Receiver<Arc<StatusSnapshot>>,
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot: StatusSnapshot = state.status_rx.borrow().as_ref().clone();
    Json(snapshot)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    status_rx: watch::Receiver<Arc<StatusSnapshot>>,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let router = build_router(AppState { status_rx });
    let logger = crate::logging::get_logger("web");

    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr: SocketAddr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Status API listening at http://{}:{}/api/status",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}
