//! Read-only REST API over a loaded study.
//!
//! Endpoints:
//! - `GET /scenarios` lists scenario datasets with their attributes
//! - `GET /comparisons` lists declared comparisons
//! - `GET /flags` lists flags accepted by the scenario view, with units
//! - `GET /fetch/{view}/{flag}` returns a fetched table
//! - `GET /kpis` returns computed KPIs, filterable by query parameters

mod handlers;
pub mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::kpi::KpiCollection;
use crate::study::StudyManager;

/// Immutable application state shared across all request handlers.
///
/// Built once after the study is loaded and its KPIs computed.
pub struct AppState {
    /// Scenarios, comparisons and stacked views.
    pub study: StudyManager,
    /// KPIs computed on the study.
    pub kpis: KpiCollection,
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/scenarios", get(handlers::get_scenarios))
        .route("/comparisons", get(handlers::get_comparisons))
        .route("/flags", get(handlers::get_flags))
        .route("/fetch/{view}/{flag}", get(handlers::get_fetch))
        .route("/kpis", get(handlers::get_kpis))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `addr` - Socket address to bind to
///
/// # Errors
///
/// Returns an I/O error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
