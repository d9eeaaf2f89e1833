pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analyzer::AnalyzerHandle;
use crate::monitor::MonitorState;

#[derive(Clone)]
pub struct AppState {
    pub analyzers: Vec<AnalyzerHandle>,
    pub state: watch::Receiver<MonitorState>,
}

pub fn router(analyzers: Vec<AnalyzerHandle>, state: watch::Receiver<MonitorState>) -> Router {
    let state = Arc::new(AppState { analyzers, state });

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/alerts", get(handlers::list_alerts))
        .route(
            "/api/v1/analyzers/{name}/pause",
            post(handlers::pause_analyzer),
        )
        .route(
            "/api/v1/analyzers/{name}/resume",
            post(handlers::resume_analyzer),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    analyzers: Vec<AnalyzerHandle>,
    state: watch::Receiver<MonitorState>,
    host: &str,
    port: u16,
) -> eyre::Result<()> {
    let app = router(analyzers, state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
