//! HTTP surface of the validate/load stage
//!
//! `POST /api/v1/batches` is the remote end of
//! [`HttpInvoker`](crate::migration::HttpInvoker): it takes a
//! [`BatchRequest`] and answers with the [`BatchOutcome`] as JSON.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;

use crate::db;
use crate::error::ServerResult;
use crate::middleware;
use crate::migration::{BatchOutcome, BatchRequest, Pipeline, BATCHES_PATH};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pipeline: Pipeline,
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route(BATCHES_PATH, post(process_batch))
        .with_state(state)
        .layer(middleware::tracing_layer())
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "hrmigrate-server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check(State(state): State<AppState>) -> Result<Response, StatusCode> {
    match db::health_check(&state.db).await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Run one batch through validate/load
async fn process_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ServerResult<Json<BatchOutcome>> {
    let outcome = state.pipeline.process(request).await?;
    Ok(Json(outcome))
}
