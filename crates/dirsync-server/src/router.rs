//! Router configuration.
//!
//! Management API for registered sources:
//!
//! | Method & path | Operation |
//! |---|---|
//! | `GET /health` | liveness |
//! | `GET /sources` | list source statuses |
//! | `POST /sources` | register a source |
//! | `GET /sources/{id}` | source status |
//! | `DELETE /sources/{id}` | deregister a source |
//! | `POST /sources/{id}/scan` | scan now |

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use dirsync_core::SourceDefinition;
use dirsync_engine::{SchedulerState, SourceStatus};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    let origins = &state.config.cors_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()))
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/sources", get(list_sources).post(add_source))
        .route("/sources/{id}", get(get_source).delete(remove_source))
        .route("/sources/{id}/scan", post(trigger_scan))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sources: usize,
}

/// Accepted scan request.
#[derive(Serialize)]
pub struct ScanAccepted {
    id: String,
    state: SchedulerState,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        sources: state.registry().len(),
    })
}

/// GET /sources
async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(state.registry().list())
}

/// POST /sources
async fn add_source(
    State(state): State<AppState>,
    payload: Result<Json<SourceDefinition>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(definition) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let config = definition.into_config()?;
    let status = state.registry().add(config)?;
    tracing::info!(source_id = %status.id, "Source registered");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/sources/{}", status.id))],
        Json(status),
    ))
}

/// GET /sources/{id}
async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SourceStatus>> {
    Ok(Json(state.registry().status(&id)?))
}

/// DELETE /sources/{id}
async fn remove_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.registry().remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /sources/{id}/scan
async fn trigger_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.registry().trigger_scan_now(&id)?;
    let status = state.registry().status(&id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ScanAccepted {
            id,
            state: status.state,
        }),
    ))
}
