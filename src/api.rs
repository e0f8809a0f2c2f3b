//! HTTP API handlers for Aquahealth.
//!
//! - **GET /water-bodies/:id/health**: compute (or serve cached) health.
//! - **GET /water-bodies/:id/health/peek**: cached health or the loading placeholder.
//! - **POST /water-bodies/:id/health/invalidate**: drop the cached result.
//! - **GET /health**: liveness check.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tracing::{info, instrument, warn};

use crate::engine::{Evaluation, HealthEngine};
use crate::model::{HealthLabel, HealthResponse};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: HealthEngine,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/water-bodies/:id/health", get(get_health))
        .route("/water-bodies/:id/health/peek", get(peek_health))
        .route(
            "/water-bodies/:id/health/invalidate",
            post(invalidate_health),
        )
        .route("/health", get(health_check))
        .with_state(state)
}

fn to_response(water_body_id: String, evaluation: Evaluation) -> HealthResponse {
    HealthResponse {
        water_body_id,
        computed_at: evaluation.computed_at,
        cached: evaluation.cached,
        health: evaluation.result,
    }
}

/// GET /water-bodies/:id/health - Health of one water body.
///
/// # Response
///
/// ```json
/// {
///     "water_body_id": "tank-1",
///     "computed_at": "2024-06-15T12:00:00Z",
///     "cached": false,
///     "health": {
///         "score": 61,
///         "label": "Fair",
///         "severity": "watch",
///         "breakdown": {"waterTests": 30, "livestockHealth": 100, "maintenance": 80, "careConsistency": 50},
///         "trend": {"direction": "stable", "change": 0},
///         "alerts": 0,
///         "overdueTasks": 0,
///         "lastWaterTest": null
///     }
/// }
/// ```
///
/// Returns `503 Service Unavailable` with the same body shape when no data
/// source could be reached.
#[instrument(skip(state))]
pub async fn get_health(
    State(state): State<AppState>,
    Path(water_body_id): Path<String>,
) -> (StatusCode, Json<HealthResponse>) {
    let evaluation = state.engine.compute_health(&water_body_id).await;

    let status = if evaluation.result.label == HealthLabel::Unavailable {
        warn!(water_body_id = %water_body_id, "Health unavailable");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        info!(
            water_body_id = %water_body_id,
            score = evaluation.result.score,
            cached = evaluation.cached,
            "Health queried"
        );
        StatusCode::OK
    };

    (status, Json(to_response(water_body_id, evaluation)))
}

/// GET /water-bodies/:id/health/peek - Cached health without fetching.
///
/// Returns the loading placeholder (`label: "Loading"`) when nothing fresh is
/// cached.
#[instrument(skip(state))]
pub async fn peek_health(
    State(state): State<AppState>,
    Path(water_body_id): Path<String>,
) -> Json<HealthResponse> {
    let evaluation = state.engine.peek(&water_body_id);
    Json(to_response(water_body_id, evaluation))
}

/// POST /water-bodies/:id/health/invalidate - Mark the cached result stale.
///
/// Called by the write side after it changes any record of the water body.
#[instrument(skip(state))]
pub async fn invalidate_health(
    State(state): State<AppState>,
    Path(water_body_id): Path<String>,
) -> StatusCode {
    state.engine.invalidate(&water_body_id);
    info!(water_body_id = %water_body_id, "Health invalidated");
    StatusCode::NO_CONTENT
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
