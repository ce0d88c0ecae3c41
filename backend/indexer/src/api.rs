//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::{self, SortOrder};
use crate::errors::IndexerError;
use crate::gig::{Activity, Gig};

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
}

/// Build the API router over `state`.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/gigs", get(get_all_gigs))
        .route("/gigs/:id", get(get_gig))
        .route("/gigs/:id/activities", get(get_gig_activities))
        .route("/activities", get(get_activities))
        .route("/activities/:id", get(get_activity))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub gig: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Serialize)]
pub struct GigsResponse {
    pub count: usize,
    pub gigs: Vec<Gig>,
}

#[derive(Serialize)]
pub struct GigActivitiesResponse {
    pub gig_id: String,
    pub count: usize,
    pub activities: Vec<Activity>,
}

#[derive(Serialize)]
pub struct ActivitiesResponse {
    pub count: usize,
    pub activities: Vec<Activity>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn internal_error(e: IndexerError) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn found_or_404<T: Serialize>(what: &str, id: &str, found: Option<T>) -> Response {
    match found {
        Some(entity) => (StatusCode::OK, Json(entity)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("{what} {id} not found")),
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /gigs`
pub async fn get_all_gigs(State(state): State<Arc<ApiState>>) -> Response {
    match db::get_all_gigs(&state.pool).await {
        Ok(gigs) => Json(GigsResponse {
            count: gigs.len(),
            gigs,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// `GET /gigs/:id`
pub async fn get_gig(State(state): State<Arc<ApiState>>, Path(gig_id): Path<String>) -> Response {
    match db::get_gig(&state.pool, &gig_id).await {
        Ok(gig) => found_or_404("gig", &gig_id, gig),
        Err(e) => internal_error(e),
    }
}

/// `GET /gigs/:id/activities?order=asc|desc`
///
/// Returns the activity history of one gig. An unknown gig yields an empty
/// history, since discarded events never leave a trace.
pub async fn get_gig_activities(
    State(state): State<Arc<ApiState>>,
    Path(gig_id): Path<String>,
    Query(query): Query<OrderQuery>,
) -> Response {
    match db::get_activities(&state.pool, Some(&gig_id), query.order).await {
        Ok(activities) => Json(GigActivitiesResponse {
            gig_id,
            count: activities.len(),
            activities,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// `GET /activities?gig=<id>&order=asc|desc`
pub async fn get_activities(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ActivityQuery>,
) -> Response {
    match db::get_activities(&state.pool, query.gig.as_deref(), query.order).await {
        Ok(activities) => Json(ActivitiesResponse {
            count: activities.len(),
            activities,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// `GET /activities/:id`
pub async fn get_activity(
    State(state): State<Arc<ApiState>>,
    Path(activity_id): Path<String>,
) -> Response {
    match db::get_activity(&state.pool, &activity_id).await {
        Ok(activity) => found_or_404("activity", &activity_id, activity),
        Err(e) => internal_error(e),
    }
}
