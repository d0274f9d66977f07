use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use busline_booking::SweepReport;
use busline_core::{Bus, Trip};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignBusRequest {
    pub bus_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AvailableBusesQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub scanned: usize,
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
    pub holds_released: u64,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            scanned: report.scanned,
            expired: report.expired,
            skipped: report.skipped,
            failed: report.failed,
            holds_released: report.holds_released,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/trips/{trip_id}/bus", post(assign_bus))
        .route("/v1/admin/buses/available", get(available_buses))
        .route("/v1/admin/sweep", post(run_sweep))
}

/// POST /v1/admin/trips/{trip_id}/bus
async fn assign_bus(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<AssignBusRequest>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.scheduler.assign_bus(trip_id, req.bus_id).await?))
}

/// GET /v1/admin/buses/available?start=..&end=..
async fn available_buses(
    State(state): State<AppState>,
    Query(query): Query<AvailableBusesQuery>,
) -> Result<Json<Vec<Bus>>, AppError> {
    Ok(Json(state.scheduler.get_available(query.start, query.end).await?))
}

/// Run one expiry sweep now instead of waiting for the next tick.
async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepResponse>, AppError> {
    let report = state.reaper.sweep().await?;
    Ok(Json(report.into()))
}
