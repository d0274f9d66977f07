use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use busline_core::SeatReservation;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub session_id: String,
    /// Falls back to the configured seat hold TTL.
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub session_id: String,
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// Comma separated seat ids.
    pub seat_ids: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/holds", post(create_hold))
        .route(
            "/v1/holds/session/{session_id}",
            get(session_holds).delete(release_session),
        )
        .route("/v1/trips/{trip_id}/holds", get(trip_holds))
        .route("/v1/trips/{trip_id}/availability", get(availability))
        .route("/v1/trips/{trip_id}/seats/stream", get(seat_stream))
}

fn parse_seat_ids(raw: &str) -> Result<Vec<Uuid>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).map_err(|_| AppError::BadRequest(format!("invalid seat id {}", s))))
        .collect()
}

async fn availability(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let seat_ids = parse_seat_ids(&query.seat_ids)?;
    let available = state.checker.is_available(trip_id, &seat_ids).await?;
    Ok(Json(AvailabilityResponse {
        trip_id,
        seat_ids,
        available,
    }))
}

async fn create_hold(
    State(state): State<AppState>,
    Json(req): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), AppError> {
    let ttl = match req.ttl_seconds {
        Some(seconds) => Duration::try_seconds(seconds)
            .ok_or_else(|| AppError::BadRequest(format!("ttl_seconds {} is out of range", seconds)))?,
        None => state.business_rules.seat_hold_ttl(),
    };

    let holds = state
        .reservations
        .create(req.trip_id, &req.seat_ids, &req.session_id, ttl)
        .await?;

    Ok((StatusCode::CREATED, Json(summarize(req.session_id, req.trip_id, &holds))))
}

async fn session_holds(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<SeatReservation>>, AppError> {
    Ok(Json(state.reservations.get_by_session(&session_id).await?))
}

async fn release_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = state.reservations.delete_by_session(&session_id).await?;
    Ok(Json(ReleaseResponse { released }))
}

async fn trip_holds(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Vec<SeatReservation>>, AppError> {
    Ok(Json(state.reservations.get_by_trip(trip_id).await?))
}

async fn seat_stream(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(state.feed.subscribe()).filter_map(move |result| async move {
        match result {
            Ok(event) if event.trip_id == trip_id => {
                Some(Event::default().event("seat_update").json_data(&event))
            }
            // Other trips, or a lagging receiver that skipped updates.
            _ => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn summarize(session_id: String, trip_id: Uuid, holds: &[SeatReservation]) -> HoldResponse {
    HoldResponse {
        session_id,
        trip_id,
        seat_ids: holds.iter().map(|h| h.seat_id).collect(),
        expires_at: holds.iter().map(|h| h.expires_at).min(),
    }
}
