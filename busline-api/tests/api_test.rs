use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use busline_api::{app, AppState, Repositories};
use busline_booking::NoopSink;
use busline_core::repository::CatalogRepository;
use busline_core::{Bus, BusStatus, ManualClock, Seat, Trip};
use busline_store::app_config::BookingRules;
use busline_store::MemoryStore;
use chrono::{Duration, TimeZone, Utc};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    store: MemoryStore,
    trip: Trip,
    bus: Bus,
    seats: Vec<Uuid>,
}

async fn setup() -> TestApp {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()));

    let bus = Bus {
        id: Uuid::new_v4(),
        status: BusStatus::Active,
        seat_map_id: Uuid::new_v4(),
    };
    store.insert_bus(&bus).await.unwrap();

    let seats: Vec<Seat> = (1..=4)
        .map(|n| Seat {
            id: Uuid::new_v4(),
            seat_map_id: bus.seat_map_id,
            seat_number: format!("{}A", n),
            row: n,
            column: 1,
            bookable: true,
        })
        .collect();
    store.insert_seats(&seats).await.unwrap();

    let departure = Utc.with_ymd_and_hms(2026, 5, 2, 7, 0, 0).unwrap();
    let mut trip = Trip::new(Uuid::new_v4(), departure, departure + Duration::hours(6), 3200).unwrap();
    trip.bus_id = Some(bus.id);
    store.insert_trip(&trip).await.unwrap();

    let state = AppState::new(
        Repositories::memory(store.clone()),
        clock.clone(),
        Arc::new(NoopSink),
        BookingRules::default(),
    );

    TestApp {
        router: app(state),
        clock,
        store,
        trip,
        bus,
        seats: seats.iter().map(|s| s.id).collect(),
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn hold_body(app: &TestApp, session: &str, seats: &[Uuid]) -> Value {
    json!({
        "trip_id": app.trip.id,
        "seat_ids": seats,
        "session_id": session,
    })
}

fn booking_body(app: &TestApp, session: &str, seats: &[Uuid]) -> Value {
    json!({
        "trip_id": app.trip.id,
        "session_id": session,
        "user_id": "user-7",
        "passengers": seats
            .iter()
            .map(|id| json!({ "seat_id": id, "name": "Ada Traveller" }))
            .collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_hold_blocks_other_sessions() {
    let app = setup().await;
    let seat = app.seats[0];

    let (status, body) = send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-a", &[seat]))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["seat_ids"][0], seat.to_string());

    let (status, _) = send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-b", &[seat]))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/v1/trips/{}/availability?seat_ids={}", app.trip.id, seat);
    let (status, body) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);

    let (_, body) = send(&app.router, "GET", &format!("/v1/trips/{}/holds", app.trip.id), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_out_of_range_ttl_is_bad_request() {
    let app = setup().await;
    for ttl in [i64::MAX, 10 * 365 * 24 * 3600] {
        let mut body = hold_body(&app, "sess-a", &[app.seats[0]]);
        body["ttl_seconds"] = json!(ttl);
        let (status, body) = send(&app.router, "POST", "/v1/holds", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    let uri = format!("/v1/trips/{}/availability?seat_ids={}", app.trip.id, app.seats[0]);
    let (_, body) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn test_seat_stream_only_carries_its_trip() {
    let app = setup().await;
    let mut other = Trip::new(
        Uuid::new_v4(),
        app.trip.start_time + Duration::days(1),
        app.trip.end_time + Duration::days(1),
        3200,
    )
    .unwrap();
    other.bus_id = Some(app.bus.id);
    app.store.insert_trip(&other).await.unwrap();

    let request = Request::builder()
        .uri(format!("/v1/trips/{}/seats/stream", app.trip.id))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut frames = response.into_body().into_data_stream();

    let mut other_hold = hold_body(&app, "sess-b", &app.seats[1..2]);
    other_hold["trip_id"] = json!(other.id);
    let (status, _) = send(&app.router, "POST", "/v1/holds", Some(other_hold)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-a", &app.seats[..1]))).await;
    assert_eq!(status, StatusCode::CREATED);

    let frame = tokio::time::timeout(std::time::Duration::from_secs(2), frames.next())
        .await
        .expect("no seat update within 2s")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("event: seat_update"));
    assert!(text.contains(&app.trip.id.to_string()));
    assert!(text.contains(&app.seats[0].to_string()));
    assert!(text.contains("HELD"));
    assert!(!text.contains(&other.id.to_string()));

    let idle = tokio::time::timeout(std::time::Duration::from_millis(200), frames.next()).await;
    assert!(idle.is_err());
}

#[tokio::test]
async fn test_release_session_frees_seats() {
    let app = setup().await;
    let seats = &app.seats[..2];
    send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-a", seats))).await;

    let (status, body) = send(&app.router, "DELETE", "/v1/holds/session/sess-a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], 2);

    let (_, body) = send(&app.router, "GET", "/v1/holds/session/sess-a", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_hold_requests_are_bad_requests() {
    let app = setup().await;
    let (status, _) = send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-a", &[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = hold_body(&app, "sess-a", &[app.seats[0]]);
    body["trip_id"] = json!(Uuid::new_v4());
    let (status, _) = send(&app.router, "POST", "/v1/holds", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_booking_checkout_flow() {
    let app = setup().await;
    let seats = &app.seats[..2];
    send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-a", seats))).await;

    let (status, body) = send(&app.router, "POST", "/v1/bookings", Some(booking_body(&app, "sess-a", seats))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["status"], "PENDING");
    assert_eq!(body["booking"]["total_amount"], 6400);
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, "POST", &format!("/v1/bookings/{}/confirm", booking_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "CONFIRMED");
    assert_eq!(body["tickets"].as_array().unwrap().len(), 2);
    assert!(app.store.reservation_rows().await.is_empty());

    // Confirmed seats stay taken once every hold is gone.
    let (status, _) = send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-b", &seats[..1]))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app.router, "POST", &format!("/v1/bookings/{}/confirm", booking_id), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app.router, "POST", &format!("/v1/bookings/{}/complete", booking_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");
}

#[tokio::test]
async fn test_booking_without_holds_is_conflict() {
    let app = setup().await;
    let (status, _) = send(
        &app.router,
        "POST",
        "/v1/bookings",
        Some(booking_body(&app, "sess-a", &app.seats[..1])),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_sweep_expires_unpaid_booking() {
    let app = setup().await;
    let seats = &app.seats[..1];
    send(&app.router, "POST", "/v1/holds", Some(hold_body(&app, "sess-a", seats))).await;
    let (_, body) = send(&app.router, "POST", "/v1/bookings", Some(booking_body(&app, "sess-a", seats))).await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    app.clock.advance(Duration::minutes(31));
    let (status, report) = send(&app.router, "POST", "/v1/admin/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["expired"], 1);

    let (_, body) = send(&app.router, "GET", &format!("/v1/bookings/{}", booking_id), None).await;
    assert_eq!(body["booking"]["status"], "EXPIRED");

    let (status, _) = send(&app.router, "POST", &format!("/v1/bookings/{}/confirm", booking_id), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_booking_is_not_found() {
    let app = setup().await;
    let (status, body) = send(&app.router, "GET", &format!("/v1/bookings/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_bus_assignment_conflict() {
    let app = setup().await;
    let overlapping = Trip::new(
        Uuid::new_v4(),
        app.trip.start_time + Duration::hours(2),
        app.trip.end_time + Duration::hours(2),
        3200,
    )
    .unwrap();
    app.store.insert_trip(&overlapping).await.unwrap();

    let uri = format!("/v1/admin/trips/{}/bus", overlapping.id);
    let (status, _) = send(&app.router, "POST", &uri, Some(json!({ "bus_id": app.bus.id }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!(
        "/v1/admin/buses/available?start={}&end={}",
        app.trip.end_time.format("%Y-%m-%dT%H:%M:%SZ"),
        (app.trip.end_time + Duration::hours(1)).format("%Y-%m-%dT%H:%M:%SZ"),
    );
    let (status, body) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}
