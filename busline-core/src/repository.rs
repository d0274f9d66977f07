use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, Passenger, Ticket, Transition};
use crate::fleet::{Bus, Seat, Trip};
use crate::reservation::SeatReservation;
use crate::schedule::TimeWindow;
use crate::CoreResult;

/// Read-mostly access to trips, buses and seats.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>>;

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>>;

    async fn get_seats(&self, ids: &[Uuid]) -> CoreResult<Vec<Seat>>;

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()>;

    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()>;

    async fn insert_seats(&self, seats: &[Seat]) -> CoreResult<()>;
}

/// Storage for seat holds.
///
/// Every write path that creates holds goes through [`HoldTransaction`], which is
/// scoped to one trip and serializes against every other hold on that trip.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Open a transaction holding the trip's lock. Fails with `NotFound` for unknown trips.
    async fn begin_hold(&self, trip_id: Uuid) -> CoreResult<Box<dyn HoldTransaction>>;

    async fn count_active(&self, trip_id: Uuid, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<i64>;

    async fn get_by_session(&self, session_id: &str, now: DateTime<Utc>) -> CoreResult<Vec<SeatReservation>>;

    async fn get_by_trip(&self, trip_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<SeatReservation>>;

    /// Returns the number of rows removed. Zero is not an error.
    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<u64>;

    async fn delete_by_session(&self, session_id: &str) -> CoreResult<u64>;

    async fn delete_by_booking(&self, booking_id: Uuid) -> CoreResult<u64>;
}

/// One serialized unit of hold creation for a single trip.
/// Dropping it without calling `commit` discards every change.
#[async_trait]
pub trait HoldTransaction: Send {
    fn trip(&self) -> &Trip;

    /// Passenger rows on pending or confirmed bookings for these seats.
    async fn claimed_seat_count(&mut self, seat_ids: &[Uuid]) -> CoreResult<i64>;

    async fn active_hold_count(&mut self, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<i64>;

    /// Remove lapsed holds on these seats so their slots can be reused.
    async fn purge_expired(&mut self, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<u64>;

    /// Fails with `Conflict` if any (trip, seat) pair already has a row.
    async fn insert(&mut self, holds: &[SeatReservation]) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert a pending booking with its passengers and attach the session's
    /// holds on the passengers' seats to it, atomically. Holds must still be
    /// active at `booking.created_at` and not yet attached, otherwise `Conflict`.
    async fn insert_pending(
        &self,
        booking: &Booking,
        passengers: &[Passenger],
        session_id: &str,
    ) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn passengers(&self, booking_id: Uuid) -> CoreResult<Vec<Passenger>>;

    async fn tickets(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>>;

    async fn list_by_status(&self, status: BookingStatus) -> CoreResult<Vec<Booking>>;

    async fn list_created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> CoreResult<Vec<Booking>>;

    /// Passenger rows for these seats on bookings that still claim seats.
    async fn count_claimed_seats(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<i64>;

    /// Write the transition only if the stored status still equals `transition.from`.
    /// Returns `false` when another writer got there first.
    async fn apply_transition(&self, transition: &Transition) -> CoreResult<bool>;
}

#[async_trait]
pub trait FleetRepository: Send + Sync {
    async fn begin_schedule(&self) -> CoreResult<Box<dyn ScheduleTransaction>>;

    /// Active buses with no live trip overlapping `window`.
    async fn available_buses(&self, window: &TimeWindow) -> CoreResult<Vec<Bus>>;
}

/// Row-locking transaction used to link buses to trips.
#[async_trait]
pub trait ScheduleTransaction: Send {
    async fn trip_for_update(&mut self, trip_id: Uuid) -> CoreResult<Option<Trip>>;

    async fn bus_for_update(&mut self, bus_id: Uuid) -> CoreResult<Option<Bus>>;

    /// Scheduled or active trips on `bus_id` overlapping `window`, except `exclude`.
    async fn overlapping_trips(
        &mut self,
        bus_id: Uuid,
        window: &TimeWindow,
        exclude: Uuid,
    ) -> CoreResult<Vec<Trip>>;

    async fn set_trip_bus(&mut self, trip_id: Uuid, bus_id: Uuid) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}
