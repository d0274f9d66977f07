//! Process-local store with the same atomicity contract as the Postgres
//! repositories. Every transaction holds the single store lock for its whole
//! lifetime and works on a private copy that is swapped in on commit.

use async_trait::async_trait;
use busline_core::repository::{
    BookingRepository, CatalogRepository, FleetRepository, HoldTransaction, ReservationRepository,
    ScheduleTransaction,
};
use busline_core::{
    Booking, BookingStatus, Bus, BusStatus, CoreError, CoreResult, Passenger, Seat, SeatReservation,
    Ticket, TimeWindow, Transition, Trip,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct State {
    trips: HashMap<Uuid, Trip>,
    buses: HashMap<Uuid, Bus>,
    seats: HashMap<Uuid, Seat>,
    reservations: HashMap<Uuid, SeatReservation>,
    bookings: HashMap<Uuid, Booking>,
    passengers: HashMap<Uuid, Passenger>,
    tickets: HashMap<Uuid, Ticket>,
}

impl State {
    fn claimed_seats(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> i64 {
        self.passengers
            .values()
            .filter(|p| seat_ids.contains(&p.seat_id))
            .filter(|p| {
                self.bookings
                    .get(&p.booking_id)
                    .map(|b| b.trip_id == trip_id && b.status.claims_seats())
                    .unwrap_or(false)
            })
            .count() as i64
    }

    fn active_holds(&self, trip_id: Uuid, seat_ids: &[Uuid], now: DateTime<Utc>) -> i64 {
        self.reservations
            .values()
            .filter(|r| r.trip_id == trip_id && seat_ids.contains(&r.seat_id) && r.is_active(now))
            .count() as i64
    }

    fn delete_reservations_where(&mut self, pred: impl Fn(&SeatReservation) -> bool) -> u64 {
        let before = self.reservations.len();
        self.reservations.retain(|_, r| !pred(r));
        (before - self.reservations.len()) as u64
    }

    fn live_trips_overlapping<'a>(
        &'a self,
        bus_id: Uuid,
        window: &'a TimeWindow,
    ) -> impl Iterator<Item = &'a Trip> + 'a {
        self.trips.values().filter(move |t| {
            t.bus_id == Some(bus_id) && t.status.is_live() && t.window().overlaps(window)
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reservation row, including lapsed ones not yet purged.
    pub async fn reservation_rows(&self) -> Vec<SeatReservation> {
        self.state.lock().await.reservations.values().cloned().collect()
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.state.lock().await.trips.get(&id).cloned())
    }

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        Ok(self.state.lock().await.buses.get(&id).cloned())
    }

    async fn get_seats(&self, ids: &[Uuid]) -> CoreResult<Vec<Seat>> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.seats.get(id).cloned()).collect())
    }

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.trips.contains_key(&trip.id) {
            return Err(CoreError::Conflict(format!("trip {} already exists", trip.id)));
        }
        state.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.buses.contains_key(&bus.id) {
            return Err(CoreError::Conflict(format!("bus {} already exists", bus.id)));
        }
        state.buses.insert(bus.id, bus.clone());
        Ok(())
    }

    async fn insert_seats(&self, seats: &[Seat]) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        for seat in seats {
            state.seats.insert(seat.id, seat.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn begin_hold(&self, trip_id: Uuid) -> CoreResult<Box<dyn HoldTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let trip = guard
            .trips
            .get(&trip_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
        let work = guard.clone();
        Ok(Box::new(MemoryHoldTransaction { guard, work, trip }))
    }

    async fn count_active(&self, trip_id: Uuid, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<i64> {
        Ok(self.state.lock().await.active_holds(trip_id, seat_ids, now))
    }

    async fn get_by_session(&self, session_id: &str, now: DateTime<Utc>) -> CoreResult<Vec<SeatReservation>> {
        let state = self.state.lock().await;
        let mut holds: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.session_id == session_id && r.is_active(now))
            .cloned()
            .collect();
        holds.sort_by_key(|r| r.created_at);
        Ok(holds)
    }

    async fn get_by_trip(&self, trip_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<SeatReservation>> {
        let state = self.state.lock().await;
        let mut holds: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.trip_id == trip_id && r.is_active(now))
            .cloned()
            .collect();
        holds.sort_by_key(|r| r.created_at);
        Ok(holds)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let mut state = self.state.lock().await;
        Ok(state.delete_reservations_where(|r| !r.is_active(now)))
    }

    async fn delete_by_session(&self, session_id: &str) -> CoreResult<u64> {
        let mut state = self.state.lock().await;
        Ok(state.delete_reservations_where(|r| r.session_id == session_id))
    }

    async fn delete_by_booking(&self, booking_id: Uuid) -> CoreResult<u64> {
        let mut state = self.state.lock().await;
        Ok(state.delete_reservations_where(|r| r.booking_id == Some(booking_id)))
    }
}

pub struct MemoryHoldTransaction {
    guard: OwnedMutexGuard<State>,
    work: State,
    trip: Trip,
}

#[async_trait]
impl HoldTransaction for MemoryHoldTransaction {
    fn trip(&self) -> &Trip {
        &self.trip
    }

    async fn claimed_seat_count(&mut self, seat_ids: &[Uuid]) -> CoreResult<i64> {
        Ok(self.work.claimed_seats(self.trip.id, seat_ids))
    }

    async fn active_hold_count(&mut self, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<i64> {
        Ok(self.work.active_holds(self.trip.id, seat_ids, now))
    }

    async fn purge_expired(&mut self, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<u64> {
        let trip_id = self.trip.id;
        Ok(self.work.delete_reservations_where(|r| {
            r.trip_id == trip_id && seat_ids.contains(&r.seat_id) && !r.is_active(now)
        }))
    }

    async fn insert(&mut self, holds: &[SeatReservation]) -> CoreResult<()> {
        for hold in holds {
            // unique (trip_id, seat_id) over every row
            let taken = self
                .work
                .reservations
                .values()
                .any(|r| r.trip_id == hold.trip_id && r.seat_id == hold.seat_id);
            if taken {
                return Err(CoreError::Conflict(format!(
                    "seat {} on trip {} already has a reservation",
                    hold.seat_id, hold.trip_id
                )));
            }
            self.work.reservations.insert(hold.id, hold.clone());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let MemoryHoldTransaction { mut guard, work, .. } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_pending(
        &self,
        booking: &Booking,
        passengers: &[Passenger],
        session_id: &str,
    ) -> CoreResult<()> {
        let mut state = self.state.lock().await;

        if !state.trips.contains_key(&booking.trip_id) {
            return Err(CoreError::not_found("trip", booking.trip_id));
        }
        if state.bookings.contains_key(&booking.id) {
            return Err(CoreError::Conflict(format!("booking {} already exists", booking.id)));
        }

        let seat_ids: Vec<Uuid> = passengers.iter().map(|p| p.seat_id).collect();
        let attachable: Vec<Uuid> = state
            .reservations
            .values()
            .filter(|r| {
                r.session_id == session_id
                    && r.trip_id == booking.trip_id
                    && seat_ids.contains(&r.seat_id)
                    && r.booking_id.is_none()
                    && r.is_active(booking.created_at)
            })
            .map(|r| r.id)
            .collect();

        if attachable.len() != seat_ids.len() {
            return Err(CoreError::Conflict(format!(
                "session {} no longer holds all {} seats",
                session_id,
                seat_ids.len()
            )));
        }

        for id in attachable {
            if let Some(r) = state.reservations.get_mut(&id) {
                r.booking_id = Some(booking.id);
            }
        }
        state.bookings.insert(booking.id, booking.clone());
        for p in passengers {
            state.passengers.insert(p.id, p.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn passengers(&self, booking_id: Uuid) -> CoreResult<Vec<Passenger>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .passengers
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(rows)
    }

    async fn tickets(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .tickets
            .values()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));
        Ok(rows)
    }

    async fn list_by_status(&self, status: BookingStatus) -> CoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.bookings.values().filter(|b| b.status == status).cloned().collect();
        rows.sort_by_key(|b| b.created_at);
        Ok(rows)
    }

    async fn list_created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .bookings
            .values()
            .filter(|b| b.created_at >= from && b.created_at < to)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.created_at);
        Ok(rows)
    }

    async fn count_claimed_seats(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<i64> {
        Ok(self.state.lock().await.claimed_seats(trip_id, seat_ids))
    }

    async fn apply_transition(&self, transition: &Transition) -> CoreResult<bool> {
        let mut state = self.state.lock().await;

        let Some(booking) = state.bookings.get_mut(&transition.booking_id) else {
            return Err(CoreError::not_found("booking", transition.booking_id));
        };
        if booking.status != transition.from {
            return Ok(false);
        }
        booking.apply(transition);

        for ticket in &transition.tickets {
            state.tickets.insert(ticket.id, ticket.clone());
        }
        Ok(true)
    }
}

#[async_trait]
impl FleetRepository for MemoryStore {
    async fn begin_schedule(&self) -> CoreResult<Box<dyn ScheduleTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryScheduleTransaction { guard, work }))
    }

    async fn available_buses(&self, window: &TimeWindow) -> CoreResult<Vec<Bus>> {
        let state = self.state.lock().await;
        let mut buses: Vec<_> = state
            .buses
            .values()
            .filter(|b| b.status == BusStatus::Active)
            .filter(|b| state.live_trips_overlapping(b.id, window).next().is_none())
            .cloned()
            .collect();
        buses.sort_by_key(|b| b.id);
        Ok(buses)
    }
}

pub struct MemoryScheduleTransaction {
    guard: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl ScheduleTransaction for MemoryScheduleTransaction {
    async fn trip_for_update(&mut self, trip_id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.work.trips.get(&trip_id).cloned())
    }

    async fn bus_for_update(&mut self, bus_id: Uuid) -> CoreResult<Option<Bus>> {
        Ok(self.work.buses.get(&bus_id).cloned())
    }

    async fn overlapping_trips(
        &mut self,
        bus_id: Uuid,
        window: &TimeWindow,
        exclude: Uuid,
    ) -> CoreResult<Vec<Trip>> {
        let mut trips: Vec<_> = self
            .work
            .live_trips_overlapping(bus_id, window)
            .filter(|t| t.id != exclude)
            .cloned()
            .collect();
        trips.sort_by_key(|t| t.start_time);
        Ok(trips)
    }

    async fn set_trip_bus(&mut self, trip_id: Uuid, bus_id: Uuid) -> CoreResult<()> {
        let trip = self
            .work
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
        trip.bus_id = Some(bus_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let MemoryScheduleTransaction { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seeded_trip(store: &MemoryStore) -> Trip {
        let now = Utc::now();
        let trip = Trip::new(Uuid::new_v4(), now, now + Duration::hours(4), 2000).unwrap();
        store.insert_trip(&trip).await.unwrap();
        trip
    }

    #[tokio::test]
    async fn test_uncommitted_hold_is_rolled_back() {
        let store = MemoryStore::new();
        let trip = seeded_trip(&store).await;
        let now = Utc::now();
        let seat = Uuid::new_v4();

        {
            let mut tx = store.begin_hold(trip.id).await.unwrap();
            tx.insert(&[SeatReservation::new(trip.id, seat, "s1", now, Duration::minutes(5))])
                .await
                .unwrap();
            // dropped without commit
        }

        assert_eq!(store.count_active(trip.id, &[seat], now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_row_is_conflict_even_when_expired() {
        let store = MemoryStore::new();
        let trip = seeded_trip(&store).await;
        let now = Utc::now();
        let seat = Uuid::new_v4();

        let mut tx = store.begin_hold(trip.id).await.unwrap();
        tx.insert(&[SeatReservation::new(trip.id, seat, "s1", now, Duration::minutes(5))])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let later = now + Duration::minutes(10);
        let mut tx = store.begin_hold(trip.id).await.unwrap();
        let err = tx
            .insert(&[SeatReservation::new(trip.id, seat, "s2", later, Duration::minutes(5))])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_begin_hold_unknown_trip() {
        let store = MemoryStore::new();
        let err = store.begin_hold(Uuid::new_v4()).await.err().unwrap();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let trip = seeded_trip(&store).await;
        let now = Utc::now();
        let booking = Booking::pending(trip.id, now, Duration::minutes(30));
        store.insert_pending(&booking, &[], "s1").await.unwrap();

        let confirm = booking.plan(BookingStatus::Confirmed, now).unwrap();
        let cancel = booking.plan(BookingStatus::Cancelled, now).unwrap();

        assert!(store.apply_transition(&confirm).await.unwrap());
        assert!(!store.apply_transition(&cancel).await.unwrap());
        assert_eq!(
            store.get(booking.id).await.unwrap().unwrap().status,
            BookingStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_created_between_is_start_inclusive_end_exclusive() {
        let store = MemoryStore::new();
        let trip = seeded_trip(&store).await;
        let start = Utc::now();

        let mut created = Vec::new();
        for offset in [-1, 0, 30, 60] {
            let booking = Booking::pending(trip.id, start + Duration::minutes(offset), Duration::minutes(30));
            store.insert_pending(&booking, &[], "s1").await.unwrap();
            created.push(booking.id);
        }

        let rows = store
            .list_created_between(start, start + Duration::minutes(60))
            .await
            .unwrap();
        let ids: Vec<Uuid> = rows.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![created[1], created[2]]);

        let empty = store.list_created_between(start, start).await.unwrap();
        assert!(empty.is_empty());
    }
}
