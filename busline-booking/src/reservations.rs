use busline_core::repository::{CatalogRepository, ReservationRepository};
use busline_core::{Clock, CoreError, CoreResult, SeatFeedKind, SeatReservation, MAX_HOLD_TTL_SECONDS};
use chrono::Duration;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::availability::SeatAvailabilityChecker;
use crate::feed::SeatFeed;

/// The only writer of seat holds.
pub struct SeatReservationStore {
    repo: Arc<dyn ReservationRepository>,
    catalog: Arc<dyn CatalogRepository>,
    checker: SeatAvailabilityChecker,
    clock: Arc<dyn Clock>,
    feed: SeatFeed,
}

impl SeatReservationStore {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        catalog: Arc<dyn CatalogRepository>,
        checker: SeatAvailabilityChecker,
        clock: Arc<dyn Clock>,
        feed: SeatFeed,
    ) -> Self {
        Self {
            repo,
            catalog,
            checker,
            clock,
            feed,
        }
    }

    /// Hold every seat in `seat_ids` for `session_id`, or none of them.
    pub async fn create(
        &self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        session_id: &str,
        ttl: Duration,
    ) -> CoreResult<Vec<SeatReservation>> {
        if session_id.trim().is_empty() {
            return Err(CoreError::Validation("session id is required".to_string()));
        }
        if seat_ids.is_empty() {
            return Err(CoreError::Validation("at least one seat is required".to_string()));
        }
        if seat_ids.iter().collect::<HashSet<_>>().len() != seat_ids.len() {
            return Err(CoreError::Validation("duplicate seat in request".to_string()));
        }
        if ttl <= Duration::zero() {
            return Err(CoreError::Validation("hold ttl must be positive".to_string()));
        }
        if ttl > Duration::seconds(MAX_HOLD_TTL_SECONDS) {
            return Err(CoreError::Validation(format!(
                "hold ttl may not exceed {} seconds",
                MAX_HOLD_TTL_SECONDS
            )));
        }

        self.ensure_seats_on_trip(trip_id, seat_ids).await?;

        // Cheap early answer for the common case; the transaction below is authoritative.
        if !self.checker.is_available(trip_id, seat_ids).await? {
            return Err(CoreError::Conflict(format!(
                "one or more seats on trip {} are already taken",
                trip_id
            )));
        }

        let now = self.clock.now();
        let mut tx = self.repo.begin_hold(trip_id).await?;

        if tx.trip().status.is_terminal() {
            return Err(CoreError::Validation(format!("trip {} is closed for sale", trip_id)));
        }
        if tx.claimed_seat_count(seat_ids).await? > 0 || tx.active_hold_count(seat_ids, now).await? > 0 {
            return Err(CoreError::Conflict(format!(
                "one or more seats on trip {} are already taken",
                trip_id
            )));
        }

        let purged = tx.purge_expired(seat_ids, now).await?;
        if purged > 0 {
            debug!(%trip_id, purged, "Reclaimed lapsed holds before insert");
        }

        let holds: Vec<SeatReservation> = seat_ids
            .iter()
            .map(|seat_id| SeatReservation::new(trip_id, *seat_id, session_id, now, ttl))
            .collect();
        tx.insert(&holds).await?;
        tx.commit().await?;

        info!(%trip_id, session_id, seats = holds.len(), "Seats held");
        self.feed.publish(trip_id, seat_ids.to_vec(), SeatFeedKind::Held, now);
        Ok(holds)
    }

    pub async fn get_by_session(&self, session_id: &str) -> CoreResult<Vec<SeatReservation>> {
        self.repo.get_by_session(session_id, self.clock.now()).await
    }

    pub async fn get_by_trip(&self, trip_id: Uuid) -> CoreResult<Vec<SeatReservation>> {
        self.repo.get_by_trip(trip_id, self.clock.now()).await
    }

    pub async fn delete_expired(&self) -> CoreResult<u64> {
        self.repo.delete_expired(self.clock.now()).await
    }

    pub async fn delete_by_session(&self, session_id: &str) -> CoreResult<u64> {
        let now = self.clock.now();
        let held = self.repo.get_by_session(session_id, now).await?;
        let removed = self.repo.delete_by_session(session_id).await?;

        if removed > 0 {
            info!(session_id, removed, "Session holds released");
            for (trip_id, seats) in group_by_trip(&held) {
                self.feed.publish(trip_id, seats, SeatFeedKind::Released, now);
            }
        }
        Ok(removed)
    }

    pub async fn delete_by_booking(&self, booking_id: Uuid) -> CoreResult<u64> {
        let removed = self.repo.delete_by_booking(booking_id).await?;
        if removed > 0 {
            debug!(%booking_id, removed, "Booking holds cleared");
        }
        Ok(removed)
    }

    pub(crate) fn feed(&self) -> &SeatFeed {
        &self.feed
    }

    async fn ensure_seats_on_trip(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<()> {
        let trip = self
            .catalog
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
        let bus_id = trip
            .bus_id
            .ok_or_else(|| CoreError::Validation(format!("trip {} has no bus assigned", trip_id)))?;
        let bus = self
            .catalog
            .get_bus(bus_id)
            .await?
            .ok_or_else(|| CoreError::not_found("bus", bus_id))?;

        let seats = self.catalog.get_seats(seat_ids).await?;
        for seat_id in seat_ids {
            let seat = seats
                .iter()
                .find(|s| s.id == *seat_id)
                .ok_or_else(|| CoreError::not_found("seat", seat_id))?;
            if seat.seat_map_id != bus.seat_map_id {
                return Err(CoreError::Validation(format!(
                    "seat {} is not on the bus serving trip {}",
                    seat.seat_number, trip_id
                )));
            }
            if !seat.bookable {
                return Err(CoreError::Validation(format!("seat {} is not bookable", seat.seat_number)));
            }
        }
        Ok(())
    }
}

fn group_by_trip(holds: &[SeatReservation]) -> BTreeMap<Uuid, Vec<Uuid>> {
    let mut grouped: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for hold in holds {
        grouped.entry(hold.trip_id).or_default().push(hold.seat_id);
    }
    grouped
}
