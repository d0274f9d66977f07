use busline_core::repository::{BookingRepository, ReservationRepository};
use busline_core::{Clock, CoreResult};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only answer to "are these seats free on this trip right now".
///
/// The answer is advisory: holds are only ever created through
/// [`crate::SeatReservationStore::create`], which repeats both counts inside
/// the trip-scoped hold transaction before inserting.
#[derive(Clone)]
pub struct SeatAvailabilityChecker {
    bookings: Arc<dyn BookingRepository>,
    reservations: Arc<dyn ReservationRepository>,
    clock: Arc<dyn Clock>,
}

impl SeatAvailabilityChecker {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        reservations: Arc<dyn ReservationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            reservations,
            clock,
        }
    }

    pub async fn is_available(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<bool> {
        if seat_ids.is_empty() {
            return Ok(true);
        }

        let claimed = self.bookings.count_claimed_seats(trip_id, seat_ids).await?;
        if claimed > 0 {
            return Ok(false);
        }

        let held = self
            .reservations
            .count_active(trip_id, seat_ids, self.clock.now())
            .await?;
        Ok(held == 0)
    }
}
