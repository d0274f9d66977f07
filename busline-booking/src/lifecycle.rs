use busline_core::repository::{BookingRepository, CatalogRepository};
use busline_core::{
    Booking, BookingEvent, BookingStatus, Clock, CoreError, CoreResult, Passenger, SeatFeedKind,
    Ticket,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::notifier::EventSink;
use crate::reservations::SeatReservationStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub trip_id: Uuid,
    pub session_id: String,
    pub user_id: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub passengers: Vec<PassengerDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PassengerDetails {
    pub seat_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub passengers: Vec<Passenger>,
    pub tickets: Vec<Ticket>,
}

/// Owns every booking status change. Each transition is a compare-and-set on
/// the stored status, so a payment confirmation racing an expiry sweep has
/// exactly one winner.
pub struct BookingLifecycle {
    bookings: Arc<dyn BookingRepository>,
    catalog: Arc<dyn CatalogRepository>,
    reservations: Arc<SeatReservationStore>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    hold_window: Duration,
}

impl BookingLifecycle {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        catalog: Arc<dyn CatalogRepository>,
        reservations: Arc<SeatReservationStore>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        hold_window: Duration,
    ) -> Self {
        Self {
            bookings,
            catalog,
            reservations,
            events,
            clock,
            hold_window,
        }
    }

    pub fn hold_window(&self) -> Duration {
        self.hold_window
    }

    /// Create a pending booking from seats the session already holds.
    pub async fn create(&self, request: NewBooking) -> CoreResult<BookingDetails> {
        if request.passengers.is_empty() {
            return Err(CoreError::Validation("a booking needs at least one passenger".to_string()));
        }
        if request.user_id.is_none() && request.contact_email.is_none() && request.contact_phone.is_none() {
            return Err(CoreError::Validation("a user id or contact detail is required".to_string()));
        }
        let seat_ids: Vec<Uuid> = request.passengers.iter().map(|p| p.seat_id).collect();
        if seat_ids.iter().collect::<HashSet<_>>().len() != seat_ids.len() {
            return Err(CoreError::Validation("two passengers on one seat".to_string()));
        }

        let trip = self
            .catalog
            .get_trip(request.trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", request.trip_id))?;
        if trip.status.is_terminal() {
            return Err(CoreError::Validation(format!("trip {} is closed for sale", trip.id)));
        }

        let held: HashSet<Uuid> = self
            .reservations
            .get_by_session(&request.session_id)
            .await?
            .into_iter()
            .filter(|r| r.trip_id == trip.id && r.booking_id.is_none())
            .map(|r| r.seat_id)
            .collect();
        if let Some(missing) = seat_ids.iter().find(|id| !held.contains(id)) {
            return Err(CoreError::Conflict(format!(
                "seat {} is not held by session {}",
                missing, request.session_id
            )));
        }

        let seats = self.catalog.get_seats(&seat_ids).await?;
        let now = self.clock.now();
        let mut booking = Booking::pending(trip.id, now, self.hold_window);
        booking.user_id = request.user_id;
        booking.contact_email = request.contact_email;
        booking.contact_phone = request.contact_phone;

        let mut passengers = Vec::with_capacity(request.passengers.len());
        for details in request.passengers {
            let seat = seats
                .iter()
                .find(|s| s.id == details.seat_id)
                .ok_or_else(|| CoreError::not_found("seat", details.seat_id))?;
            let passenger = Passenger {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                seat_id: seat.id,
                seat_number: seat.seat_number.clone(),
                name: details.name,
                phone: details.phone,
                price: trip.price,
            };
            booking.add_passenger(&passenger);
            passengers.push(passenger);
        }

        self.bookings
            .insert_pending(&booking, &passengers, &request.session_id)
            .await?;

        info!(
            booking_id = %booking.id,
            trip_id = %trip.id,
            seats = booking.total_seats,
            "Booking created, awaiting payment"
        );
        self.events.emit(BookingEvent::created(&booking));

        Ok(BookingDetails {
            booking,
            passengers,
            tickets: Vec::new(),
        })
    }

    pub async fn get(&self, booking_id: Uuid) -> CoreResult<BookingDetails> {
        let booking = self.load(booking_id).await?;
        let passengers = self.bookings.passengers(booking_id).await?;
        let tickets = self.bookings.tickets(booking_id).await?;
        Ok(BookingDetails {
            booking,
            passengers,
            tickets,
        })
    }

    /// Payment succeeded: the passenger rows become the permanent seat claim.
    pub async fn confirm(&self, booking_id: Uuid) -> CoreResult<BookingDetails> {
        let booking = self.load(booking_id).await?;
        let mut transition = booking.plan(BookingStatus::Confirmed, self.clock.now())?;

        let passengers = self.bookings.passengers(booking_id).await?;
        transition.tickets = passengers.iter().map(|p| Ticket::issue(&booking, p)).collect();

        let booking = self.commit(booking, transition).await?;
        let tickets = self.bookings.tickets(booking_id).await?;
        Ok(BookingDetails {
            booking,
            passengers,
            tickets,
        })
    }

    /// Only the expiry reaper calls this.
    pub(crate) async fn expire(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.load(booking_id).await?;
        let transition = booking.plan(BookingStatus::Expired, self.clock.now())?;
        self.commit(booking, transition).await
    }

    pub async fn cancel(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.load(booking_id).await?;
        let transition = booking.plan(BookingStatus::Cancelled, self.clock.now())?;
        self.commit(booking, transition).await
    }

    pub async fn complete(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.load(booking_id).await?;
        let transition = booking.plan(BookingStatus::Completed, self.clock.now())?;
        self.commit(booking, transition).await
    }

    async fn load(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("booking", booking_id))
    }

    async fn commit(&self, mut booking: Booking, transition: busline_core::Transition) -> CoreResult<Booking> {
        if !self.bookings.apply_transition(&transition).await? {
            // Lost the race; report against whatever state won.
            let current = self.load(booking.id).await?;
            return Err(CoreError::invalid_transition(current.status, transition.to));
        }
        booking.apply(&transition);

        info!(
            booking_id = %booking.id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "Booking transitioned"
        );

        if transition.to != BookingStatus::Completed {
            // The transition is already durable; a leftover hold lapses on its own TTL.
            if let Err(e) = self.reservations.delete_by_booking(booking.id).await {
                warn!(booking_id = %booking.id, error = %e, "Failed to clear booking holds");
            }
        }

        let passengers = match transition.to {
            BookingStatus::Confirmed => Some(SeatFeedKind::Booked),
            BookingStatus::Expired | BookingStatus::Cancelled => Some(SeatFeedKind::Released),
            _ => None,
        };
        if let Some(kind) = passengers {
            match self.bookings.passengers(booking.id).await {
                Ok(rows) => self.reservations.feed().publish(
                    booking.trip_id,
                    rows.iter().map(|p| p.seat_id).collect(),
                    kind,
                    transition.at,
                ),
                Err(e) => warn!(booking_id = %booking.id, error = %e, "Seat feed update skipped"),
            }
        }

        self.events.emit(BookingEvent::from_transition(&transition));
        Ok(booking)
    }
}
