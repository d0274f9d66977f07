use busline_core::repository::CatalogRepository;
use busline_core::{BookingEvent, Bus, BusStatus, ManualClock, Seat, Trip};
use busline_store::MemoryStore;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    BookingDetails, BookingLifecycle, EventSink, ExpiryReaper, NewBooking, PassengerDetails,
    SeatAvailabilityChecker, SeatFeed, SeatReservationStore,
};

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingSink {
    pub fn last(&self) -> Option<BookingEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: BookingEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// One trip on one bus, a handful of seats, every service wired to a
/// memory store and a manual clock.
pub struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub trip: Trip,
    pub feed: SeatFeed,
    pub sink: Arc<RecordingSink>,
    pub checker: SeatAvailabilityChecker,
    pub reservations: Arc<SeatReservationStore>,
    pub lifecycle: Arc<BookingLifecycle>,
    pub reaper: ExpiryReaper,
    seats: HashMap<String, Uuid>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_hold_window(Duration::minutes(30)).await
    }

    pub async fn with_hold_window(hold_window: Duration) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 6, 0, 0).unwrap(),
        ));

        let seat_map_id = Uuid::new_v4();
        let bus = Bus {
            id: Uuid::new_v4(),
            status: BusStatus::Active,
            seat_map_id,
        };
        store.insert_bus(&bus).await.unwrap();

        let mut seats = HashMap::new();
        let mut rows = Vec::new();
        for (i, number) in ["1A", "1B", "2A", "2C", "3D", "DRIVER"].iter().enumerate() {
            let seat = Seat {
                id: Uuid::new_v4(),
                seat_map_id,
                seat_number: number.to_string(),
                row: i as i32 / 2 + 1,
                column: i as i32 % 2 + 1,
                bookable: *number != "DRIVER",
            };
            seats.insert(number.to_string(), seat.id);
            rows.push(seat);
        }
        store.insert_seats(&rows).await.unwrap();

        let departure = Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap();
        let mut trip = Trip::new(Uuid::new_v4(), departure, departure + Duration::hours(5), 2500).unwrap();
        trip.bus_id = Some(bus.id);
        store.insert_trip(&trip).await.unwrap();

        let repo = Arc::new(store.clone());
        let feed = SeatFeed::default();
        let sink = Arc::new(RecordingSink::default());
        let checker = SeatAvailabilityChecker::new(repo.clone(), repo.clone(), clock.clone());
        let reservations = Arc::new(SeatReservationStore::new(
            repo.clone(),
            repo.clone(),
            checker.clone(),
            clock.clone(),
            feed.clone(),
        ));
        let lifecycle = Arc::new(BookingLifecycle::new(
            repo.clone(),
            repo.clone(),
            reservations.clone(),
            sink.clone(),
            clock.clone(),
            hold_window,
        ));
        let reaper = ExpiryReaper::new(
            repo.clone(),
            lifecycle.clone(),
            reservations.clone(),
            clock.clone(),
            std::time::Duration::from_secs(300),
        );

        Self {
            store,
            clock,
            trip,
            feed,
            sink,
            checker,
            reservations,
            lifecycle,
            reaper,
            seats,
        }
    }

    pub fn seat(&self, number: &str) -> Uuid {
        self.seats[number]
    }

    pub fn new_booking(&self, session: &str, seats: &[&str]) -> NewBooking {
        NewBooking {
            trip_id: self.trip.id,
            session_id: session.to_string(),
            user_id: None,
            contact_email: Some(format!("{}@example.com", session)),
            contact_phone: None,
            passengers: seats
                .iter()
                .map(|number| PassengerDetails {
                    seat_id: self.seat(number),
                    name: format!("Passenger {}", number),
                    phone: None,
                })
                .collect(),
        }
    }

    pub async fn hold_and_book(&self, session: &str, seats: &[&str]) -> BookingDetails {
        let ids: Vec<Uuid> = seats.iter().map(|s| self.seat(s)).collect();
        self.reservations
            .create(self.trip.id, &ids, session, Duration::minutes(10))
            .await
            .unwrap();
        self.lifecycle
            .create(self.new_booking(session, seats))
            .await
            .unwrap()
    }
}
