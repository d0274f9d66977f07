use busline_booking::{
    BookingLifecycle, EventSink, ExpiryReaper, SeatAvailabilityChecker, SeatFeed,
    SeatReservationStore, TripBusConflictScheduler,
};
use busline_core::repository::{
    BookingRepository, CatalogRepository, FleetRepository, ReservationRepository,
};
use busline_core::Clock;
use busline_store::app_config::BookingRules;
use busline_store::{
    MemoryStore, PgBookingRepository, PgCatalogRepository, PgFleetRepository,
    PgReservationRepository, RedisClient,
};
use sqlx::PgPool;
use std::sync::Arc;

/// The four storage seams, however they are backed.
#[derive(Clone)]
pub struct Repositories {
    pub catalog: Arc<dyn CatalogRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub fleet: Arc<dyn FleetRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            catalog: Arc::new(PgCatalogRepository::new(pool.clone())),
            reservations: Arc::new(PgReservationRepository::new(pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(pool.clone())),
            fleet: Arc::new(PgFleetRepository::new(pool)),
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            catalog: store.clone(),
            reservations: store.clone(),
            bookings: store.clone(),
            fleet: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub checker: SeatAvailabilityChecker,
    pub reservations: Arc<SeatReservationStore>,
    pub lifecycle: Arc<BookingLifecycle>,
    pub scheduler: Arc<TripBusConflictScheduler>,
    pub reaper: Arc<ExpiryReaper>,
    pub feed: SeatFeed,
    pub redis: Option<Arc<RedisClient>>,
    pub requests_per_minute: i64,
    pub business_rules: BookingRules,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        business_rules: BookingRules,
    ) -> Self {
        let feed = SeatFeed::default();
        let checker = SeatAvailabilityChecker::new(
            repos.bookings.clone(),
            repos.reservations.clone(),
            clock.clone(),
        );
        let reservations = Arc::new(SeatReservationStore::new(
            repos.reservations.clone(),
            repos.catalog.clone(),
            checker.clone(),
            clock.clone(),
            feed.clone(),
        ));
        let lifecycle = Arc::new(BookingLifecycle::new(
            repos.bookings.clone(),
            repos.catalog.clone(),
            reservations.clone(),
            events,
            clock.clone(),
            business_rules.hold_window(),
        ));
        let reaper = Arc::new(ExpiryReaper::new(
            repos.bookings.clone(),
            lifecycle.clone(),
            reservations.clone(),
            clock,
            business_rules.reaper_interval(),
        ));
        let scheduler = Arc::new(TripBusConflictScheduler::new(repos.fleet));

        Self {
            checker,
            reservations,
            lifecycle,
            scheduler,
            reaper,
            feed,
            redis: None,
            requests_per_minute: 0,
            business_rules,
        }
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, requests_per_minute: i64) -> Self {
        self.redis = Some(redis);
        self.requests_per_minute = requests_per_minute;
        self
    }
}
