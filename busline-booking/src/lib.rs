pub mod availability;
pub mod feed;
pub mod jobs;
pub mod lifecycle;
pub mod notifier;
pub mod reaper;
pub mod reservations;
pub mod scheduler;

#[cfg(test)]
mod testkit;

pub use availability::SeatAvailabilityChecker;
pub use feed::SeatFeed;
pub use jobs::{JobError, JobScheduler, ScheduledJob};
pub use lifecycle::{BookingDetails, BookingLifecycle, NewBooking, PassengerDetails};
pub use notifier::{EventSink, NoopSink, NotificationQueue};
pub use reaper::{ExpiryReaper, SweepReport};
pub use reservations::SeatReservationStore;
pub use scheduler::TripBusConflictScheduler;
