pub mod booking;
pub mod clock;
pub mod events;
pub mod fleet;
pub mod repository;
pub mod reservation;
pub mod schedule;

pub use booking::{Booking, BookingStatus, Passenger, PaymentStatus, Ticket, Transition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{BookingEvent, EventPublisher, SeatFeedEvent, SeatFeedKind};
pub use fleet::{Bus, BusStatus, Seat, Trip, TripStatus};
pub use reservation::{SeatReservation, MAX_HOLD_TTL_SECONDS};
pub use schedule::TimeWindow;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Storage unavailable: {0}")]
    Transient(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        CoreError::InvalidStateTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    /// Errors a caller may retry without re-checking availability first.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_outages_are_transient() {
        assert!(CoreError::Transient("pool timed out".to_string()).is_transient());
        assert!(!CoreError::Conflict("seat taken".to_string()).is_transient());
        assert!(!CoreError::not_found("booking", "b-1").is_transient());
    }
}
