use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "EXPIRED" => Ok(BookingStatus::Expired),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(CoreError::Validation(format!("unknown booking status {}", other))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Expired | BookingStatus::Completed
        )
    }

    /// Statuses whose passenger rows hold their seats.
    pub fn claims_seats(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Expired)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(CoreError::Validation(format!("unknown payment status {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_seats: i32,
    pub total_amount: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Only meaningful while the booking is pending.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn pending(trip_id: Uuid, now: DateTime<Utc>, hold_window: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            user_id: None,
            contact_email: None,
            contact_phone: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_seats: 0,
            total_amount: 0,
            created_at: now,
            updated_at: now,
            expires_at: Some(now + hold_window),
        }
    }

    pub fn add_passenger(&mut self, passenger: &Passenger) {
        self.total_seats += 1;
        self.total_amount += passenger.price;
    }

    /// Validate a move to `next` and describe the resulting row change.
    pub fn plan(&self, next: BookingStatus, now: DateTime<Utc>) -> CoreResult<Transition> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::invalid_transition(self.status, next));
        }

        let mut transition = Transition {
            booking_id: self.id,
            trip_id: self.trip_id,
            from: self.status,
            to: next,
            payment_status: self.payment_status,
            expires_at: self.expires_at,
            tickets: Vec::new(),
            at: now,
        };

        match next {
            BookingStatus::Confirmed => {
                transition.payment_status = PaymentStatus::Paid;
                transition.expires_at = None;
            }
            BookingStatus::Expired => {
                match self.expires_at {
                    Some(expires_at) if now > expires_at => {}
                    _ => {
                        return Err(CoreError::Validation(format!(
                            "booking {} has not reached its expiry",
                            self.id
                        )))
                    }
                }
                transition.payment_status = PaymentStatus::Failed;
                transition.expires_at = None;
            }
            BookingStatus::Cancelled => {
                transition.expires_at = None;
            }
            BookingStatus::Completed | BookingStatus::Pending => {}
        }

        Ok(transition)
    }

    pub fn apply(&mut self, transition: &Transition) {
        self.status = transition.to;
        self.payment_status = transition.payment_status;
        self.expires_at = transition.expires_at;
        self.updated_at = transition.at;
    }
}

/// A status change to persist with compare-and-set on `from`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub payment_status: PaymentStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Tickets to insert in the same write. Non-empty only on confirmation.
    pub tickets: Vec<Ticket>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub seat_id: Uuid,
    pub seat_number: String,
    pub name: String,
    pub phone: Option<String>,
    pub price: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub passenger_id: Uuid,
    pub trip_id: Uuid,
    pub ticket_number: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn issue(booking: &Booking, passenger: &Passenger) -> Self {
        let reference = booking.id.simple().to_string()[..8].to_uppercase();
        Self {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            passenger_id: passenger.id,
            trip_id: booking.trip_id,
            ticket_number: format!("BL-{}-{}", reference, passenger.seat_number),
            is_used: false,
            used_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Expired,
        BookingStatus::Completed,
    ];

    fn booking_in(status: BookingStatus) -> Booking {
        let mut booking = Booking::pending(Uuid::new_v4(), Utc::now(), Duration::minutes(2));
        booking.status = status;
        booking
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{:?} -> {:?}", from, to);
                let later = Utc::now() + Duration::hours(1);
                assert!(matches!(
                    booking_in(*from).plan(to, later),
                    Err(CoreError::InvalidStateTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn test_confirm_marks_paid_and_clears_expiry() {
        let booking = booking_in(BookingStatus::Pending);
        let transition = booking.plan(BookingStatus::Confirmed, Utc::now()).unwrap();

        assert_eq!(transition.payment_status, PaymentStatus::Paid);
        assert!(transition.expires_at.is_none());
    }

    #[test]
    fn test_expire_requires_deadline_to_pass() {
        let now = Utc::now();
        let booking = Booking::pending(Uuid::new_v4(), now, Duration::minutes(2));

        assert!(booking.plan(BookingStatus::Expired, now + Duration::minutes(1)).is_err());

        let transition = booking.plan(BookingStatus::Expired, now + Duration::minutes(3)).unwrap();
        assert_eq!(transition.payment_status, PaymentStatus::Failed);
    }

    #[test]
    fn test_confirm_only_from_pending() {
        let booking = booking_in(BookingStatus::Confirmed);
        assert!(matches!(
            booking.plan(BookingStatus::Confirmed, Utc::now()),
            Err(CoreError::InvalidStateTransition { .. })
        ));
        assert!(booking.plan(BookingStatus::Completed, Utc::now()).is_ok());
        assert!(booking.plan(BookingStatus::Cancelled, Utc::now()).is_ok());
    }

    #[test]
    fn test_ticket_number_carries_seat() {
        let booking = booking_in(BookingStatus::Pending);
        let passenger = Passenger {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            seat_id: Uuid::new_v4(),
            seat_number: "1A".to_string(),
            name: "Ada".to_string(),
            phone: None,
            price: 1500,
        };

        let ticket = Ticket::issue(&booking, &passenger);
        assert!(ticket.ticket_number.starts_with("BL-"));
        assert!(ticket.ticket_number.ends_with("-1A"));
        assert!(!ticket.is_used);
    }
}
