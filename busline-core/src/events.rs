use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::{BookingStatus, PaymentStatus, Transition};

pub const BOOKING_STATUS_TOPIC: &str = "booking.status_changed";

/// Emitted once per committed booking status change. Delivery is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub from: Option<BookingStatus>,
    pub to: BookingStatus,
    pub payment_status: PaymentStatus,
    /// Set when a paid booking was cancelled and money has to go back.
    pub refund_required: bool,
    pub occurred_at: DateTime<Utc>,
}

impl BookingEvent {
    pub fn created(booking: &crate::Booking) -> Self {
        Self {
            booking_id: booking.id,
            trip_id: booking.trip_id,
            from: None,
            to: booking.status,
            payment_status: booking.payment_status,
            refund_required: false,
            occurred_at: booking.created_at,
        }
    }

    pub fn from_transition(transition: &Transition) -> Self {
        Self {
            booking_id: transition.booking_id,
            trip_id: transition.trip_id,
            from: Some(transition.from),
            to: transition.to,
            payment_status: transition.payment_status,
            refund_required: transition.from == BookingStatus::Confirmed
                && transition.to == BookingStatus::Cancelled,
            occurred_at: transition.at,
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outbound sink for booking events (message bus, log, test recorder).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatFeedKind {
    Held,
    Released,
    Booked,
}

/// Live seat-map update for clients watching a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatFeedEvent {
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub kind: SeatFeedKind,
    pub at: DateTime<Utc>,
}
