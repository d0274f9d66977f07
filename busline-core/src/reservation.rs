use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest a single seat hold may be taken for.
pub const MAX_HOLD_TTL_SECONDS: i64 = 24 * 60 * 60;

/// A time-boxed hold on one seat of one trip, owned by a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatReservation {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub seat_id: Uuid,
    pub session_id: String,
    pub booking_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SeatReservation {
    pub fn new(trip_id: Uuid, seat_id: Uuid, session_id: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            seat_id,
            session_id: session_id.to_string(),
            booking_id: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_is_inactive_at_expiry_instant() {
        let now = Utc::now();
        let hold = SeatReservation::new(Uuid::new_v4(), Uuid::new_v4(), "sess-1", now, Duration::minutes(10));

        assert!(hold.is_active(now));
        assert!(hold.is_active(now + Duration::minutes(9)));
        assert!(!hold.is_active(now + Duration::minutes(10)));
    }
}
