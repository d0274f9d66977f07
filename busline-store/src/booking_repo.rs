use async_trait::async_trait;
use busline_core::repository::BookingRepository;
use busline_core::{Booking, BookingStatus, CoreError, CoreResult, Passenger, Ticket, Transition};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::database::DbResultExt;
use crate::rows::{self, BookingRow, PassengerRow, TicketRow, BOOKING_COLUMNS};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_pending(
        &self,
        booking: &Booking,
        passengers: &[Passenger],
        session_id: &str,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.db()?;

        // Same lock the hold path takes, so claims on this trip are serialized.
        sqlx::query("SELECT id FROM trips WHERE id = $1 FOR UPDATE")
            .bind(booking.trip_id)
            .fetch_optional(&mut *tx)
            .await
            .db()?
            .ok_or_else(|| CoreError::not_found("trip", booking.trip_id))?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, trip_id, user_id, contact_email, contact_phone, status, payment_status,
                                  total_seats, total_amount, created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(&booking.user_id)
        .bind(&booking.contact_email)
        .bind(&booking.contact_phone)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.total_seats)
        .bind(booking.total_amount)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.expires_at)
        .execute(&mut *tx)
        .await
        .db()?;

        for p in passengers {
            sqlx::query(
                r#"
                INSERT INTO passengers (id, booking_id, seat_id, seat_number, name, phone, price)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(p.id)
            .bind(p.booking_id)
            .bind(p.seat_id)
            .bind(&p.seat_number)
            .bind(&p.name)
            .bind(&p.phone)
            .bind(p.price)
            .execute(&mut *tx)
            .await
            .db()?;
        }

        let seat_ids: Vec<Uuid> = passengers.iter().map(|p| p.seat_id).collect();
        let attached = sqlx::query(
            r#"
            UPDATE seat_reservations SET booking_id = $1
            WHERE session_id = $2 AND trip_id = $3 AND seat_id = ANY($4)
              AND booking_id IS NULL AND expires_at > $5
            "#,
        )
        .bind(booking.id)
        .bind(session_id)
        .bind(booking.trip_id)
        .bind(&seat_ids)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .db()?
        .rows_affected();

        if attached != seat_ids.len() as u64 {
            // tx dropped here, nothing persisted
            return Err(CoreError::Conflict(format!(
                "session {} no longer holds all {} seats",
                session_id,
                seat_ids.len()
            )));
        }

        tx.commit().await.db()
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .db()?;

        row.map(BookingRow::into_booking).transpose()
    }

    async fn passengers(&self, booking_id: Uuid) -> CoreResult<Vec<Passenger>> {
        let rows = sqlx::query_as::<_, PassengerRow>(
            r#"
            SELECT id, booking_id, seat_id, seat_number, name, phone, price
            FROM passengers WHERE booking_id = $1 ORDER BY seat_number
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .db()?;

        Ok(rows.into_iter().map(Passenger::from).collect())
    }

    async fn tickets(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT id, booking_id, passenger_id, trip_id, ticket_number, is_used, used_at
            FROM tickets WHERE booking_id = $1 ORDER BY ticket_number
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .db()?;

        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn list_by_status(&self, status: BookingStatus) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE status = $1 ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .db()?;

        rows::bookings(rows)
    }

    async fn list_created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .db()?;

        rows::bookings(rows)
    }

    async fn count_claimed_seats(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM passengers p
            JOIN bookings b ON b.id = p.booking_id
            WHERE b.trip_id = $1
              AND b.status IN ('PENDING', 'CONFIRMED')
              AND p.seat_id = ANY($2)
            "#,
        )
        .bind(trip_id)
        .bind(seat_ids)
        .fetch_one(&self.pool)
        .await
        .db()
    }

    async fn apply_transition(&self, transition: &Transition) -> CoreResult<bool> {
        let mut tx = self.pool.begin().await.db()?;

        let updated = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, payment_status = $2, expires_at = $3, updated_at = $4
            WHERE id = $5 AND status = $6
            "#,
        )
        .bind(transition.to.as_str())
        .bind(transition.payment_status.as_str())
        .bind(transition.expires_at)
        .bind(transition.at)
        .bind(transition.booking_id)
        .bind(transition.from.as_str())
        .execute(&mut *tx)
        .await
        .db()?
        .rows_affected();

        if updated == 0 {
            debug!(booking_id = %transition.booking_id, "Booking moved before transition could apply");
            return Ok(false);
        }

        for ticket in &transition.tickets {
            sqlx::query(
                r#"
                INSERT INTO tickets (id, booking_id, passenger_id, trip_id, ticket_number, is_used, used_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(ticket.id)
            .bind(ticket.booking_id)
            .bind(ticket.passenger_id)
            .bind(ticket.trip_id)
            .bind(&ticket.ticket_number)
            .bind(ticket.is_used)
            .bind(ticket.used_at)
            .execute(&mut *tx)
            .await
            .db()?;
        }

        tx.commit().await.db()?;
        Ok(true)
    }
}
