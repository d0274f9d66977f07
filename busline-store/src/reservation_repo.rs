use async_trait::async_trait;
use busline_core::repository::{HoldTransaction, ReservationRepository};
use busline_core::{CoreError, CoreResult, SeatReservation, Trip};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::DbResultExt;
use crate::rows::{ReservationRow, TripRow, RESERVATION_COLUMNS, TRIP_COLUMNS};

pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn begin_hold(&self, trip_id: Uuid) -> CoreResult<Box<dyn HoldTransaction>> {
        let mut tx = self.pool.begin().await.db()?;

        // Row lock on the trip serializes every hold and booking insert for it.
        let trip = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = $1 FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await
        .db()?
        .ok_or_else(|| CoreError::not_found("trip", trip_id))?
        .into_trip()?;

        Ok(Box::new(PgHoldTransaction { tx, trip }))
    }

    async fn count_active(&self, trip_id: Uuid, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM seat_reservations
            WHERE trip_id = $1 AND seat_id = ANY($2) AND expires_at > $3
            "#,
        )
        .bind(trip_id)
        .bind(seat_ids)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .db()
    }

    async fn get_by_session(&self, session_id: &str, now: DateTime<Utc>) -> CoreResult<Vec<SeatReservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM seat_reservations WHERE session_id = $1 AND expires_at > $2 ORDER BY created_at",
            RESERVATION_COLUMNS
        ))
        .bind(session_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .db()?;

        Ok(rows.into_iter().map(SeatReservation::from).collect())
    }

    async fn get_by_trip(&self, trip_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<SeatReservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM seat_reservations WHERE trip_id = $1 AND expires_at > $2 ORDER BY created_at",
            RESERVATION_COLUMNS
        ))
        .bind(trip_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .db()?;

        Ok(rows.into_iter().map(SeatReservation::from).collect())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM seat_reservations WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .db()?;
        Ok(result.rows_affected())
    }

    async fn delete_by_session(&self, session_id: &str) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM seat_reservations WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .db()?;
        Ok(result.rows_affected())
    }

    async fn delete_by_booking(&self, booking_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM seat_reservations WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .db()?;
        Ok(result.rows_affected())
    }
}

pub struct PgHoldTransaction {
    tx: Transaction<'static, Postgres>,
    trip: Trip,
}

#[async_trait]
impl HoldTransaction for PgHoldTransaction {
    fn trip(&self) -> &Trip {
        &self.trip
    }

    async fn claimed_seat_count(&mut self, seat_ids: &[Uuid]) -> CoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM passengers p
            JOIN bookings b ON b.id = p.booking_id
            WHERE b.trip_id = $1
              AND b.status IN ('PENDING', 'CONFIRMED')
              AND p.seat_id = ANY($2)
            "#,
        )
        .bind(self.trip.id)
        .bind(seat_ids)
        .fetch_one(&mut *self.tx)
        .await
        .db()
    }

    async fn active_hold_count(&mut self, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM seat_reservations
            WHERE trip_id = $1 AND seat_id = ANY($2) AND expires_at > $3
            "#,
        )
        .bind(self.trip.id)
        .bind(seat_ids)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .db()
    }

    async fn purge_expired(&mut self, seat_ids: &[Uuid], now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM seat_reservations WHERE trip_id = $1 AND seat_id = ANY($2) AND expires_at <= $3",
        )
        .bind(self.trip.id)
        .bind(seat_ids)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .db()?;
        Ok(result.rows_affected())
    }

    async fn insert(&mut self, holds: &[SeatReservation]) -> CoreResult<()> {
        for hold in holds {
            // seat_reservations_trip_seat_key turns a lost race into 23505 -> Conflict
            sqlx::query(
                r#"
                INSERT INTO seat_reservations (id, trip_id, seat_id, session_id, booking_id, created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(hold.id)
            .bind(hold.trip_id)
            .bind(hold.seat_id)
            .bind(&hold.session_id)
            .bind(hold.booking_id)
            .bind(hold.created_at)
            .bind(hold.expires_at)
            .execute(&mut *self.tx)
            .await
            .db()?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.db()
    }
}
