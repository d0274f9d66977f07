use async_trait::async_trait;
use busline_core::repository::CatalogRepository;
use busline_core::{Bus, CoreResult, Seat, Trip};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::DbResultExt;
use crate::rows::{BusRow, SeatRow, TripRow, BUS_COLUMNS, TRIP_COLUMNS};

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .db()?;

        row.map(TripRow::into_trip).transpose()
    }

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        let row = sqlx::query_as::<_, BusRow>(&format!("SELECT {} FROM buses WHERE id = $1", BUS_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .db()?;

        row.map(BusRow::into_bus).transpose()
    }

    async fn get_seats(&self, ids: &[Uuid]) -> CoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            r#"
            SELECT id, seat_map_id, seat_number, seat_row, seat_column, bookable
            FROM seats
            WHERE id = ANY($1)
            ORDER BY seat_row, seat_column
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .db()?;

        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trips (id, route_id, bus_id, start_time, end_time, price, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(trip.id)
        .bind(trip.route_id)
        .bind(trip.bus_id)
        .bind(trip.start_time)
        .bind(trip.end_time)
        .bind(trip.price)
        .bind(trip.status.as_str())
        .execute(&self.pool)
        .await
        .db()?;
        Ok(())
    }

    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()> {
        sqlx::query("INSERT INTO buses (id, status, seat_map_id) VALUES ($1, $2, $3)")
            .bind(bus.id)
            .bind(bus.status.as_str())
            .bind(bus.seat_map_id)
            .execute(&self.pool)
            .await
            .db()?;
        Ok(())
    }

    async fn insert_seats(&self, seats: &[Seat]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.db()?;

        for seat in seats {
            sqlx::query(
                r#"
                INSERT INTO seats (id, seat_map_id, seat_number, seat_row, seat_column, bookable)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(seat.id)
            .bind(seat.seat_map_id)
            .bind(&seat.seat_number)
            .bind(seat.row)
            .bind(seat.column)
            .bind(seat.bookable)
            .execute(&mut *tx)
            .await
            .db()?;
        }

        tx.commit().await.db()
    }
}
