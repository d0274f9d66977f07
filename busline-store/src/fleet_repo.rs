use async_trait::async_trait;
use busline_core::repository::{FleetRepository, ScheduleTransaction};
use busline_core::{Bus, CoreResult, TimeWindow, Trip};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::DbResultExt;
use crate::rows::{self, BusRow, TripRow, BUS_COLUMNS, TRIP_COLUMNS};

pub struct PgFleetRepository {
    pool: PgPool,
}

impl PgFleetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FleetRepository for PgFleetRepository {
    async fn begin_schedule(&self) -> CoreResult<Box<dyn ScheduleTransaction>> {
        let tx = self.pool.begin().await.db()?;
        Ok(Box::new(PgScheduleTransaction { tx }))
    }

    async fn available_buses(&self, window: &TimeWindow) -> CoreResult<Vec<Bus>> {
        let rows = sqlx::query_as::<_, BusRow>(&format!(
            r#"
            SELECT {} FROM buses
            WHERE status = 'ACTIVE'
              AND id NOT IN (
                SELECT bus_id FROM trips
                WHERE bus_id IS NOT NULL
                  AND status IN ('SCHEDULED', 'ACTIVE')
                  AND NOT (end_time <= $1 OR start_time >= $2)
              )
            ORDER BY id
            "#,
            BUS_COLUMNS
        ))
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .db()?;

        rows::buses(rows)
    }
}

pub struct PgScheduleTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ScheduleTransaction for PgScheduleTransaction {
    async fn trip_for_update(&mut self, trip_id: Uuid) -> CoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = $1 FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(trip_id)
        .fetch_optional(&mut *self.tx)
        .await
        .db()?;

        row.map(TripRow::into_trip).transpose()
    }

    async fn bus_for_update(&mut self, bus_id: Uuid) -> CoreResult<Option<Bus>> {
        // Locking the bus row queues concurrent assignments to the same bus.
        let row = sqlx::query_as::<_, BusRow>(&format!(
            "SELECT {} FROM buses WHERE id = $1 FOR UPDATE",
            BUS_COLUMNS
        ))
        .bind(bus_id)
        .fetch_optional(&mut *self.tx)
        .await
        .db()?;

        row.map(BusRow::into_bus).transpose()
    }

    async fn overlapping_trips(
        &mut self,
        bus_id: Uuid,
        window: &TimeWindow,
        exclude: Uuid,
    ) -> CoreResult<Vec<Trip>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            r#"
            SELECT {} FROM trips
            WHERE bus_id = $1
              AND id <> $2
              AND status IN ('SCHEDULED', 'ACTIVE')
              AND NOT (end_time <= $3 OR start_time >= $4)
            ORDER BY start_time
            "#,
            TRIP_COLUMNS
        ))
        .bind(bus_id)
        .bind(exclude)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&mut *self.tx)
        .await
        .db()?;

        rows::trips(rows)
    }

    async fn set_trip_bus(&mut self, trip_id: Uuid, bus_id: Uuid) -> CoreResult<()> {
        sqlx::query("UPDATE trips SET bus_id = $1 WHERE id = $2")
            .bind(bus_id)
            .bind(trip_id)
            .execute(&mut *self.tx)
            .await
            .db()?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.db()
    }
}
