use busline_core::repository::FleetRepository;
use busline_core::{Bus, CoreError, CoreResult, TimeWindow, Trip};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Links buses to trips without letting one bus run two trips at once.
///
/// Windows are half-open: a trip ending at 12:00 and one starting at 12:00
/// can share a bus.
pub struct TripBusConflictScheduler {
    fleet: Arc<dyn FleetRepository>,
}

impl TripBusConflictScheduler {
    pub fn new(fleet: Arc<dyn FleetRepository>) -> Self {
        Self { fleet }
    }

    pub async fn assign_bus(&self, trip_id: Uuid, bus_id: Uuid) -> CoreResult<Trip> {
        let mut tx = self.fleet.begin_schedule().await?;

        let mut trip = tx
            .trip_for_update(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
        trip.ensure_open()?;

        let bus = tx
            .bus_for_update(bus_id)
            .await?
            .ok_or_else(|| CoreError::not_found("bus", bus_id))?;
        bus.ensure_active()?;

        let window = trip.window();
        let clashes = tx.overlapping_trips(bus_id, &window, trip_id).await?;
        if let Some(clash) = clashes.first() {
            warn!(
                trip_id = %trip_id,
                bus_id = %bus_id,
                conflicting_trip = %clash.id,
                "Bus already scheduled in this window"
            );
            return Err(CoreError::Conflict(format!(
                "bus {} is already assigned to trip {} from {} to {}",
                bus_id, clash.id, clash.start_time, clash.end_time
            )));
        }

        tx.set_trip_bus(trip_id, bus_id).await?;
        tx.commit().await?;

        info!(trip_id = %trip_id, bus_id = %bus_id, "Bus assigned to trip");
        trip.bus_id = Some(bus_id);
        Ok(trip)
    }

    /// Active buses free for the whole of `[start, end)`.
    pub async fn get_available(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Vec<Bus>> {
        let window = TimeWindow::new(start, end)?;
        self.fleet.available_buses(&window).await
    }
}
