use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::TimeWindow;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "SCHEDULED",
            TripStatus::Active => "ACTIVE",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "SCHEDULED" => Ok(TripStatus::Scheduled),
            "ACTIVE" => Ok(TripStatus::Active),
            "COMPLETED" => Ok(TripStatus::Completed),
            "CANCELLED" => Ok(TripStatus::Cancelled),
            other => Err(CoreError::Validation(format!("unknown trip status {}", other))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// Trips in these states occupy their bus and accept seat holds.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub route_id: Uuid,
    pub bus_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Per-seat fare in minor currency units.
    pub price: i32,
    pub status: TripStatus,
}

impl Trip {
    pub fn new(
        route_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        price: i32,
    ) -> CoreResult<Self> {
        TimeWindow::new(start_time, end_time)?;
        Ok(Self {
            id: Uuid::new_v4(),
            route_id,
            bus_id: None,
            start_time,
            end_time,
            price,
            status: TripStatus::Scheduled,
        })
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::invalid_transition(self.status, "BUS_ASSIGNMENT"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusStatus {
    Active,
    Maintenance,
    Retired,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::Active => "ACTIVE",
            BusStatus::Maintenance => "MAINTENANCE",
            BusStatus::Retired => "RETIRED",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "ACTIVE" => Ok(BusStatus::Active),
            "MAINTENANCE" => Ok(BusStatus::Maintenance),
            "RETIRED" => Ok(BusStatus::Retired),
            other => Err(CoreError::Validation(format!("unknown bus status {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: Uuid,
    pub status: BusStatus,
    pub seat_map_id: Uuid,
}

impl Bus {
    pub fn ensure_active(&self) -> CoreResult<()> {
        if self.status != BusStatus::Active {
            return Err(CoreError::Validation(format!(
                "bus {} is {} and cannot be scheduled",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

/// A physical seat in a seat map. Shared by every trip run with a bus using that map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub seat_map_id: Uuid,
    pub seat_number: String,
    pub row: i32,
    pub column: i32,
    pub bookable: bool,
}
