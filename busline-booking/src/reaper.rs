use async_trait::async_trait;
use busline_core::repository::BookingRepository;
use busline_core::{BookingStatus, Clock, CoreError, CoreResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::jobs::ScheduledJob;
use crate::lifecycle::BookingLifecycle;
use crate::reservations::SeatReservationStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    /// Already moved on by someone else, or not yet due.
    pub skipped: usize,
    pub failed: usize,
    pub holds_released: u64,
}

/// Expires pending bookings whose payment window has lapsed and purges
/// expired holds. Safe to run concurrently with itself and with confirmations.
pub struct ExpiryReaper {
    bookings: Arc<dyn BookingRepository>,
    lifecycle: Arc<BookingLifecycle>,
    reservations: Arc<SeatReservationStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        lifecycle: Arc<BookingLifecycle>,
        reservations: Arc<SeatReservationStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            bookings,
            lifecycle,
            reservations,
            clock,
            interval,
        }
    }

    pub async fn sweep(&self) -> CoreResult<SweepReport> {
        let now = self.clock.now();
        let window = self.lifecycle.hold_window();
        let pending = self.bookings.list_by_status(BookingStatus::Pending).await?;

        let mut report = SweepReport::default();
        for booking in pending.into_iter().filter(|b| now - b.created_at > window) {
            report.scanned += 1;
            match self.lifecycle.expire(booking.id).await {
                Ok(_) => report.expired += 1,
                Err(CoreError::InvalidStateTransition { .. }) | Err(CoreError::Validation(_)) => {
                    debug!(booking_id = %booking.id, "Booking no longer expirable, skipped");
                    report.skipped += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(booking_id = %booking.id, error = %e, "Storage unavailable, booking left for next sweep");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(booking_id = %booking.id, error = %e, "Failed to expire booking");
                    report.failed += 1;
                }
            }
        }

        report.holds_released = self.reservations.delete_expired().await?;

        if report.expired > 0 || report.failed > 0 || report.holds_released > 0 {
            info!(
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                holds_released = report.holds_released,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl ScheduledJob for ExpiryReaper {
    fn name(&self) -> &'static str {
        "expiry-reaper"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), CoreError> {
        self.sweep().await.map(|_| ())
    }
}
