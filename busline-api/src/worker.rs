use busline_booking::{JobScheduler, NotificationQueue};
use busline_core::EventPublisher;
use busline_store::app_config::BookingRules;
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

/// Everything that runs beside the HTTP server. Stopped as a unit after the
/// listener has drained.
pub struct BackgroundServices {
    jobs: JobScheduler,
    notifications: Arc<NotificationQueue>,
}

impl BackgroundServices {
    /// The queue is created before the app state because the lifecycle emits into it.
    pub fn notification_queue(publisher: Arc<dyn EventPublisher>, rules: &BookingRules) -> Arc<NotificationQueue> {
        Arc::new(NotificationQueue::start(
            publisher,
            rules.notification_workers,
            rules.notification_queue_capacity,
        ))
    }

    pub fn start(state: &AppState, notifications: Arc<NotificationQueue>) -> Self {
        let mut jobs = JobScheduler::new();
        jobs.spawn(state.reaper.clone());
        Self { jobs, notifications }
    }

    pub async fn shutdown(self) {
        info!("Stopping background services");
        self.jobs.shutdown().await;
        self.notifications.shutdown().await;
    }
}
