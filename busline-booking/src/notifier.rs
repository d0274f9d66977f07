use busline_core::{BookingEvent, EventPublisher};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where the lifecycle hands booking events. Must never block the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BookingEvent);
}

/// Drops everything. Useful where no consumer is configured.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: BookingEvent) {}
}

/// Bounded queue drained by a fixed pool of workers.
///
/// `enqueue` never waits: a full queue drops the event with a warning.
/// Call [`NotificationQueue::shutdown`] to stop accepting events and let the
/// workers finish what is already queued.
pub struct NotificationQueue {
    tx: Mutex<Option<mpsc::Sender<BookingEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationQueue {
    pub fn start(publisher: Arc<dyn EventPublisher>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let publisher = publisher.clone();
                tokio::spawn(async move {
                    loop {
                        // Lock only long enough to take one event.
                        let next = rx.lock().await.recv().await;
                        let Some(event) = next else { break };
                        if let Err(e) = publisher.publish(&event).await {
                            error!(
                                worker,
                                booking_id = %event.booking_id,
                                error = %e,
                                "Failed to publish booking event"
                            );
                        } else {
                            debug!(worker, booking_id = %event.booking_id, to = event.to.as_str(), "Booking event published");
                        }
                    }
                    debug!(worker, "Notification worker stopped");
                })
            })
            .collect();

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    pub fn enqueue(&self, event: BookingEvent) {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = guard.as_ref() else {
            warn!(booking_id = %event.booking_id, "Notification queue closed, event dropped");
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(booking_id = %event.booking_id, "Notification queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(booking_id = %event.booking_id, "Notification queue closed, event dropped");
            }
        }
    }

    /// Close the queue, drain it and wait for every worker.
    pub async fn shutdown(&self) {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let handles = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Notification worker ended abnormally");
            }
        }
        info!("Notification queue drained");
    }
}

impl EventSink for NotificationQueue {
    fn emit(&self, event: BookingEvent) {
        self.enqueue(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use busline_core::{Booking, BookingStatus};
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingPublisher {
        published: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for CountingPublisher {
        async fn publish(&self, _event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("broker unavailable".into())
        }
    }

    fn event() -> BookingEvent {
        BookingEvent::created(&Booking::pending(Uuid::new_v4(), Utc::now(), Duration::minutes(30)))
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_events() {
        let publisher = Arc::new(CountingPublisher::default());
        let queue = NotificationQueue::start(publisher.clone(), 3, 64);

        for _ in 0..20 {
            queue.enqueue(event());
        }
        queue.shutdown().await;

        assert_eq!(publisher.published.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let publisher = Arc::new(CountingPublisher::default());
        let queue = NotificationQueue::start(publisher.clone(), 1, 8);
        queue.shutdown().await;

        queue.enqueue(event());
        assert_eq!(publisher.published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_failures_do_not_stop_workers() {
        let queue = NotificationQueue::start(Arc::new(FailingPublisher), 2, 8);
        let mut ev = event();
        ev.to = BookingStatus::Confirmed;
        queue.enqueue(ev);
        queue.enqueue(event());
        queue.shutdown().await;
    }
}
