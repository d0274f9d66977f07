use busline_core::{SeatFeedEvent, SeatFeedKind};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Fan-out of seat-map changes to live subscribers (SSE clients).
#[derive(Clone)]
pub struct SeatFeed {
    tx: broadcast::Sender<SeatFeedEvent>,
}

impl SeatFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatFeedEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, trip_id: Uuid, seat_ids: Vec<Uuid>, kind: SeatFeedKind, at: DateTime<Utc>) {
        if seat_ids.is_empty() {
            return;
        }
        // No subscribers is fine.
        let _ = self.tx.send(SeatFeedEvent {
            trip_id,
            seat_ids,
            kind,
            at,
        });
    }
}

impl Default for SeatFeed {
    fn default() -> Self {
        Self::new(100)
    }
}
