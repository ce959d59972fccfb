//! Status-change broadcasting for live subscribers.

use chrono::{DateTime, Utc};
use common::ReservationId;
use domain::{PaymentStatus, Reservation, ReservationStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A reservation moved to a new status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChanged {
    pub reservation_id: ReservationId,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub at: DateTime<Utc>,
}

/// Fan-out of [`StatusChanged`] events over a broadcast channel.
///
/// Publishing with no subscribers is a no-op; slow subscribers that lag
/// behind the channel capacity miss events, which is acceptable for a
/// live-update feed backed by re-fetchable state.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: broadcast::Sender<StatusChanged>,
}

impl StatusPublisher {
    /// Creates a publisher retaining up to `capacity` in-flight events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Opens a new subscription starting from now.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChanged> {
        self.tx.subscribe()
    }

    /// Announces the reservation's current status.
    pub fn publish(&self, reservation: &Reservation) {
        let _ = self.tx.send(StatusChanged {
            reservation_id: reservation.id,
            status: reservation.status,
            payment_status: reservation.payment_status,
            at: Utc::now(),
        });
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}
