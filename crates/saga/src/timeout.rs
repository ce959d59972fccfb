//! Decision-window timeout scheduling.
//!
//! Delivery is at-least-once and there is no cancellation: a timeout
//! scheduled for a reservation fires even if the owner already decided.
//! That is fine, because the expiry path runs through the same status
//! guard as every other transition and loses cleanly to an earlier
//! resolution.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::ReservationId;
use tokio::sync::mpsc;

/// Schedules a one-shot timeout for a reservation's decision window.
#[async_trait]
pub trait TimeoutScheduler: Send + Sync {
    /// Arranges for the reservation's expiry to be triggered after
    /// `delay`.
    async fn schedule(&self, id: ReservationId, delay: Duration);
}

/// Tokio-backed scheduler: each timeout is a sleeping task that sends
/// the reservation id on a channel when it fires.
///
/// The receiver half is handed to whoever drives the saga (the API
/// entry point), which calls the expiry operation for each id drained.
#[derive(Debug, Clone)]
pub struct TokioTimeoutScheduler {
    tx: mpsc::UnboundedSender<ReservationId>,
}

impl TokioTimeoutScheduler {
    /// Creates a scheduler and the receiver of fired timeouts.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReservationId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TimeoutScheduler for TokioTimeoutScheduler {
    async fn schedule(&self, id: ReservationId, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the process is shutting down.
            let _ = tx.send(id);
        });
    }
}

/// Test scheduler that records what was asked of it instead of
/// sleeping. Tests trigger expiry themselves.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeoutScheduler {
    scheduled: Arc<Mutex<Vec<(ReservationId, Duration)>>>,
}

impl ManualTimeoutScheduler {
    /// Creates an empty manual scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every (id, delay) pair scheduled so far.
    pub fn scheduled(&self) -> Vec<(ReservationId, Duration)> {
        self.scheduled.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeoutScheduler for ManualTimeoutScheduler {
    async fn schedule(&self, id: ReservationId, delay: Duration) {
        self.scheduled.lock().unwrap().push((id, delay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_scheduler_delivers_after_delay() {
        let (scheduler, mut rx) = TokioTimeoutScheduler::new();
        let id = ReservationId::new();

        scheduler.schedule(id, Duration::from_millis(10)).await;

        let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout should fire")
            .expect("channel open");
        assert_eq!(fired, id);
    }

    #[tokio::test]
    async fn test_manual_scheduler_records_requests() {
        let scheduler = ManualTimeoutScheduler::new();
        let id = ReservationId::new();

        scheduler.schedule(id, Duration::from_secs(900)).await;

        let scheduled = scheduler.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0], (id, Duration::from_secs(900)));
    }
}
