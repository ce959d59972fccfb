//! Startup sweep for payments interrupted mid-flight.
//!
//! A crash between authorize and capture leaves a reservation with
//! `payment_status = pre_authorized`. The sweep finds those rows and
//! classifies them; it never promotes anything to `paid` on its own,
//! because only a fresh capture attempt can prove the money moved.

use domain::{PaymentStatus, Reservation, ReservationStatus};
use store::Store;
use tracing::{info, warn};

use crate::error::Result;

/// What an operator (or a retry worker) should do with a stalled
/// payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDisposition {
    /// Still `approved`: the capture can simply be retried through the
    /// normal payment path.
    CaptureRetry,
    /// In any other status the row is contradictory and needs a human
    /// look before money moves again.
    ManualReview,
}

/// A reservation found stuck at `pre_authorized`.
#[derive(Debug, Clone)]
pub struct StalledPayment {
    pub reservation: Reservation,
    pub disposition: RecoveryDisposition,
}

/// Scans for reservations whose payment stopped at `pre_authorized`
/// and classifies each one.
pub async fn sweep_pre_authorized<S: Store>(store: &S) -> Result<Vec<StalledPayment>> {
    let stalled = store
        .reservations_with_payment_status(PaymentStatus::PreAuthorized)
        .await?;

    let mut report = Vec::with_capacity(stalled.len());
    for reservation in stalled {
        let disposition = if reservation.status == ReservationStatus::Approved {
            RecoveryDisposition::CaptureRetry
        } else {
            warn!(
                reservation = %reservation.id,
                status = %reservation.status,
                "pre-authorized payment on a non-approved reservation"
            );
            RecoveryDisposition::ManualReview
        };
        report.push(StalledPayment {
            reservation,
            disposition,
        });
    }

    if !report.is_empty() {
        info!(count = report.len(), "found stalled pre-authorized payments");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{PropertyId, ShiftId, UserId};
    use domain::{DateRange, Money, NewReservation};
    use store::{InMemoryStore, StatusChange};

    async fn seed(store: &InMemoryStore) -> Reservation {
        let dates = DateRange::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 17, 0, 0).unwrap(),
        )
        .unwrap();
        let reservation = Reservation::pending(
            NewReservation {
                user_id: UserId::new(),
                property_id: PropertyId::new(),
                shift_id: ShiftId::new("day"),
                dates,
            },
            Money::from_cents(10_000),
        );
        store.insert_reservation(&reservation).await.unwrap();
        reservation
    }

    #[tokio::test]
    async fn test_sweep_finds_nothing_on_clean_store() {
        let store = InMemoryStore::new();
        seed(&store).await;

        let report = sweep_pre_authorized(&store).await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_approved_pre_authorized_is_a_capture_retry() {
        let store = InMemoryStore::new();
        let reservation = seed(&store).await;

        store
            .transition(
                reservation.id,
                &[ReservationStatus::Pending],
                StatusChange::to(ReservationStatus::Approved)
                    .payment_status(PaymentStatus::PreAuthorized),
            )
            .await
            .unwrap()
            .unwrap();

        let report = sweep_pre_authorized(&store).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].disposition, RecoveryDisposition::CaptureRetry);
        assert_eq!(report[0].reservation.id, reservation.id);
    }

    #[tokio::test]
    async fn test_contradictory_row_needs_manual_review() {
        let store = InMemoryStore::new();
        let reservation = seed(&store).await;

        // Cancelled while the payment record says pre-authorized.
        store
            .transition(
                reservation.id,
                &[ReservationStatus::Pending],
                StatusChange::to(ReservationStatus::Cancelled)
                    .payment_status(PaymentStatus::PreAuthorized),
            )
            .await
            .unwrap()
            .unwrap();

        let report = sweep_pre_authorized(&store).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].disposition, RecoveryDisposition::ManualReview);
    }
}
