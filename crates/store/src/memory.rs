use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{PropertyId, ReservationId, ReservationToken};
use domain::{
    DateRange, Lock, PaymentRecord, PaymentRecordStatus, PaymentStatus, Reservation,
    ReservationStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{StatusChange, Store};

#[derive(Default)]
struct State {
    reservations: HashMap<ReservationId, Reservation>,
    locks: Vec<Lock>,
    payments: Vec<PaymentRecord>,
}

/// In-memory store implementation for tests and default wiring.
///
/// Provides the same guarded-write semantics as the PostgreSQL
/// implementation: the guard check and the write happen under one
/// write lock, so concurrent `transition` calls serialize and exactly
/// one wins.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of lock rows, active or not.
    pub async fn lock_count(&self) -> usize {
        self.state.read().await.locks.len()
    }

    /// Returns the number of currently active lock rows.
    pub async fn active_lock_count(&self) -> usize {
        self.state
            .read()
            .await
            .locks
            .iter()
            .filter(|l| l.is_active)
            .count()
    }
}

fn apply_change(reservation: &mut Reservation, change: &StatusChange) {
    let now = Utc::now();
    reservation.status = change.status;
    if let Some(payment_status) = change.payment_status {
        reservation.payment_status = payment_status;
    }
    if let Some(ref reference) = change.payment_reference {
        reservation.payment_reference = Some(reference.clone());
    }
    if let Some(response) = change.owner_response {
        reservation.owner_response = Some(response);
        reservation.owner_response_at = Some(now);
    }
    if change.increment_payment_attempts {
        reservation.payment_attempts += 1;
    }
    reservation.updated_at = now;
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: ReservationId,
        expected: &[ReservationStatus],
        change: StatusChange,
    ) -> Result<Option<Reservation>> {
        let mut state = self.state.write().await;
        match state.reservations.get_mut(&id) {
            Some(reservation) if expected.contains(&reservation.status) => {
                apply_change(reservation, &change);
                Ok(Some(reservation.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reservations_with_payment_status(
        &self,
        payment_status: PaymentStatus,
    ) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| r.payment_status == payment_status)
            .cloned()
            .collect())
    }

    async fn insert_lock(&self, lock: &Lock) -> Result<()> {
        let mut state = self.state.write().await;
        state.locks.push(lock.clone());
        Ok(())
    }

    async fn deactivate_lock(&self, token: ReservationToken) -> Result<bool> {
        let mut state = self.state.write().await;
        match state
            .locks
            .iter_mut()
            .find(|l| l.reservation_token == token && l.is_active)
        {
            Some(lock) => {
                lock.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lock_by_token(&self, token: ReservationToken) -> Result<Option<Lock>> {
        let state = self.state.read().await;
        Ok(state
            .locks
            .iter()
            .find(|l| l.reservation_token == token)
            .cloned())
    }

    async fn active_locks_overlapping(
        &self,
        property: PropertyId,
        dates: &DateRange,
    ) -> Result<Vec<Lock>> {
        let state = self.state.read().await;
        Ok(state
            .locks
            .iter()
            .filter(|l| l.blocks(property, dates))
            .cloned()
            .collect())
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.payments.push(payment.clone());
        Ok(())
    }

    async fn update_payment(
        &self,
        id: Uuid,
        status: PaymentRecordStatus,
        gateway_response: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(payment) = state.payments.iter_mut().find(|p| p.id == id) {
            payment.status = status;
            payment.gateway_response = gateway_response;
            payment.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn payments_for(&self, reservation_id: ReservationId) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .iter()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.attempt_number);
        Ok(payments)
    }

    async fn next_attempt_number(&self, reservation_id: ReservationId) -> Result<u32> {
        let state = self.state.read().await;
        let max = state
            .payments
            .iter()
            .filter(|p| p.reservation_id == reservation_id)
            .map(|p| p.attempt_number)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::{ShiftId, UserId};
    use domain::{Money, NewReservation, OwnerResponse};

    fn range(start_hour: u32, end_hour: u32) -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2025, 6, 1, start_hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, end_hour, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn sample_reservation() -> Reservation {
        Reservation::pending(
            NewReservation {
                user_id: UserId::new(),
                property_id: PropertyId::new(),
                shift_id: ShiftId::new("day"),
                dates: range(9, 17),
            },
            Money::from_cents(10_000),
        )
    }

    #[tokio::test]
    async fn insert_and_load_reservation() {
        let store = InMemoryStore::new();
        let reservation = sample_reservation();
        store.insert_reservation(&reservation).await.unwrap();

        let loaded = store.reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, reservation.id);
        assert_eq!(loaded.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn transition_applies_when_guard_matches() {
        let store = InMemoryStore::new();
        let reservation = sample_reservation();
        store.insert_reservation(&reservation).await.unwrap();

        let updated = store
            .transition(
                reservation.id,
                &[ReservationStatus::Pending],
                StatusChange::to(ReservationStatus::Approved)
                    .owner_response(OwnerResponse::Approved),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, ReservationStatus::Approved);
        assert_eq!(updated.owner_response, Some(OwnerResponse::Approved));
        assert!(updated.owner_response_at.is_some());
    }

    #[tokio::test]
    async fn transition_noop_when_guard_fails() {
        let store = InMemoryStore::new();
        let reservation = sample_reservation();
        store.insert_reservation(&reservation).await.unwrap();

        store
            .transition(
                reservation.id,
                &[ReservationStatus::Pending],
                StatusChange::to(ReservationStatus::Rejected),
            )
            .await
            .unwrap()
            .unwrap();

        // Second resolver loses: zero rows affected.
        let result = store
            .transition(
                reservation.id,
                &[ReservationStatus::Pending],
                StatusChange::to(ReservationStatus::Expired),
            )
            .await
            .unwrap();
        assert!(result.is_none());

        let loaded = store.reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ReservationStatus::Rejected);
    }

    #[tokio::test]
    async fn transition_with_expected_status_set() {
        let store = InMemoryStore::new();
        let mut reservation = sample_reservation();
        reservation.status = ReservationStatus::Approved;
        store.insert_reservation(&reservation).await.unwrap();

        // Cancellation guard accepts either pending or approved.
        let updated = store
            .transition(
                reservation.id,
                &[ReservationStatus::Pending, ReservationStatus::Approved],
                StatusChange::to(ReservationStatus::Cancelled),
            )
            .await
            .unwrap();
        assert!(updated.is_some());
    }

    #[tokio::test]
    async fn concurrent_transitions_exactly_one_wins() {
        let store = InMemoryStore::new();
        let reservation = sample_reservation();
        store.insert_reservation(&reservation).await.unwrap();

        let approve = store.transition(
            reservation.id,
            &[ReservationStatus::Pending],
            StatusChange::to(ReservationStatus::Approved),
        );
        let expire = store.transition(
            reservation.id,
            &[ReservationStatus::Pending],
            StatusChange::to(ReservationStatus::Expired),
        );

        let (approve_result, expire_result) = tokio::join!(approve, expire);
        let winners = [approve_result.unwrap(), expire_result.unwrap()]
            .iter()
            .filter(|r| r.is_some())
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn transition_increments_attempts_monotonically() {
        let store = InMemoryStore::new();
        let mut reservation = sample_reservation();
        reservation.status = ReservationStatus::Approved;
        store.insert_reservation(&reservation).await.unwrap();

        let updated = store
            .transition(
                reservation.id,
                &[ReservationStatus::Approved],
                StatusChange::to(ReservationStatus::Failed)
                    .payment_status(PaymentStatus::Failed)
                    .increment_attempts(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.payment_attempts, 1);
    }

    #[tokio::test]
    async fn deactivate_lock_is_idempotent() {
        let store = InMemoryStore::new();
        let token = ReservationToken::new();
        let lock = Lock::for_reservation(
            PropertyId::new(),
            UserId::new(),
            token,
            range(9, 17),
            Duration::minutes(15),
        );
        store.insert_lock(&lock).await.unwrap();

        assert!(store.deactivate_lock(token).await.unwrap());
        assert!(!store.deactivate_lock(token).await.unwrap());
        assert_eq!(store.active_lock_count().await, 0);
        assert_eq!(store.lock_count().await, 1);
    }

    #[tokio::test]
    async fn active_locks_overlapping_filters_correctly() {
        let store = InMemoryStore::new();
        let property = PropertyId::new();
        let lock = Lock::for_reservation(
            property,
            UserId::new(),
            ReservationToken::new(),
            range(9, 17),
            Duration::minutes(15),
        );
        store.insert_lock(&lock).await.unwrap();

        let hits = store
            .active_locks_overlapping(property, &range(12, 20))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .active_locks_overlapping(property, &range(17, 20))
            .await
            .unwrap();
        assert!(misses.is_empty());

        let other_property = store
            .active_locks_overlapping(PropertyId::new(), &range(9, 17))
            .await
            .unwrap();
        assert!(other_property.is_empty());
    }

    #[tokio::test]
    async fn attempt_numbers_increase_per_reservation() {
        let store = InMemoryStore::new();
        let reservation_id = ReservationId::new();

        assert_eq!(store.next_attempt_number(reservation_id).await.unwrap(), 1);

        let payment = PaymentRecord::failed(
            reservation_id,
            Money::from_cents(100),
            1,
            serde_json::Value::Null,
        );
        store.insert_payment(&payment).await.unwrap();

        assert_eq!(store.next_attempt_number(reservation_id).await.unwrap(), 2);
        // A different reservation starts back at 1.
        assert_eq!(
            store.next_attempt_number(ReservationId::new()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn update_payment_moves_status_and_payload() {
        let store = InMemoryStore::new();
        let reservation_id = ReservationId::new();
        let payment = PaymentRecord::pre_authorized(
            reservation_id,
            Money::from_cents(100),
            1,
            serde_json::json!({"authorization_code": "auth_1"}),
        );
        store.insert_payment(&payment).await.unwrap();

        store
            .update_payment(
                payment.id,
                PaymentRecordStatus::Captured,
                serde_json::json!({"transaction_id": "txn_1"}),
            )
            .await
            .unwrap();

        let payments = store.payments_for(reservation_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentRecordStatus::Captured);
        assert_eq!(payments[0].gateway_response["transaction_id"], "txn_1");
    }
}
