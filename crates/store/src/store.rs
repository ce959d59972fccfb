//! The `Store` trait: guarded single-row writes over reservations,
//! locks, and payments.

use async_trait::async_trait;
use common::{PropertyId, ReservationId, ReservationToken};
use domain::{
    DateRange, Lock, OwnerResponse, PaymentRecord, PaymentRecordStatus, PaymentStatus,
    Reservation, ReservationStatus,
};
use uuid::Uuid;

use crate::error::Result;

/// The write applied by a successful [`Store::transition`].
///
/// Only the fields set here are touched; everything else on the row is
/// left alone. `updated_at` is always refreshed, and `owner_response_at`
/// is stamped whenever `owner_response` is set.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: ReservationStatus,
    pub payment_status: Option<PaymentStatus>,
    pub payment_reference: Option<String>,
    pub owner_response: Option<OwnerResponse>,
    pub increment_payment_attempts: bool,
}

impl StatusChange {
    /// A change that only moves the status.
    pub fn to(status: ReservationStatus) -> Self {
        Self {
            status,
            payment_status: None,
            payment_reference: None,
            owner_response: None,
            increment_payment_attempts: false,
        }
    }

    /// Also sets the reservation-level payment status.
    pub fn payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    /// Also stores a gateway reference.
    pub fn payment_reference(mut self, reference: impl Into<String>) -> Self {
        self.payment_reference = Some(reference.into());
        self
    }

    /// Also records how the owner (or the timeout) resolved the
    /// reservation.
    pub fn owner_response(mut self, response: OwnerResponse) -> Self {
        self.owner_response = Some(response);
        self
    }

    /// Also bumps the monotonic failed-attempt counter.
    pub fn increment_attempts(mut self) -> Self {
        self.increment_payment_attempts = true;
        self
    }
}

/// Persistence operations used by the saga.
///
/// Implementations must make [`Store::transition`] atomic: the status
/// check and the write are one operation, and of two racing callers
/// exactly one gets `Some(row)` back.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Reservations --

    /// Inserts a freshly created reservation row.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()>;

    /// Loads a reservation by id.
    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Conditionally applies `change` if the current status is one of
    /// `expected` ("update status from X to Y where status = X").
    ///
    /// Returns the updated row, or `None` if the guard matched zero
    /// rows — the caller lost the race and must perform no side
    /// effects.
    async fn transition(
        &self,
        id: ReservationId,
        expected: &[ReservationStatus],
        change: StatusChange,
    ) -> Result<Option<Reservation>>;

    /// Lists reservations currently at the given payment status, for
    /// the recovery sweep.
    async fn reservations_with_payment_status(
        &self,
        payment_status: PaymentStatus,
    ) -> Result<Vec<Reservation>>;

    // -- Locks --

    /// Inserts an active lock row.
    async fn insert_lock(&self, lock: &Lock) -> Result<()>;

    /// Deactivates the lock row for `token` if still active.
    ///
    /// Returns true if a row flipped from active to inactive, false if
    /// there was nothing to do — the idempotency signal for
    /// double-release.
    async fn deactivate_lock(&self, token: ReservationToken) -> Result<bool>;

    /// Loads a lock row by its reservation token.
    async fn lock_by_token(&self, token: ReservationToken) -> Result<Option<Lock>>;

    /// Lists active locks on `property` overlapping `dates`.
    async fn active_locks_overlapping(
        &self,
        property: PropertyId,
        dates: &DateRange,
    ) -> Result<Vec<Lock>>;

    // -- Payments --

    /// Inserts a payment attempt record.
    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()>;

    /// Updates a payment record's status and merges the gateway
    /// response payload.
    async fn update_payment(
        &self,
        id: Uuid,
        status: PaymentRecordStatus,
        gateway_response: serde_json::Value,
    ) -> Result<()>;

    /// Lists payment records for a reservation, oldest first.
    async fn payments_for(&self, reservation_id: ReservationId) -> Result<Vec<PaymentRecord>>;

    /// Returns the attempt number the next payment record should use.
    ///
    /// Strictly increasing per reservation, starting at 1.
    async fn next_attempt_number(&self, reservation_id: ReservationId) -> Result<u32>;
}
