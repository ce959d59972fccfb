//! The reservation saga coordinator.
//!
//! Every trigger funnels into a guarded status transition through the
//! store. The transition IS the mutual exclusion: of two racing
//! triggers (owner decision vs. timeout, decision vs. cancellation)
//! exactly one gets the updated row back and runs side effects; the
//! other sees `Resolution::Superseded` and does nothing.

use std::sync::Arc;
use std::time::Duration;

use common::{ReservationId, UserId};
use domain::{
    NewReservation, OwnerResponse, PaymentStatus, Reservation, ReservationStatus,
    PaymentRecord, PaymentRecordStatus,
};
use store::{StatusChange, Store};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, PaymentFailureReason, Result, SagaError};
use crate::events::StatusPublisher;
use crate::gateways::{InventoryGateway, PaymentGateway};
use crate::ledger::LockLedger;
use crate::notify::{NotificationPayload, NotificationSink, Recipient, TemplateKind};
use crate::timeout::TimeoutScheduler;

/// The owner's answer to a pending reservation.
#[derive(Debug, Clone)]
pub enum OwnerDecision {
    /// Approve; the payment sub-saga runs immediately.
    Approve,
    /// Reject with an optional reason relayed to the guest.
    Reject { reason: Option<String> },
}

/// Outcome of a resolving trigger (decision, timeout, cancellation).
#[derive(Debug)]
pub enum Resolution {
    /// This trigger won the guard and its effects ran.
    Applied(Reservation),
    /// Another trigger got there first; nothing was done.
    Superseded,
}

impl Resolution {
    /// Returns the reservation if this trigger applied.
    pub fn applied(self) -> Option<Reservation> {
        match self {
            Resolution::Applied(reservation) => Some(reservation),
            Resolution::Superseded => None,
        }
    }
}

/// Orchestrates reservations across the store, the inventory and
/// payment authorities, the notification sink, and the timeout
/// scheduler.
#[derive(Clone)]
pub struct ReservationSaga<S, I, P, N> {
    store: S,
    inventory: I,
    payment: P,
    notifications: N,
    ledger: LockLedger<S, I>,
    scheduler: Arc<dyn TimeoutScheduler>,
    publisher: StatusPublisher,
    decision_window: Duration,
}

impl<S, I, P, N> ReservationSaga<S, I, P, N>
where
    S: Store + Clone,
    I: InventoryGateway + Clone,
    P: PaymentGateway,
    N: NotificationSink,
{
    /// Creates a saga with a 15-minute owner decision window.
    pub fn new(
        store: S,
        inventory: I,
        payment: P,
        notifications: N,
        scheduler: Arc<dyn TimeoutScheduler>,
        publisher: StatusPublisher,
    ) -> Self {
        Self::with_decision_window(
            store,
            inventory,
            payment,
            notifications,
            scheduler,
            publisher,
            Duration::from_secs(15 * 60),
        )
    }

    /// Creates a saga with an explicit decision window.
    pub fn with_decision_window(
        store: S,
        inventory: I,
        payment: P,
        notifications: N,
        scheduler: Arc<dyn TimeoutScheduler>,
        publisher: StatusPublisher,
        decision_window: Duration,
    ) -> Self {
        let ledger = LockLedger::new(store.clone(), inventory.clone());
        Self {
            store,
            inventory,
            payment,
            notifications,
            ledger,
            scheduler,
            publisher,
            decision_window,
        }
    }

    /// The configured owner decision window.
    pub fn decision_window(&self) -> Duration {
        self.decision_window
    }

    /// Opens a subscription to status-change events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::events::StatusChanged> {
        self.publisher.subscribe()
    }

    /// Loads a reservation.
    pub async fn reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.store
            .reservation(id)
            .await?
            .ok_or(SagaError::ReservationNotFound(id))
    }

    /// Creates a reservation: price quote, exclusive hold, pending row,
    /// decision timeout, owner notification.
    ///
    /// Nothing is persisted if the property is unknown, unavailable, or
    /// the hold cannot be taken.
    #[tracing::instrument(skip(self, input), fields(property = %input.property_id))]
    pub async fn create(&self, input: NewReservation) -> Result<Reservation> {
        let property = match self.inventory.property(input.property_id).await {
            Ok(Some(property)) => property,
            Ok(None) => return Err(SagaError::PropertyNotFound(input.property_id)),
            Err(GatewayError::Declined(_)) => {
                return Err(SagaError::PropertyNotFound(input.property_id));
            }
            Err(GatewayError::Unavailable(reason)) => {
                return Err(SagaError::UpstreamUnavailable {
                    service: "inventory",
                    reason,
                });
            }
        };

        let quote = match self
            .inventory
            .check_availability(input.property_id, &input.dates, &input.shift_id)
            .await
        {
            Ok(quote) => quote,
            Err(GatewayError::Declined(_)) => {
                return Err(SagaError::ResourceUnavailable(input.property_id));
            }
            Err(GatewayError::Unavailable(reason)) => {
                return Err(SagaError::UpstreamUnavailable {
                    service: "inventory",
                    reason,
                });
            }
        };
        if !quote.available {
            return Err(SagaError::ResourceUnavailable(input.property_id));
        }

        let reservation = Reservation::pending(input, quote.price);

        self.ledger
            .acquire(
                reservation.property_id,
                reservation.user_id,
                reservation.reservation_token,
                &reservation.dates,
                &reservation.shift_id,
            )
            .await?;

        if let Err(err) = self.store.insert_reservation(&reservation).await {
            self.ledger.release(reservation.reservation_token).await;
            return Err(err.into());
        }

        self.scheduler
            .schedule(reservation.id, self.decision_window)
            .await;

        self.notifications
            .enqueue(
                Recipient::Owner(property.owner_id),
                TemplateKind::BookingRequest,
                NotificationPayload::for_reservation(reservation.id)
                    .property_name(property.name.clone())
                    .dates(reservation.dates.to_string())
                    .amount(reservation.quoted_amount),
            )
            .await;

        self.publisher.publish(&reservation);
        metrics::counter!("reservations_created_total").increment(1);
        info!(reservation = %reservation.id, "reservation created, awaiting owner decision");

        Ok(reservation)
    }

    /// Applies the owner's decision to a pending reservation.
    ///
    /// On approval the payment sub-saga runs to completion before this
    /// returns; the applied reservation is then in a terminal state
    /// (`paid` or `failed`) unless a cancellation won a later guard.
    #[tracing::instrument(skip(self, decision), fields(%id))]
    pub async fn resolve(&self, id: ReservationId, decision: OwnerDecision) -> Result<Resolution> {
        // Existence check up front so an unknown id is an error, not a
        // silent Superseded.
        self.reservation(id).await?;

        match decision {
            OwnerDecision::Approve => {
                let change = StatusChange::to(ReservationStatus::Approved)
                    .owner_response(OwnerResponse::Approved);
                let Some(approved) = self
                    .store
                    .transition(id, &[ReservationStatus::Pending], change)
                    .await?
                else {
                    debug!(%id, "approval superseded by an earlier resolution");
                    metrics::counter!("reservations_superseded_total").increment(1);
                    return Ok(Resolution::Superseded);
                };

                self.publisher.publish(&approved);
                metrics::counter!("reservations_approved_total").increment(1);

                self.notifications
                    .enqueue(
                        Recipient::User(approved.user_id),
                        TemplateKind::BookingApproved,
                        NotificationPayload::for_reservation(id)
                            .dates(approved.dates.to_string())
                            .amount(approved.quoted_amount),
                    )
                    .await;

                let settled = self.run_payment(approved).await?;
                Ok(Resolution::Applied(settled))
            }
            OwnerDecision::Reject { reason } => {
                let change = StatusChange::to(ReservationStatus::Rejected)
                    .owner_response(OwnerResponse::Rejected);
                let Some(rejected) = self
                    .store
                    .transition(id, &[ReservationStatus::Pending], change)
                    .await?
                else {
                    debug!(%id, "rejection superseded by an earlier resolution");
                    metrics::counter!("reservations_superseded_total").increment(1);
                    return Ok(Resolution::Superseded);
                };

                self.ledger.release(rejected.reservation_token).await;

                let mut payload = NotificationPayload::for_reservation(id)
                    .dates(rejected.dates.to_string());
                if let Some(reason) = reason {
                    payload = payload.reason(reason);
                }
                self.notifications
                    .enqueue(
                        Recipient::User(rejected.user_id),
                        TemplateKind::BookingRejected,
                        payload,
                    )
                    .await;

                self.publisher.publish(&rejected);
                metrics::counter!("reservations_rejected_total").increment(1);
                Ok(Resolution::Applied(rejected))
            }
        }
    }

    /// Expires a reservation whose decision window elapsed.
    ///
    /// Fired by the timeout scheduler, possibly more than once and
    /// possibly after the owner already decided; losing the guard is
    /// the normal case then.
    #[tracing::instrument(skip(self), fields(%id))]
    pub async fn expire(&self, id: ReservationId) -> Result<Resolution> {
        let change = StatusChange::to(ReservationStatus::Expired)
            .owner_response(OwnerResponse::Timeout);
        let Some(expired) = self
            .store
            .transition(id, &[ReservationStatus::Pending], change)
            .await?
        else {
            debug!(%id, "timeout fired after the reservation was already resolved");
            return Ok(Resolution::Superseded);
        };

        self.ledger.release(expired.reservation_token).await;

        self.notifications
            .enqueue(
                Recipient::User(expired.user_id),
                TemplateKind::BookingExpired,
                NotificationPayload::for_reservation(id).dates(expired.dates.to_string()),
            )
            .await;
        // The owner learns their window lapsed too; a metadata lookup
        // failure only costs that one message.
        match self.inventory.property(expired.property_id).await {
            Ok(Some(property)) => {
                self.notifications
                    .enqueue(
                        Recipient::Owner(property.owner_id),
                        TemplateKind::BookingExpired,
                        NotificationPayload::for_reservation(id)
                            .property_name(property.name)
                            .dates(expired.dates.to_string()),
                    )
                    .await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%id, error = %err, "could not notify the owner of the expired request");
            }
        }

        self.publisher.publish(&expired);
        metrics::counter!("reservations_expired_total").increment(1);
        info!(%id, "reservation expired, no owner response in the window");
        Ok(Resolution::Applied(expired))
    }

    /// Cancels a reservation on the guest's behalf.
    ///
    /// Allowed from `pending` and `approved`; anything later is a
    /// [`SagaError::CannotCancel`]. Racing against an in-flight payment
    /// is resolved by the guard like every other race.
    #[tracing::instrument(skip(self), fields(%id))]
    pub async fn cancel(&self, id: ReservationId, user: UserId) -> Result<Resolution> {
        let reservation = self.reservation(id).await?;
        if !reservation.is_held_by(user) {
            return Err(domain::DomainError::NotReservationHolder.into());
        }
        if !reservation.status.can_cancel() {
            return Err(SagaError::CannotCancel(reservation.status));
        }

        let Some(cancelled) = self
            .store
            .transition(
                id,
                &[ReservationStatus::Pending, ReservationStatus::Approved],
                StatusChange::to(ReservationStatus::Cancelled),
            )
            .await?
        else {
            debug!(%id, "cancellation superseded by an earlier resolution");
            metrics::counter!("reservations_superseded_total").increment(1);
            return Ok(Resolution::Superseded);
        };

        self.ledger.release(cancelled.reservation_token).await;

        self.notifications
            .enqueue(
                Recipient::User(cancelled.user_id),
                TemplateKind::BookingCancelled,
                NotificationPayload::for_reservation(id).dates(cancelled.dates.to_string()),
            )
            .await;

        self.publisher.publish(&cancelled);
        metrics::counter!("reservations_cancelled_total").increment(1);
        Ok(Resolution::Applied(cancelled))
    }

    /// Runs the payment sub-saga, converting any unexpected error into
    /// a best-effort terminal failure so the reservation never sticks
    /// in `approved` silently.
    async fn run_payment(&self, reservation: Reservation) -> Result<Reservation> {
        let id = reservation.id;
        let started = std::time::Instant::now();
        let outcome = self.payment_flow(&reservation).await;
        metrics::histogram!("payment_duration_seconds").record(started.elapsed().as_secs_f64());
        match outcome {
            Ok(settled) => Ok(settled),
            Err(err) => {
                warn!(%id, error = %err, "payment sub-saga aborted, failing the reservation");
                match self
                    .fail_payment(&reservation, PaymentFailureReason::PaymentError)
                    .await
                {
                    Ok(Some(failed)) => Ok(failed),
                    Ok(None) => self.reservation(id).await,
                    Err(fail_err) => {
                        warn!(%id, error = %fail_err, "could not record payment failure");
                        Err(err)
                    }
                }
            }
        }
    }

    /// The happy-path payment sequence: authorize, persist the
    /// pre-authorized state, capture, confirm the booking, mark paid.
    ///
    /// Declines are handled inline (terminal `failed` plus exactly one
    /// guest notification); only infrastructure errors propagate to
    /// [`Self::run_payment`].
    async fn payment_flow(&self, reservation: &Reservation) -> Result<Reservation> {
        let id = reservation.id;
        let amount = reservation.quoted_amount;
        let attempt = self.store.next_attempt_number(id).await?;

        let authorization = match self
            .payment
            .authorize(id, reservation.user_id, amount)
            .await
        {
            Ok(authorization) => authorization,
            Err(err) => {
                debug!(%id, error = %err, "authorization failed");
                let record = PaymentRecord::failed(
                    id,
                    amount,
                    attempt,
                    serde_json::json!({ "error": err.to_string() }),
                );
                self.store.insert_payment(&record).await?;
                return self
                    .settle_failed(reservation, PaymentFailureReason::PreAuthFailed)
                    .await;
            }
        };

        let record =
            PaymentRecord::pre_authorized(id, amount, attempt, authorization.raw.clone());
        self.store.insert_payment(&record).await?;

        let pre_authorized = self
            .store
            .transition(
                id,
                &[ReservationStatus::Approved],
                StatusChange::to(ReservationStatus::Approved)
                    .payment_status(PaymentStatus::PreAuthorized)
                    .payment_reference(authorization.reference.clone()),
            )
            .await?;
        let Some(pre_authorized) = pre_authorized else {
            // Cancelled underneath us; the cancellation path already
            // released the lock and notified.
            warn!(%id, "reservation left approved during authorization, stopping payment");
            return self.reservation(id).await;
        };
        self.publisher.publish(&pre_authorized);

        let receipt = match self.payment.capture(&authorization, amount).await {
            Ok(receipt) => receipt,
            Err(err) => {
                debug!(%id, error = %err, "capture failed");
                self.store
                    .update_payment(
                        record.id,
                        PaymentRecordStatus::Failed,
                        serde_json::json!({ "error": err.to_string() }),
                    )
                    .await?;
                return self
                    .settle_failed(&pre_authorized, PaymentFailureReason::CaptureFailed)
                    .await;
            }
        };

        self.store
            .update_payment(record.id, PaymentRecordStatus::Captured, receipt.raw.clone())
            .await?;

        if let Err(err) = self
            .inventory
            .confirm(reservation.reservation_token, id)
            .await
        {
            warn!(%id, error = %err, "booking confirmation failed after capture");
            return self
                .settle_failed(&pre_authorized, PaymentFailureReason::PaymentError)
                .await;
        }

        let Some(paid) = self
            .store
            .transition(
                id,
                &[ReservationStatus::Approved],
                StatusChange::to(ReservationStatus::Paid)
                    .payment_status(PaymentStatus::Captured),
            )
            .await?
        else {
            warn!(%id, "reservation left approved during capture, stopping payment");
            return self.reservation(id).await;
        };

        self.ledger.release(paid.reservation_token).await;

        self.notifications
            .enqueue(
                Recipient::User(paid.user_id),
                TemplateKind::BookingConfirmed,
                NotificationPayload::for_reservation(id)
                    .dates(paid.dates.to_string())
                    .amount(amount),
            )
            .await;
        // The owner gets the confirmation too; a metadata lookup
        // failure only costs that one message.
        match self.inventory.property(paid.property_id).await {
            Ok(Some(property)) => {
                self.notifications
                    .enqueue(
                        Recipient::Owner(property.owner_id),
                        TemplateKind::BookingConfirmed,
                        NotificationPayload::for_reservation(id)
                            .property_name(property.name)
                            .dates(paid.dates.to_string())
                            .amount(amount),
                    )
                    .await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%id, error = %err, "could not notify the owner of the confirmed booking");
            }
        }

        self.publisher.publish(&paid);
        metrics::counter!("payments_captured_total").increment(1);
        info!(%id, "reservation paid and confirmed");
        Ok(paid)
    }

    /// Fails the payment and returns the terminal row, or the current
    /// row if the guard was lost.
    async fn settle_failed(
        &self,
        reservation: &Reservation,
        reason: PaymentFailureReason,
    ) -> Result<Reservation> {
        match self.fail_payment(reservation, reason).await? {
            Some(failed) => Ok(failed),
            None => self.reservation(reservation.id).await,
        }
    }

    /// Moves an approved reservation to terminal `failed`: bump the
    /// attempt counter, release the hold, tell the guest once.
    ///
    /// Returns `None` if the reservation was no longer `approved`.
    async fn fail_payment(
        &self,
        reservation: &Reservation,
        reason: PaymentFailureReason,
    ) -> Result<Option<Reservation>> {
        let id = reservation.id;
        let Some(failed) = self
            .store
            .transition(
                id,
                &[ReservationStatus::Approved],
                StatusChange::to(ReservationStatus::Failed)
                    .payment_status(PaymentStatus::Failed)
                    .increment_attempts(),
            )
            .await?
        else {
            debug!(%id, "payment failure superseded, no side effects");
            return Ok(None);
        };

        self.ledger.release(failed.reservation_token).await;

        self.notifications
            .enqueue(
                Recipient::User(failed.user_id),
                TemplateKind::PaymentFailed,
                NotificationPayload::for_reservation(id)
                    .dates(failed.dates.to_string())
                    .amount(failed.quoted_amount)
                    .reason(reason.as_str()),
            )
            .await;

        self.publisher.publish(&failed);
        metrics::counter!("payments_failed_total").increment(1);
        info!(%id, %reason, "payment failed, reservation terminal");
        Ok(Some(failed))
    }
}
