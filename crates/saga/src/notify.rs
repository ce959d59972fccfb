//! Notification sink trait used by the saga.
//!
//! The saga only decides WHAT to tell WHOM and hands that off; channel
//! fan-out (email, SMS, WhatsApp) and delivery live in the notify
//! crate. Enqueueing is fire-and-forget: a notification failure never
//! fails a saga transition.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OwnerId, ReservationId, UserId};
use domain::Money;
use serde::{Deserialize, Serialize};

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Recipient {
    /// The guest who requested the reservation.
    User(UserId),
    /// The property owner.
    Owner(OwnerId),
}

/// Which message template to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Owner: a new request needs a decision.
    BookingRequest,
    /// Guest: the owner approved, payment is running.
    BookingApproved,
    /// Guest: the owner rejected the request.
    BookingRejected,
    /// Guest: payment could not be completed.
    PaymentFailed,
    /// Guest: paid and confirmed.
    BookingConfirmed,
    /// Guest: the owner never answered in time.
    BookingExpired,
    /// Guest: cancellation acknowledged.
    BookingCancelled,
}

impl TemplateKind {
    /// Returns the template name as recorded in the notification log.
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::BookingRequest => "booking_request",
            TemplateKind::BookingApproved => "booking_approved",
            TemplateKind::BookingRejected => "booking_rejected",
            TemplateKind::PaymentFailed => "payment_failed",
            TemplateKind::BookingConfirmed => "booking_confirmed",
            TemplateKind::BookingExpired => "booking_expired",
            TemplateKind::BookingCancelled => "booking_cancelled",
        }
    }
}

/// The variables a template can interpolate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub reservation_id: Option<ReservationId>,
    pub property_name: Option<String>,
    pub dates: Option<String>,
    pub amount: Option<Money>,
    pub reason: Option<String>,
}

impl NotificationPayload {
    /// Starts an empty payload for `reservation_id`.
    pub fn for_reservation(reservation_id: ReservationId) -> Self {
        Self {
            reservation_id: Some(reservation_id),
            ..Self::default()
        }
    }

    /// Sets the property name.
    pub fn property_name(mut self, name: impl Into<String>) -> Self {
        self.property_name = Some(name.into());
        self
    }

    /// Sets the human-readable date range.
    pub fn dates(mut self, dates: impl Into<String>) -> Self {
        self.dates = Some(dates.into());
        self
    }

    /// Sets the amount involved.
    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Sets a failure or rejection reason.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Accepts notifications for asynchronous delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Queues one notification. Must not fail the caller; delivery
    /// problems are the sink's to log and absorb.
    async fn enqueue(&self, recipient: Recipient, template: TemplateKind, payload: NotificationPayload);
}

/// One enqueued notification, as captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub recipient: Recipient,
    pub template: TemplateKind,
    pub payload: NotificationPayload,
    pub at: DateTime<Utc>,
}

/// Test sink that records everything it is handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<RecordedNotification>>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything enqueued so far.
    pub fn entries(&self) -> Vec<RecordedNotification> {
        self.entries.lock().unwrap().clone()
    }

    /// Returns how many notifications used `template`.
    pub fn count_of(&self, template: TemplateKind) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.template == template)
            .count()
    }

    /// Returns the total number of enqueued notifications.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns true if nothing was enqueued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn enqueue(
        &self,
        recipient: Recipient,
        template: TemplateKind,
        payload: NotificationPayload,
    ) {
        self.entries.lock().unwrap().push(RecordedNotification {
            recipient,
            template,
            payload,
            at: Utc::now(),
        });
    }
}
