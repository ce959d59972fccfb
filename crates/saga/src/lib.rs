//! The reservation saga.
//!
//! Orchestrates a reservation from creation to a terminal outcome
//! across three independently-failing parties: the external inventory
//! authority, the payment authority, and the property owner, who has a
//! fixed 15-minute window to decide.
//!
//! Triggers (creation, owner decision, timeout firing, cancellation)
//! arrive from different execution contexts and may race; every status
//! write is a guarded conditional write through the store, so exactly
//! one of two racing resolvers runs side effects. Guard losers are
//! silent no-ops.

pub mod coordinator;
pub mod error;
pub mod events;
pub mod gateways;
pub mod ledger;
pub mod notify;
pub mod recovery;
pub mod timeout;

pub use coordinator::{OwnerDecision, ReservationSaga, Resolution};
pub use error::{GatewayError, PaymentFailureReason, SagaError};
pub use events::{StatusChanged, StatusPublisher};
pub use gateways::{
    AvailabilityQuote, Authorization, CaptureReceipt, HttpInventoryGateway, HttpPaymentGateway,
    InMemoryInventoryGateway, InMemoryPaymentGateway, InventoryGateway, LockGrant, PaymentGateway,
    PropertyDescriptor,
};
pub use ledger::LockLedger;
pub use notify::{NotificationPayload, NotificationSink, Recipient, RecordingSink, TemplateKind};
pub use recovery::{RecoveryDisposition, StalledPayment, sweep_pre_authorized};
pub use timeout::{ManualTimeoutScheduler, TimeoutScheduler, TokioTimeoutScheduler};
