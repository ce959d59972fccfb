//! Typed clients for the external inventory and payment authorities.
//!
//! Retries and per-call timeouts live here, not in the saga: saga
//! transitions stay single-shot and auditable, and whatever a gateway
//! returns is final for the current step.

pub mod inventory;
pub mod payment;

pub use inventory::{
    AvailabilityQuote, HttpInventoryGateway, InMemoryInventoryGateway, InventoryGateway, LockGrant,
    PropertyDescriptor,
};
pub use payment::{
    Authorization, CaptureReceipt, HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway,
};
