//! Saga error taxonomy.

use common::{PropertyId, ReservationId};
use domain::{DomainError, ReservationStatus};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by gateway clients.
///
/// The split matters to the saga: `Unavailable` means the authority
/// could not answer (network, timeout, 5xx) and the current step fails
/// closed; `Declined` is a business-level answer (slot taken, payment
/// refused) the authority did deliver.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The upstream authority was unreachable or erroring.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream authority rejected the request.
    #[error("Declined: {0}")]
    Declined(String),
}

/// Why a payment sub-saga landed in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFailureReason {
    /// Authorization was refused.
    PreAuthFailed,
    /// Capture of an authorized amount was refused.
    CaptureFailed,
    /// An unexpected error interrupted the sequence.
    PaymentError,
}

impl PaymentFailureReason {
    /// Returns the reason string carried in notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFailureReason::PreAuthFailed => "pre_auth_failed",
            PaymentFailureReason::CaptureFailed => "capture_failed",
            PaymentFailureReason::PaymentError => "payment_error",
        }
    }
}

impl std::fmt::Display for PaymentFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Lost an availability or lock race; no partial state persisted.
    #[error("Property {0} not available for the requested dates")]
    ResourceUnavailable(PropertyId),

    /// The inventory or payment authority was unreachable.
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },

    /// The property does not exist in the inventory authority.
    #[error("Property not found: {0}")]
    PropertyNotFound(PropertyId),

    /// Reservation not found.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The reservation is past the point where this trigger applies.
    #[error("Reservation cannot be cancelled from status {0}")]
    CannotCancel(ReservationStatus),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
