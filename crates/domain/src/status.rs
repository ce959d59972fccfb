//! Reservation and payment state machines.

use serde::{Deserialize, Serialize};

/// The status of a reservation in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Approved ──┬──► Paid
///           │               ├──► Failed
///           │               └──► Cancelled
///           ├──► Rejected
///           ├──► Expired
///           └──► Cancelled
/// ```
///
/// `Rejected`, `Expired`, `Paid`, `Failed`, and `Cancelled` are
/// terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Awaiting the owner's decision within the 15-minute window.
    #[default]
    Pending,

    /// Owner approved; payment sub-saga runs from here.
    Approved,

    /// Owner declined the request (terminal).
    Rejected,

    /// The decision window elapsed with no owner response (terminal).
    Expired,

    /// Payment captured and booking confirmed (terminal).
    Paid,

    /// Payment sub-saga failed (terminal).
    Failed,

    /// The guest withdrew the request (terminal).
    Cancelled,
}

impl ReservationStatus {
    /// Returns true if an owner decision or timeout may still resolve
    /// this reservation.
    pub fn can_resolve(&self) -> bool {
        matches!(self, ReservationStatus::Pending)
    }

    /// Returns true if the guest may cancel from this status.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Approved
        )
    }

    /// Returns true if the payment sub-saga may run from this status.
    pub fn can_start_payment(&self) -> bool {
        matches!(self, ReservationStatus::Approved)
    }

    /// Returns true if this is a terminal status (no further
    /// transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected
                | ReservationStatus::Expired
                | ReservationStatus::Paid
                | ReservationStatus::Failed
                | ReservationStatus::Cancelled
        )
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Paid => "paid",
            ReservationStatus::Failed => "failed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "approved" => Some(ReservationStatus::Approved),
            "rejected" => Some(ReservationStatus::Rejected),
            "expired" => Some(ReservationStatus::Expired),
            "paid" => Some(ReservationStatus::Paid),
            "failed" => Some(ReservationStatus::Failed),
            "cancelled" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payment state of a reservation.
///
/// Moves only while the reservation status is `approved`, `paid`, or
/// `failed`: `None ──► PreAuthorized ──► Captured | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No payment attempt has been made.
    #[default]
    None,

    /// Funds authorized but not yet captured; a crash here leaves an
    /// inspectable, resumable state.
    PreAuthorized,

    /// Funds captured (terminal).
    Captured,

    /// Authorization or capture failed (terminal).
    Failed,
}

impl PaymentStatus {
    /// Returns true if no further payment writes are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Captured | PaymentStatus::Failed)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::None => "none",
            PaymentStatus::PreAuthorized => "pre_authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Parses a payment status from its database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(PaymentStatus::None),
            "pre_authorized" => Some(PaymentStatus::PreAuthorized),
            "captured" => Some(PaymentStatus::Captured),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a pending reservation was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerResponse {
    /// Owner approved within the window.
    Approved,
    /// Owner rejected within the window.
    Rejected,
    /// The window elapsed before any owner response.
    Timeout,
}

impl OwnerResponse {
    /// Returns the response name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerResponse::Approved => "approved",
            OwnerResponse::Rejected => "rejected",
            OwnerResponse::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for OwnerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
