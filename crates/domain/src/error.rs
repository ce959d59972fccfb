//! Domain error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by domain-level validation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested date range is empty or inverted.
    #[error("Invalid date range: start {start} is not before end {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The caller does not own the reservation.
    #[error("Reservation does not belong to the requesting user")]
    NotReservationHolder,
}
