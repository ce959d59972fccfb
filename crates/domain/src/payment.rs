//! Payment attempt records.

use chrono::{DateTime, Utc};
use common::ReservationId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::Money;

/// The lifecycle of a single payment attempt.
///
/// `PreAuthorized ──► Captured | Failed`; records are never mutated
/// after reaching a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    PreAuthorized,
    Captured,
    Failed,
}

impl PaymentRecordStatus {
    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::PreAuthorized => "pre_authorized",
            PaymentRecordStatus::Captured => "captured",
            PaymentRecordStatus::Failed => "failed",
        }
    }

    /// Returns true if the record accepts no further writes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentRecordStatus::Captured | PaymentRecordStatus::Failed
        )
    }
}

/// How the payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
}

/// One authorize/capture attempt against the payment authority.
///
/// A reservation accumulates one record per attempt with strictly
/// increasing `attempt_number`; at most one record is non-failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub reservation_id: ReservationId,
    pub status: PaymentRecordStatus,
    pub amount: Money,
    pub method: PaymentMethod,
    pub attempt_number: u32,
    /// Opaque payload returned by the gateway, kept for audit.
    pub gateway_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Creates a pre-authorized record for a new attempt.
    pub fn pre_authorized(
        reservation_id: ReservationId,
        amount: Money,
        attempt_number: u32,
        gateway_response: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            status: PaymentRecordStatus::PreAuthorized,
            amount,
            method: PaymentMethod::Card,
            attempt_number,
            gateway_response,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a failed record for an attempt that never authorized.
    pub fn failed(
        reservation_id: ReservationId,
        amount: Money,
        attempt_number: u32,
        gateway_response: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            status: PaymentRecordStatus::Failed,
            amount,
            method: PaymentMethod::Card,
            attempt_number,
            gateway_response,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_authorized_record() {
        let record = PaymentRecord::pre_authorized(
            ReservationId::new(),
            Money::from_cents(10_000),
            1,
            serde_json::json!({"authorization_code": "auth_1"}),
        );
        assert_eq!(record.status, PaymentRecordStatus::PreAuthorized);
        assert_eq!(record.attempt_number, 1);
        assert!(!record.status.is_terminal());
    }

    #[test]
    fn test_failed_record_is_terminal() {
        let record = PaymentRecord::failed(
            ReservationId::new(),
            Money::from_cents(10_000),
            2,
            serde_json::json!({"error": "declined"}),
        );
        assert!(record.status.is_terminal());
        assert_eq!(record.attempt_number, 2);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let record = PaymentRecord::pre_authorized(
            ReservationId::new(),
            Money::from_cents(500),
            1,
            serde_json::Value::Null,
        );
        let json = serde_json::to_string(&record).unwrap();
        let deserialized: PaymentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.id, record.id);
        assert_eq!(deserialized.status, PaymentRecordStatus::PreAuthorized);
    }
}
