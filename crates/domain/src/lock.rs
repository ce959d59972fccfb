//! Local mirror of the exclusive hold on a property/date-range.

use chrono::{DateTime, Duration, Utc};
use common::{PropertyId, ReservationToken, UserId};
use serde::{Deserialize, Serialize};

use crate::value_objects::DateRange;

/// Why a lock exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Held on behalf of a pending/approved reservation.
    Reservation,
    /// Property blocked for maintenance.
    Maintenance,
    /// Property blocked while a fraud review runs.
    FraudHold,
}

impl LockKind {
    /// Returns the kind name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Reservation => "reservation",
            LockKind::Maintenance => "maintenance",
            LockKind::FraudHold => "fraud_hold",
        }
    }

    /// Parses a kind from its database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reservation" => Some(LockKind::Reservation),
            "maintenance" => Some(LockKind::Maintenance),
            "fraud_hold" => Some(LockKind::FraudHold),
            _ => None,
        }
    }
}

/// A lock row in the ledger.
///
/// For a given property and overlapping date range, at most one
/// reservation-kind lock is active at a time. Rows are deactivated
/// exactly once and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub property_id: PropertyId,
    /// The user on whose behalf the hold was taken.
    pub holder: UserId,
    pub reservation_token: ReservationToken,
    pub dates: DateRange,
    pub kind: LockKind,
    pub is_active: bool,
    pub locked_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Lock {
    /// Creates an active reservation-kind lock expiring after `ttl`.
    pub fn for_reservation(
        property_id: PropertyId,
        holder: UserId,
        token: ReservationToken,
        dates: DateRange,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            property_id,
            holder,
            reservation_token: token,
            dates,
            kind: LockKind::Reservation,
            is_active: true,
            locked_until: now + ttl,
            created_at: now,
        }
    }

    /// Returns true if this lock excludes a reservation attempt over
    /// `dates` on the same property.
    pub fn blocks(&self, property_id: PropertyId, dates: &DateRange) -> bool {
        self.is_active && self.property_id == property_id && self.dates.overlaps(dates)
    }
}
