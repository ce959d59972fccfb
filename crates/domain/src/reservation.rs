//! The reservation record, the unit of the saga.

use chrono::{DateTime, Utc};
use common::{PropertyId, ReservationId, ReservationToken, ShiftId, UserId};
use serde::{Deserialize, Serialize};

use crate::status::{OwnerResponse, PaymentStatus, ReservationStatus};
use crate::value_objects::{DateRange, Money};

/// Input for creating a reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    pub user_id: UserId,
    pub property_id: PropertyId,
    pub shift_id: ShiftId,
    pub dates: DateRange,
}

/// A reservation of a property/time-slot.
///
/// Created once in `pending`, mutated only through the saga's guarded
/// transitions, never deleted. `quoted_amount` is the price captured
/// from the availability check at creation time; the payment sub-saga
/// charges exactly this value so the price cannot drift between
/// approval and capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub property_id: PropertyId,
    pub shift_id: ShiftId,
    pub dates: DateRange,
    /// Capability token shared with the inventory authority; immutable.
    pub reservation_token: ReservationToken,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    /// Monotonic count of failed payment attempts; never resets.
    pub payment_attempts: u32,
    /// Price captured from the availability quote at creation.
    pub quoted_amount: Money,
    /// Gateway reference of the latest payment step, if any.
    pub payment_reference: Option<String>,
    pub owner_response: Option<OwnerResponse>,
    pub owner_response_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates a pending reservation with a fresh token.
    pub fn pending(input: NewReservation, quoted_amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::new(),
            user_id: input.user_id,
            property_id: input.property_id,
            shift_id: input.shift_id,
            dates: input.dates,
            reservation_token: ReservationToken::new(),
            status: ReservationStatus::Pending,
            payment_status: PaymentStatus::None,
            payment_attempts: 0,
            quoted_amount,
            payment_reference: None,
            owner_response: None,
            owner_response_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the given user created this reservation.
    pub fn is_held_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}
