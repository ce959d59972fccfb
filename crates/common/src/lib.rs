//! Shared identifier types used across the reservation service.

pub mod types;

pub use types::{
    NotificationId, OwnerId, PropertyId, ReservationId, ReservationToken, ShiftId, UserId,
};
