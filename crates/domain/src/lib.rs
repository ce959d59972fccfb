//! Domain model for the reservation service.
//!
//! This crate holds the data the saga mutates and the two state
//! machines that constrain those mutations:
//! - [`ReservationStatus`], the reservation lifecycle;
//! - [`PaymentStatus`], the two-phase payment lifecycle nested in it.
//!
//! Nothing here performs I/O; the store crate persists these types and
//! the saga crate drives their transitions.

pub mod error;
pub mod lock;
pub mod payment;
pub mod reservation;
pub mod status;
pub mod value_objects;

pub use error::DomainError;
pub use lock::{Lock, LockKind};
pub use payment::{PaymentMethod, PaymentRecord, PaymentRecordStatus};
pub use reservation::{NewReservation, Reservation};
pub use status::{OwnerResponse, PaymentStatus, ReservationStatus};
pub use value_objects::{DateRange, Money};
