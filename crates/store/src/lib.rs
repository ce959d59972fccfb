//! Persistence layer for the reservation service.
//!
//! Every reservation status write goes through [`Store::transition`],
//! a single-row compare-and-set against the persisted status. The
//! timeout trigger and the owner-decision trigger race from different
//! execution contexts; the conditional write is the only mutual
//! exclusion between them, so exactly one of two concurrent resolvers
//! observes a row change and runs side effects.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{StatusChange, Store};
