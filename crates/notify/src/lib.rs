//! Multi-channel notification delivery.
//!
//! The saga decides what to say and to whom; this crate renders the
//! message and fans it out across every configured channel (email, SMS,
//! WhatsApp). Delivery is queued and asynchronous, and a channel
//! failure is recorded per channel, never surfaced to the saga.

pub mod channel;
pub mod dispatch;
pub mod templates;

pub use channel::{Channel, ChannelKind, DeliveryError, RecordingChannel, TracingChannel};
pub use dispatch::{DeliveryRecord, DeliveryStatus, Dispatcher};
pub use templates::{render, RenderedMessage};
