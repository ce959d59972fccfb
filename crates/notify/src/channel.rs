//! Delivery channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use saga::Recipient;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::templates::RenderedMessage;

/// The transport a message goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    WhatsApp,
}

impl ChannelKind {
    /// Returns the channel name as recorded in the delivery log.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::WhatsApp => "whatsapp",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A channel failed to deliver one message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Transport error: {0}")]
    Transport(String),
}

/// One outbound transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Which transport this is.
    fn kind(&self) -> ChannelKind;

    /// Delivers one rendered message to the recipient.
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &RenderedMessage,
    ) -> Result<(), DeliveryError>;
}

/// Channel that writes deliveries to the log instead of a provider.
///
/// Stands in for a real provider integration in development and keeps
/// the dispatcher exercised end to end.
#[derive(Debug, Clone)]
pub struct TracingChannel {
    kind: ChannelKind,
}

impl TracingChannel {
    /// Creates a logging channel for the given transport.
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Channel for TracingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &RenderedMessage,
    ) -> Result<(), DeliveryError> {
        info!(
            channel = %self.kind,
            ?recipient,
            subject = %message.subject,
            "notification delivered"
        );
        Ok(())
    }
}

/// Test channel that records what it was asked to send.
#[derive(Debug, Clone)]
pub struct RecordingChannel {
    kind: ChannelKind,
    sent: Arc<Mutex<Vec<(Recipient, RenderedMessage)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingChannel {
    /// Creates a recording channel for the given transport.
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every delivery fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns everything sent so far.
    pub fn sent(&self) -> Vec<(Recipient, RenderedMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the number of delivered messages.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &RenderedMessage,
    ) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("provider rejected".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((*recipient, message.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;

    fn message() -> RenderedMessage {
        RenderedMessage {
            subject: "subject".to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_recording_channel_captures_deliveries() {
        let channel = RecordingChannel::new(ChannelKind::Sms);
        let recipient = Recipient::User(UserId::new());

        channel.deliver(&recipient, &message()).await.unwrap();
        assert_eq!(channel.sent_count(), 1);
        assert_eq!(channel.sent()[0].0, recipient);
    }

    #[tokio::test]
    async fn test_recording_channel_can_fail() {
        let channel = RecordingChannel::new(ChannelKind::Email);
        channel.set_fail(true);

        let result = channel
            .deliver(&Recipient::User(UserId::new()), &message())
            .await;
        assert!(result.is_err());
        assert_eq!(channel.sent_count(), 0);
    }
}
