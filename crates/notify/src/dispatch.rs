//! Queued notification dispatch.
//!
//! [`Dispatcher`] is the saga's notification sink. Enqueueing appends
//! to an in-process queue and returns immediately; a worker drains the
//! queue, renders each message once, and attempts delivery on every
//! configured channel. One channel failing does not stop the others,
//! and every attempt lands in the delivery log with its outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::NotificationId;
use saga::{NotificationPayload, NotificationSink, Recipient, TemplateKind};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::channel::{Channel, ChannelKind};
use crate::templates::render;

/// Outcome of one delivery attempt on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
}

/// One line of the delivery log.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub id: NotificationId,
    pub recipient: Recipient,
    pub template: TemplateKind,
    pub channel: ChannelKind,
    pub status: DeliveryStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct QueuedNotification {
    id: NotificationId,
    recipient: Recipient,
    template: TemplateKind,
    payload: NotificationPayload,
}

struct Inner {
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
    queue: Mutex<VecDeque<QueuedNotification>>,
    log: Mutex<Vec<DeliveryRecord>>,
    wakeup: Notify,
}

/// Fan-out notification sink backed by an in-process queue.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given channels, keyed by
    /// transport. Registering a second channel for the same transport
    /// replaces the first.
    pub fn new(channels: Vec<Arc<dyn Channel>>) -> Self {
        let channels = channels
            .into_iter()
            .map(|channel| (channel.kind(), channel))
            .collect();
        Self {
            inner: Arc::new(Inner {
                channels,
                queue: Mutex::new(VecDeque::new()),
                log: Mutex::new(Vec::new()),
                wakeup: Notify::new(),
            }),
        }
    }

    /// Spawns the background worker that drains the queue as
    /// notifications arrive. Runs until the dispatcher is dropped
    /// everywhere or the task is aborted.
    pub fn spawn_worker(&self) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            loop {
                dispatcher.process_pending().await;
                dispatcher.inner.wakeup.notified().await;
            }
        })
    }

    /// Drains and delivers everything currently queued. Returns the
    /// number of notifications processed.
    pub async fn process_pending(&self) -> usize {
        let mut processed = 0;
        loop {
            let next = self.inner.queue.lock().unwrap().pop_front();
            let Some(notification) = next else {
                return processed;
            };
            self.deliver(notification).await;
            processed += 1;
        }
    }

    async fn deliver(&self, notification: QueuedNotification) {
        let message = render(notification.template, &notification.payload);

        for channel in self.inner.channels.values() {
            let status = match channel.deliver(&notification.recipient, &message).await {
                Ok(()) => {
                    metrics::counter!("notifications_delivered_total").increment(1);
                    DeliveryStatus::Delivered
                }
                Err(err) => {
                    warn!(
                        notification = %notification.id,
                        channel = %channel.kind(),
                        error = %err,
                        "notification delivery failed"
                    );
                    metrics::counter!("notifications_failed_total").increment(1);
                    DeliveryStatus::Failed(err.to_string())
                }
            };

            self.inner.log.lock().unwrap().push(DeliveryRecord {
                id: notification.id,
                recipient: notification.recipient,
                template: notification.template,
                channel: channel.kind(),
                status,
                at: Utc::now(),
            });
        }
    }

    /// Returns a snapshot of the delivery log.
    pub fn log(&self) -> Vec<DeliveryRecord> {
        self.inner.log.lock().unwrap().clone()
    }

    /// Returns how many queued notifications await the worker.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for Dispatcher {
    async fn enqueue(
        &self,
        recipient: Recipient,
        template: TemplateKind,
        payload: NotificationPayload,
    ) {
        self.inner
            .queue
            .lock()
            .unwrap()
            .push_back(QueuedNotification {
                id: NotificationId::new(),
                recipient,
                template,
                payload,
            });
        self.inner.wakeup.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ReservationId, UserId};

    use crate::channel::RecordingChannel;

    fn dispatcher_with_channels() -> (Dispatcher, RecordingChannel, RecordingChannel) {
        let email = RecordingChannel::new(ChannelKind::Email);
        let sms = RecordingChannel::new(ChannelKind::Sms);
        let dispatcher = Dispatcher::new(vec![
            Arc::new(email.clone()),
            Arc::new(sms.clone()),
        ]);
        (dispatcher, email, sms)
    }

    #[tokio::test]
    async fn test_one_notification_fans_out_to_every_channel() {
        let (dispatcher, email, sms) = dispatcher_with_channels();

        dispatcher
            .enqueue(
                Recipient::User(UserId::new()),
                TemplateKind::BookingConfirmed,
                NotificationPayload::for_reservation(ReservationId::new()),
            )
            .await;
        assert_eq!(dispatcher.pending(), 1);

        let processed = dispatcher.process_pending().await;
        assert_eq!(processed, 1);
        assert_eq!(email.sent_count(), 1);
        assert_eq!(sms.sent_count(), 1);
        assert_eq!(dispatcher.log().len(), 2);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_stop_the_others() {
        let (dispatcher, email, sms) = dispatcher_with_channels();
        email.set_fail(true);

        dispatcher
            .enqueue(
                Recipient::User(UserId::new()),
                TemplateKind::PaymentFailed,
                NotificationPayload::for_reservation(ReservationId::new())
                    .reason("capture_failed"),
            )
            .await;
        dispatcher.process_pending().await;

        assert_eq!(email.sent_count(), 0);
        assert_eq!(sms.sent_count(), 1);

        let log = dispatcher.log();
        assert_eq!(log.len(), 2);
        assert!(log.iter().any(|record| record.channel == ChannelKind::Email
            && matches!(record.status, DeliveryStatus::Failed(_))));
        assert!(log.iter().any(|record| record.channel == ChannelKind::Sms
            && record.status == DeliveryStatus::Delivered));
    }

    #[tokio::test]
    async fn test_duplicate_transport_registration_keeps_one_channel() {
        let first = RecordingChannel::new(ChannelKind::Email);
        let second = RecordingChannel::new(ChannelKind::Email);
        let dispatcher = Dispatcher::new(vec![
            Arc::new(first.clone()),
            Arc::new(second.clone()),
        ]);

        dispatcher
            .enqueue(
                Recipient::User(UserId::new()),
                TemplateKind::BookingApproved,
                NotificationPayload::for_reservation(ReservationId::new()),
            )
            .await;
        dispatcher.process_pending().await;

        // One transport, one delivery, one log line.
        assert_eq!(first.sent_count() + second.sent_count(), 1);
        assert_eq!(dispatcher.log().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_in_background() {
        let (dispatcher, email, _sms) = dispatcher_with_channels();
        let worker = dispatcher.spawn_worker();

        dispatcher
            .enqueue(
                Recipient::User(UserId::new()),
                TemplateKind::BookingExpired,
                NotificationPayload::for_reservation(ReservationId::new()),
            )
            .await;

        // The worker runs on its own task; give it a moment.
        for _ in 0..50 {
            if email.sent_count() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(email.sent_count(), 1);
        assert_eq!(dispatcher.pending(), 0);
        worker.abort();
    }
}
