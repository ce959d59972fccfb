//! Message templates.
//!
//! Plain-text rendering keyed by [`TemplateKind`]. Missing payload
//! fields degrade to generic wording rather than failing; a vague
//! notification beats a dropped one.

use saga::{NotificationPayload, TemplateKind};
use serde::{Deserialize, Serialize};

/// A rendered, channel-agnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

fn dates_or(payload: &NotificationPayload, fallback: &str) -> String {
    payload
        .dates
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

/// Renders a template with the given payload.
pub fn render(template: TemplateKind, payload: &NotificationPayload) -> RenderedMessage {
    match template {
        TemplateKind::BookingRequest => {
            let property = payload
                .property_name
                .clone()
                .unwrap_or_else(|| "your property".to_string());
            let dates = dates_or(payload, "the requested dates");
            let amount = payload
                .amount
                .map(|amount| format!(" at {amount}"))
                .unwrap_or_default();
            RenderedMessage {
                subject: "New booking request".to_string(),
                body: format!(
                    "You have a new booking request for {property} ({dates}){amount}. \
                     Please approve or reject within 15 minutes or the request expires."
                ),
            }
        }
        TemplateKind::BookingApproved => {
            let dates = dates_or(payload, "your dates");
            let amount = payload
                .amount
                .map(|amount| format!(" of {amount}"))
                .unwrap_or_default();
            RenderedMessage {
                subject: "Booking approved".to_string(),
                body: format!(
                    "The owner approved your request for {dates}. \
                     We are processing your payment{amount} now."
                ),
            }
        }
        TemplateKind::BookingRejected => {
            let dates = dates_or(payload, "your dates");
            let reason = payload
                .reason
                .clone()
                .map(|reason| format!(" Reason: {reason}."))
                .unwrap_or_default();
            RenderedMessage {
                subject: "Booking request declined".to_string(),
                body: format!(
                    "The owner declined your request for {dates}.{reason} \
                     The dates have been released."
                ),
            }
        }
        TemplateKind::PaymentFailed => {
            let dates = dates_or(payload, "your booking");
            let reason = payload
                .reason
                .clone()
                .unwrap_or_else(|| "payment_error".to_string());
            RenderedMessage {
                subject: "Payment failed".to_string(),
                body: format!(
                    "We could not complete the payment for {dates} ({reason}). \
                     The dates have been released; you can request them again."
                ),
            }
        }
        TemplateKind::BookingConfirmed => {
            let dates = dates_or(payload, "your booking");
            let amount = payload
                .amount
                .map(|amount| format!("Payment of {amount} received. "))
                .unwrap_or_default();
            RenderedMessage {
                subject: "Booking confirmed".to_string(),
                body: format!("{amount}Your booking for {dates} is confirmed."),
            }
        }
        TemplateKind::BookingExpired => {
            let dates = dates_or(payload, "your request");
            RenderedMessage {
                subject: "Booking request expired".to_string(),
                body: format!(
                    "The owner did not respond to your request for {dates} in time. \
                     The dates have been released; you can request them again."
                ),
            }
        }
        TemplateKind::BookingCancelled => {
            let dates = dates_or(payload, "your booking");
            RenderedMessage {
                subject: "Booking cancelled".to_string(),
                body: format!("Your booking for {dates} has been cancelled."),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ReservationId;
    use domain::Money;

    #[test]
    fn test_booking_request_includes_property_and_amount() {
        let payload = NotificationPayload::for_reservation(ReservationId::new())
            .property_name("Seaside Loft")
            .dates("2025-06-01 09:00 to 17:00")
            .amount(Money::from_cents(12_345));

        let message = render(TemplateKind::BookingRequest, &payload);
        assert!(message.body.contains("Seaside Loft"));
        assert!(message.body.contains("$123.45"));
        assert!(message.body.contains("15 minutes"));
    }

    #[test]
    fn test_payment_failed_carries_the_reason() {
        let payload = NotificationPayload::for_reservation(ReservationId::new())
            .reason("capture_failed");

        let message = render(TemplateKind::PaymentFailed, &payload);
        assert!(message.body.contains("capture_failed"));
        assert!(message.body.contains("released"));
    }

    #[test]
    fn test_missing_fields_fall_back_to_generic_wording() {
        let message = render(TemplateKind::BookingRejected, &NotificationPayload::default());
        assert!(message.body.contains("your dates"));
        assert!(!message.body.contains("Reason:"));
    }
}
