//! Payment authority gateway trait, HTTP client, and in-memory
//! implementation.
//!
//! Payment is two-phase: authorize a hold on the payer's funds, then
//! capture it once the owner has approved. A decline at either phase is
//! a final answer for that attempt; the saga records it and fails the
//! reservation rather than retrying.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{ReservationId, UserId};
use domain::Money;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::GatewayError;

/// A successful authorization hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    /// The authority's id for the hold, needed to capture it.
    pub authorization_id: String,
    /// The merchant reference sent with the request, stored on the
    /// reservation for later reconciliation.
    pub reference: String,
    /// The raw authority response, persisted alongside the payment
    /// attempt.
    pub raw: serde_json::Value,
}

/// A successful capture of an authorized amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReceipt {
    pub transaction_id: String,
    pub raw: serde_json::Value,
}

/// Operations against the external payment authority.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Places a hold for `amount` on the payer's funds.
    async fn authorize(
        &self,
        reservation: ReservationId,
        payer: UserId,
        amount: Money,
    ) -> Result<Authorization, GatewayError>;

    /// Captures a previously authorized hold.
    async fn capture(
        &self,
        authorization: &Authorization,
        amount: Money,
    ) -> Result<CaptureReceipt, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    next_id: u32,
    authorizations: Vec<String>,
    captures: Vec<String>,
    decline_on_authorize: bool,
    decline_on_capture: bool,
    fail_on_authorize: bool,
    fail_on_capture: bool,
}

/// In-memory payment authority for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next authorize call come back declined.
    pub fn set_decline_on_authorize(&self, decline: bool) {
        self.state.write().unwrap().decline_on_authorize = decline;
    }

    /// Makes the next capture call come back declined.
    pub fn set_decline_on_capture(&self, decline: bool) {
        self.state.write().unwrap().decline_on_capture = decline;
    }

    /// Makes authorize calls fail as if the authority were down.
    pub fn set_fail_on_authorize(&self, fail: bool) {
        self.state.write().unwrap().fail_on_authorize = fail;
    }

    /// Makes capture calls fail as if the authority were down.
    pub fn set_fail_on_capture(&self, fail: bool) {
        self.state.write().unwrap().fail_on_capture = fail;
    }

    /// Returns how many holds were authorized.
    pub fn authorize_count(&self) -> usize {
        self.state.read().unwrap().authorizations.len()
    }

    /// Returns how many holds were captured.
    pub fn capture_count(&self) -> usize {
        self.state.read().unwrap().captures.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(
        &self,
        reservation: ReservationId,
        _payer: UserId,
        amount: Money,
    ) -> Result<Authorization, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_authorize {
            return Err(GatewayError::Unavailable(
                "payment authority down".to_string(),
            ));
        }
        if state.decline_on_authorize {
            return Err(GatewayError::Declined("insufficient funds".to_string()));
        }

        state.next_id += 1;
        let authorization_id = format!("AUTH-{:04}", state.next_id);
        state.authorizations.push(authorization_id.clone());

        Ok(Authorization {
            authorization_id: authorization_id.clone(),
            reference: format!("resv-{reservation}"),
            raw: json!({
                "authorization_id": authorization_id,
                "amount_cents": amount.cents(),
                "response_code": "02000",
            }),
        })
    }

    async fn capture(
        &self,
        authorization: &Authorization,
        amount: Money,
    ) -> Result<CaptureReceipt, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_capture {
            return Err(GatewayError::Unavailable(
                "payment authority down".to_string(),
            ));
        }
        if state.decline_on_capture {
            return Err(GatewayError::Declined("capture refused".to_string()));
        }

        state.next_id += 1;
        let transaction_id = format!("TXN-{:04}", state.next_id);
        state.captures.push(transaction_id.clone());

        Ok(CaptureReceipt {
            transaction_id: transaction_id.clone(),
            raw: json!({
                "transaction_id": transaction_id,
                "authorization_id": authorization.authorization_id,
                "amount_cents": amount.cents(),
                "response_code": "04000",
            }),
        })
    }
}

#[derive(Debug, Serialize)]
struct AuthorizeRequest<'a> {
    command: &'static str,
    merchant_reference: &'a str,
    customer_id: UserId,
    amount_cents: i64,
}

#[derive(Debug, Serialize)]
struct CaptureRequest<'a> {
    command: &'static str,
    authorization_id: &'a str,
    amount_cents: i64,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    authorization_id: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    transaction_id: String,
}

/// HTTP client for the real payment authority.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    /// Creates a client against `base_url`, authenticating with
    /// `api_key` as a bearer token.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn post<T: Serialize>(&self, body: &T) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        let status = response.status();
        let raw = response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        if status.is_success() {
            Ok(raw)
        } else if status.is_client_error() {
            Err(GatewayError::Declined(raw.to_string()))
        } else {
            Err(GatewayError::Unavailable(raw.to_string()))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn authorize(
        &self,
        reservation: ReservationId,
        payer: UserId,
        amount: Money,
    ) -> Result<Authorization, GatewayError> {
        let reference = format!("resv-{reservation}");
        let request = AuthorizeRequest {
            command: "AUTHORIZATION",
            merchant_reference: &reference,
            customer_id: payer,
            amount_cents: amount.cents(),
        };
        let raw = self.post(&request).await?;
        let parsed: AuthorizeResponse = serde_json::from_value(raw.clone())
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        Ok(Authorization {
            authorization_id: parsed.authorization_id,
            reference,
            raw,
        })
    }

    async fn capture(
        &self,
        authorization: &Authorization,
        amount: Money,
    ) -> Result<CaptureReceipt, GatewayError> {
        let request = CaptureRequest {
            command: "CAPTURE",
            authorization_id: &authorization.authorization_id,
            amount_cents: amount.cents(),
        };
        let raw = self.post(&request).await?;
        let parsed: CaptureResponse = serde_json::from_value(raw.clone())
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        Ok(CaptureReceipt {
            transaction_id: parsed.transaction_id,
            raw,
        })
    }
}
