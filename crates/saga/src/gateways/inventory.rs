//! Inventory authority gateway trait, HTTP client, and in-memory
//! implementation.
//!
//! The inventory authority owns property metadata and the authoritative
//! hold on a property/date-range. The saga never mutates availability
//! directly; it asks for a lock keyed by the reservation token and later
//! confirms or releases it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OwnerId, PropertyId, ReservationId, ReservationToken, ShiftId};
use domain::{DateRange, Money};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// How long the authority keeps an unconfirmed hold before expiring it
/// on its own side.
const HOLD_TTL_MINUTES: i64 = 15;

/// Property metadata as the inventory authority reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub id: PropertyId,
    pub owner_id: OwnerId,
    pub name: String,
    /// Fallback price when a shift has no specific entry.
    pub price_per_shift: Money,
    /// Per-shift price overrides keyed by shift id.
    #[serde(default)]
    pub pricing: HashMap<String, Money>,
}

impl PropertyDescriptor {
    /// Returns the price for a shift, falling back to the base price.
    pub fn price_for(&self, shift: &ShiftId) -> Money {
        self.pricing
            .get(shift.as_str())
            .copied()
            .unwrap_or(self.price_per_shift)
    }
}

/// Answer to an availability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuote {
    pub available: bool,
    /// The price quoted for these dates and shift. Captured at creation
    /// time and carried on the reservation thereafter.
    pub price: Money,
}

/// A granted hold on the authority's side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockGrant {
    /// When the authority will expire the hold if never confirmed.
    pub expires_at: DateTime<Utc>,
}

/// Operations against the external inventory authority.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Fetches property metadata, `None` if the property is unknown.
    async fn property(&self, id: PropertyId)
        -> Result<Option<PropertyDescriptor>, GatewayError>;

    /// Asks whether the property is free for the dates and shift, and
    /// at what price.
    async fn check_availability(
        &self,
        property: PropertyId,
        dates: &DateRange,
        shift: &ShiftId,
    ) -> Result<AvailabilityQuote, GatewayError>;

    /// Takes an exclusive hold keyed by `token`.
    ///
    /// `Declined` means someone else holds an overlapping range; the
    /// caller lost the race and must not write any state.
    async fn lock(
        &self,
        property: PropertyId,
        dates: &DateRange,
        shift: &ShiftId,
        token: ReservationToken,
    ) -> Result<LockGrant, GatewayError>;

    /// Releases the hold keyed by `token`. Releasing an unknown or
    /// already-released token is not an error on the authority's side.
    async fn release(&self, token: ReservationToken) -> Result<(), GatewayError>;

    /// Converts the hold into a confirmed booking after payment.
    async fn confirm(
        &self,
        token: ReservationToken,
        reservation_id: ReservationId,
    ) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone)]
struct Hold {
    property: PropertyId,
    dates: DateRange,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    properties: HashMap<PropertyId, PropertyDescriptor>,
    holds: HashMap<ReservationToken, Hold>,
    confirmed: HashMap<ReservationToken, ReservationId>,
    unavailable: bool,
    fail_on_availability: bool,
    fail_on_lock: bool,
    fail_on_release: bool,
    fail_on_confirm: bool,
}

/// In-memory inventory authority for testing.
///
/// Enforces the same exclusivity the real authority does: a second lock
/// over an overlapping active hold is declined.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryGateway {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryGateway {
    /// Creates a new in-memory inventory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a property the gateway will answer for.
    pub fn add_property(&self, property: PropertyDescriptor) {
        self.state
            .write()
            .unwrap()
            .properties
            .insert(property.id, property);
    }

    /// Makes every availability check answer "not available".
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Makes availability checks fail as if the authority were down.
    pub fn set_fail_on_availability(&self, fail: bool) {
        self.state.write().unwrap().fail_on_availability = fail;
    }

    /// Makes lock calls fail as if the authority were down.
    pub fn set_fail_on_lock(&self, fail: bool) {
        self.state.write().unwrap().fail_on_lock = fail;
    }

    /// Makes release calls fail as if the authority were down.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.state.write().unwrap().fail_on_release = fail;
    }

    /// Makes confirm calls fail as if the authority were down.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.state.write().unwrap().fail_on_confirm = fail;
    }

    /// Returns the number of active holds.
    pub fn hold_count(&self) -> usize {
        self.state.read().unwrap().holds.len()
    }

    /// Returns true if `token` currently holds anything.
    pub fn has_hold(&self, token: ReservationToken) -> bool {
        self.state.read().unwrap().holds.contains_key(&token)
    }

    /// Returns the number of confirmed bookings.
    pub fn confirmed_count(&self) -> usize {
        self.state.read().unwrap().confirmed.len()
    }
}

#[async_trait]
impl InventoryGateway for InMemoryInventoryGateway {
    async fn property(
        &self,
        id: PropertyId,
    ) -> Result<Option<PropertyDescriptor>, GatewayError> {
        Ok(self.state.read().unwrap().properties.get(&id).cloned())
    }

    async fn check_availability(
        &self,
        property: PropertyId,
        dates: &DateRange,
        shift: &ShiftId,
    ) -> Result<AvailabilityQuote, GatewayError> {
        let state = self.state.read().unwrap();

        if state.fail_on_availability {
            return Err(GatewayError::Unavailable(
                "inventory authority down".to_string(),
            ));
        }

        let descriptor = state
            .properties
            .get(&property)
            .ok_or_else(|| GatewayError::Declined(format!("unknown property {property}")))?;

        let held = state
            .holds
            .values()
            .any(|hold| hold.property == property && hold.dates.overlaps(dates));

        Ok(AvailabilityQuote {
            available: !state.unavailable && !held,
            price: descriptor.price_for(shift),
        })
    }

    async fn lock(
        &self,
        property: PropertyId,
        dates: &DateRange,
        _shift: &ShiftId,
        token: ReservationToken,
    ) -> Result<LockGrant, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_lock {
            return Err(GatewayError::Unavailable(
                "inventory authority down".to_string(),
            ));
        }

        let conflict = state
            .holds
            .values()
            .any(|hold| hold.property == property && hold.dates.overlaps(dates));
        if state.unavailable || conflict {
            return Err(GatewayError::Declined(
                "dates already held for this property".to_string(),
            ));
        }

        state.holds.insert(
            token,
            Hold {
                property,
                dates: *dates,
            },
        );

        Ok(LockGrant {
            expires_at: Utc::now() + chrono::Duration::minutes(HOLD_TTL_MINUTES),
        })
    }

    async fn release(&self, token: ReservationToken) -> Result<(), GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_release {
            return Err(GatewayError::Unavailable(
                "inventory authority down".to_string(),
            ));
        }

        state.holds.remove(&token);
        Ok(())
    }

    async fn confirm(
        &self,
        token: ReservationToken,
        reservation_id: ReservationId,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_confirm {
            return Err(GatewayError::Unavailable(
                "inventory authority down".to_string(),
            ));
        }

        if !state.holds.contains_key(&token) {
            return Err(GatewayError::Declined(format!("no hold for token {token}")));
        }

        state.confirmed.insert(token, reservation_id);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct AvailabilityRequest<'a> {
    property_id: PropertyId,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    shift_id: &'a str,
}

#[derive(Debug, Serialize)]
struct LockRequest<'a> {
    property_id: PropertyId,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    shift_id: &'a str,
    reservation_token: ReservationToken,
}

#[derive(Debug, Serialize)]
struct ReleaseRequest {
    reservation_token: ReservationToken,
}

#[derive(Debug, Serialize)]
struct ConfirmRequest {
    reservation_token: ReservationToken,
    reservation_id: ReservationId,
}

#[derive(Debug, Deserialize)]
struct LockGrantResponse {
    expires_at: DateTime<Utc>,
}

/// HTTP client for the real inventory authority.
#[derive(Debug, Clone)]
pub struct HttpInventoryGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpInventoryGateway {
    /// Creates a client against `base_url`, authenticating with
    /// `api_key` as a bearer token.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        classify(response).await
    }
}

/// Maps an HTTP status onto the gateway error split: 4xx is an answer
/// (declined), 5xx and transport failures are unavailability.
async fn classify(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        Err(GatewayError::Declined(format!("{status}: {body}")))
    } else {
        Err(GatewayError::Unavailable(format!("{status}: {body}")))
    }
}

#[async_trait]
impl InventoryGateway for HttpInventoryGateway {
    async fn property(
        &self,
        id: PropertyId,
    ) -> Result<Option<PropertyDescriptor>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/properties/{id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = classify(response).await?;
        let descriptor = response
            .json::<PropertyDescriptor>()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        Ok(Some(descriptor))
    }

    async fn check_availability(
        &self,
        property: PropertyId,
        dates: &DateRange,
        shift: &ShiftId,
    ) -> Result<AvailabilityQuote, GatewayError> {
        let request = AvailabilityRequest {
            property_id: property,
            start_date: dates.start(),
            end_date: dates.end(),
            shift_id: shift.as_str(),
        };
        let response = self.post_json("/availability/check", &request).await?;
        response
            .json::<AvailabilityQuote>()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))
    }

    async fn lock(
        &self,
        property: PropertyId,
        dates: &DateRange,
        shift: &ShiftId,
        token: ReservationToken,
    ) -> Result<LockGrant, GatewayError> {
        let request = LockRequest {
            property_id: property,
            start_date: dates.start(),
            end_date: dates.end(),
            shift_id: shift.as_str(),
            reservation_token: token,
        };
        let response = self.post_json("/availability/lock", &request).await?;
        let grant = response
            .json::<LockGrantResponse>()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        Ok(LockGrant {
            expires_at: grant.expires_at,
        })
    }

    async fn release(&self, token: ReservationToken) -> Result<(), GatewayError> {
        let request = ReleaseRequest {
            reservation_token: token,
        };
        self.post_json("/availability/release", &request).await?;
        Ok(())
    }

    async fn confirm(
        &self,
        token: ReservationToken,
        reservation_id: ReservationId,
    ) -> Result<(), GatewayError> {
        let request = ConfirmRequest {
            reservation_token: token,
            reservation_id,
        };
        self.post_json("/availability/confirm", &request).await?;
        Ok(())
    }
}

/// Builds a descriptor with a flat price, for tests.
pub fn test_property(owner_id: OwnerId, price: Money) -> PropertyDescriptor {
    PropertyDescriptor {
        id: PropertyId::new(),
        owner_id,
        name: "Test Property".to_string(),
        price_per_shift: price,
        pricing: HashMap::new(),
    }
}
