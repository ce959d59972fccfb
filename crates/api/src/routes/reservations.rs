//! Reservation endpoints and saga triggers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use common::{PropertyId, ReservationId, ShiftId, UserId};
use domain::{DateRange, NewReservation, Reservation};
use futures_util::Stream;
use saga::{
    InventoryGateway, NotificationSink, OwnerDecision, PaymentGateway, Resolution,
    ReservationSaga,
};
use serde::{Deserialize, Serialize};
use store::Store;
use tokio::sync::broadcast;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, I, P, N> {
    pub saga: ReservationSaga<S, I, P, N>,
    pub store: S,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateReservationRequest {
    pub user_id: String,
    pub property_id: String,
    pub shift_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    /// `"approved"` or `"rejected"`.
    pub response: String,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub user_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct ReservationResponse {
    pub id: String,
    pub user_id: String,
    pub property_id: String,
    pub shift_id: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub payment_status: String,
    pub payment_attempts: u32,
    pub quoted_amount_cents: i64,
    pub payment_reference: Option<String>,
    pub owner_response: Option<String>,
    pub created_at: String,
}

impl From<&Reservation> for ReservationResponse {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id.to_string(),
            user_id: reservation.user_id.to_string(),
            property_id: reservation.property_id.to_string(),
            shift_id: reservation.shift_id.to_string(),
            start_date: reservation.dates.start().to_rfc3339(),
            end_date: reservation.dates.end().to_rfc3339(),
            status: reservation.status.to_string(),
            payment_status: reservation.payment_status.to_string(),
            payment_attempts: reservation.payment_attempts,
            quoted_amount_cents: reservation.quoted_amount.cents(),
            payment_reference: reservation.payment_reference.clone(),
            owner_response: reservation
                .owner_response
                .map(|response| response.to_string()),
            created_at: reservation.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct PaymentAttemptResponse {
    pub id: String,
    pub status: String,
    pub amount_cents: i64,
    pub attempt_number: u32,
    pub created_at: String,
}

// -- Handlers --

/// POST /reservations — request a booking; the saga takes the hold and
/// starts the owner decision window.
#[tracing::instrument(skip(state, req))]
pub async fn create<S, I, P, N>(
    State(state): State<Arc<AppState<S, I, P, N>>>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(axum::http::StatusCode, Json<ReservationResponse>), ApiError>
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + 'static,
    N: NotificationSink + 'static,
{
    let dates = DateRange::new(req.start_date, req.end_date)
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let input = NewReservation {
        user_id: parse_id::<UserId>(&req.user_id, "user_id")?,
        property_id: parse_id::<PropertyId>(&req.property_id, "property_id")?,
        shift_id: ShiftId::new(req.shift_id),
        dates,
    };

    let reservation = state.saga.create(input).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(ReservationResponse::from(&reservation)),
    ))
}

/// GET /reservations/:id — load a reservation by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S, I, P, N>(
    State(state): State<Arc<AppState<S, I, P, N>>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError>
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + 'static,
    N: NotificationSink + 'static,
{
    let id = parse_id::<ReservationId>(&id, "reservation id")?;
    let reservation = state.saga.reservation(id).await?;
    Ok(Json(ReservationResponse::from(&reservation)))
}

/// POST /reservations/:id/respond — apply the owner's decision.
///
/// Returns 409 if the reservation was already resolved by a timeout,
/// a cancellation, or an earlier decision.
#[tracing::instrument(skip(state, req))]
pub async fn respond<S, I, P, N>(
    State(state): State<Arc<AppState<S, I, P, N>>>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<ReservationResponse>, ApiError>
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + 'static,
    N: NotificationSink + 'static,
{
    let id = parse_id::<ReservationId>(&id, "reservation id")?;
    let decision = match req.response.as_str() {
        "approved" => OwnerDecision::Approve,
        "rejected" => OwnerDecision::Reject { reason: req.reason },
        other => {
            return Err(ApiError::BadRequest(format!(
                "response must be \"approved\" or \"rejected\", got \"{other}\""
            )));
        }
    };

    match state.saga.resolve(id, decision).await? {
        Resolution::Applied(reservation) => Ok(Json(ReservationResponse::from(&reservation))),
        Resolution::Superseded => Err(ApiError::Conflict(format!(
            "Reservation {id} was already resolved"
        ))),
    }
}

/// POST /reservations/:id/cancel — withdraw a request on the guest's
/// behalf.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S, I, P, N>(
    State(state): State<Arc<AppState<S, I, P, N>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<ReservationResponse>, ApiError>
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + 'static,
    N: NotificationSink + 'static,
{
    let id = parse_id::<ReservationId>(&id, "reservation id")?;
    let user = parse_id::<UserId>(&req.user_id, "user_id")?;

    match state.saga.cancel(id, user).await? {
        Resolution::Applied(reservation) => Ok(Json(ReservationResponse::from(&reservation))),
        Resolution::Superseded => Err(ApiError::Conflict(format!(
            "Reservation {id} was already resolved"
        ))),
    }
}

/// GET /reservations/:id/payments — list payment attempts, oldest
/// first.
#[tracing::instrument(skip(state))]
pub async fn payments<S, I, P, N>(
    State(state): State<Arc<AppState<S, I, P, N>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentAttemptResponse>>, ApiError>
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + 'static,
    N: NotificationSink + 'static,
{
    let id = parse_id::<ReservationId>(&id, "reservation id")?;
    // 404 for unknown reservations rather than an empty list.
    state.saga.reservation(id).await?;

    let records = state.store.payments_for(id).await?;
    let responses = records
        .iter()
        .map(|record| PaymentAttemptResponse {
            id: record.id.to_string(),
            status: record.status.as_str().to_string(),
            amount_cents: record.amount.cents(),
            attempt_number: record.attempt_number,
            created_at: record.created_at.to_rfc3339(),
        })
        .collect();
    Ok(Json(responses))
}

/// GET /reservations/:id/events — live status changes as
/// server-sent events.
#[tracing::instrument(skip(state))]
pub async fn events<S, I, P, N>(
    State(state): State<Arc<AppState<S, I, P, N>>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + 'static,
    N: NotificationSink + 'static,
{
    let id = parse_id::<ReservationId>(&id, "reservation id")?;
    state.saga.reservation(id).await?;

    let rx = state.saga.subscribe();
    let stream = futures_util::stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.reservation_id == id => {
                    let sse = Event::default().event("status").json_data(&event).ok()?;
                    return Some((Ok::<_, Infallible>(sse), rx));
                }
                // Not ours, or we fell behind; keep listening.
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn parse_id<T: From<uuid::Uuid>>(raw: &str, field: &str) -> Result<T, ApiError> {
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|err| ApiError::BadRequest(format!("Invalid {field}: {err}")))?;
    Ok(T::from(uuid))
}
