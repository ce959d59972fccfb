//! HTTP API server for the reservation saga service.
//!
//! Exposes reservation creation, the owner decision endpoint, guest
//! cancellation, payment history, and a live status-event stream, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use notify::{ChannelKind, Dispatcher, TracingChannel};
use saga::{
    InMemoryInventoryGateway, InMemoryPaymentGateway, InventoryGateway, PaymentGateway,
    RecoveryDisposition, ReservationSaga, StatusPublisher, TokioTimeoutScheduler,
};
use store::{InMemoryStore, Store};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::reservations::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, I, P, N>(
    state: Arc<AppState<S, I, P, N>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + 'static,
    N: saga::NotificationSink + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/reservations", post(routes::reservations::create::<S, I, P, N>))
        .route("/reservations/{id}", get(routes::reservations::get::<S, I, P, N>))
        .route(
            "/reservations/{id}/respond",
            post(routes::reservations::respond::<S, I, P, N>),
        )
        .route(
            "/reservations/{id}/cancel",
            post(routes::reservations::cancel::<S, I, P, N>),
        )
        .route(
            "/reservations/{id}/payments",
            get(routes::reservations::payments::<S, I, P, N>),
        )
        .route(
            "/reservations/{id}/events",
            get(routes::reservations::events::<S, I, P, N>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the saga over the given store and gateways: notification
/// dispatcher with its worker, timeout scheduler with its expiry loop,
/// and the startup sweep for payments interrupted mid-flight.
pub async fn create_state<S, I, P>(
    store: S,
    inventory: I,
    payment: P,
    decision_window: Duration,
) -> Arc<AppState<S, I, P, Dispatcher>>
where
    S: Store + Clone + 'static,
    I: InventoryGateway + Clone + 'static,
    P: PaymentGateway + Clone + 'static,
{
    let dispatcher = Dispatcher::new(vec![
        Arc::new(TracingChannel::new(ChannelKind::Email)),
        Arc::new(TracingChannel::new(ChannelKind::Sms)),
        Arc::new(TracingChannel::new(ChannelKind::WhatsApp)),
    ]);
    dispatcher.spawn_worker();

    let (scheduler, mut fired) = TokioTimeoutScheduler::new();
    let saga = ReservationSaga::with_decision_window(
        store.clone(),
        inventory,
        payment,
        dispatcher,
        Arc::new(scheduler),
        StatusPublisher::default(),
        decision_window,
    );

    // Drive expiry from the scheduler's fired timeouts.
    let expiry_saga = saga.clone();
    tokio::spawn(async move {
        while let Some(id) = fired.recv().await {
            if let Err(err) = expiry_saga.expire(id).await {
                tracing::warn!(reservation = %id, error = %err, "expiry trigger failed");
            }
        }
    });

    match saga::sweep_pre_authorized(&store).await {
        Ok(stalled) => {
            for payment in stalled {
                match payment.disposition {
                    RecoveryDisposition::CaptureRetry => tracing::info!(
                        reservation = %payment.reservation.id,
                        "stalled pre-authorized payment, capture can be retried"
                    ),
                    RecoveryDisposition::ManualReview => tracing::warn!(
                        reservation = %payment.reservation.id,
                        status = %payment.reservation.status,
                        "stalled pre-authorized payment needs manual review"
                    ),
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "recovery sweep failed"),
    }

    Arc::new(AppState { saga, store })
}

/// Creates application state on the in-memory store and gateways, with
/// a demo property registered so the API is usable out of the box.
pub async fn create_default_state(
    decision_window: Duration,
) -> Arc<AppState<InMemoryStore, InMemoryInventoryGateway, InMemoryPaymentGateway, Dispatcher>> {
    let inventory = InMemoryInventoryGateway::new();
    let property = saga::gateways::inventory::test_property(
        common::OwnerId::new(),
        domain::Money::from_cents(10_000),
    );
    tracing::info!(property = %property.id, owner = %property.owner_id, "registered demo property");
    inventory.add_property(property);

    create_state(
        InMemoryStore::new(),
        inventory,
        InMemoryPaymentGateway::new(),
        decision_window,
    )
    .await
}
