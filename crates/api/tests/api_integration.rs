//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{OwnerId, PropertyId, UserId};
use domain::Money;
use metrics_exporter_prometheus::PrometheusHandle;
use notify::Dispatcher;
use saga::{InMemoryInventoryGateway, InMemoryPaymentGateway, PropertyDescriptor};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestContext {
    app: Router,
    property: PropertyDescriptor,
    inventory: InMemoryInventoryGateway,
    payment: InMemoryPaymentGateway,
}

async fn setup() -> TestContext {
    let inventory = InMemoryInventoryGateway::new();
    let property = PropertyDescriptor {
        id: PropertyId::new(),
        owner_id: OwnerId::new(),
        name: "Seaside Loft".to_string(),
        price_per_shift: Money::from_cents(10_000),
        pricing: Default::default(),
    };
    inventory.add_property(property.clone());
    let payment = InMemoryPaymentGateway::new();

    let state: Arc<
        api::routes::reservations::AppState<
            InMemoryStore,
            InMemoryInventoryGateway,
            InMemoryPaymentGateway,
            Dispatcher,
        >,
    > = api::create_state(
        InMemoryStore::new(),
        inventory.clone(),
        payment.clone(),
        Duration::from_secs(900),
    )
    .await;
    let app = api::create_app(state, get_metrics_handle());

    TestContext {
        app,
        property,
        inventory,
        payment,
    }
}

fn create_body(property_id: PropertyId, user_id: UserId) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id.to_string(),
        "property_id": property_id.to_string(),
        "shift_id": "day",
        "start_date": "2025-06-01T09:00:00Z",
        "end_date": "2025-06-01T17:00:00Z",
    })
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(json) => builder
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let ctx = setup().await;
    let (status, json) = request_json(&ctx.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let ctx = setup().await;
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_reservation() {
    let ctx = setup().await;
    let (status, json) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, UserId::new())),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["payment_status"], "none");
    assert_eq!(json["quoted_amount_cents"], 10_000);
    assert_eq!(ctx.inventory.hold_count(), 1);

    let id = json["id"].as_str().unwrap();
    let (status, fetched) =
        request_json(&ctx.app, "GET", &format!("/reservations/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], json["id"]);
}

#[tokio::test]
async fn test_create_rejects_inverted_dates() {
    let ctx = setup().await;
    let mut body = create_body(ctx.property.id, UserId::new());
    body["end_date"] = serde_json::json!("2025-06-01T08:00:00Z");

    let (status, _) = request_json(&ctx.app, "POST", "/reservations", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_unknown_property_is_404() {
    let ctx = setup().await;
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(PropertyId::new(), UserId::new())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_overlapping_request_is_409() {
    let ctx = setup().await;
    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, UserId::new())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, UserId::new())),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_approval_pays_and_second_response_conflicts() {
    let ctx = setup().await;
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, UserId::new())),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, resolved) = request_json(
        &ctx.app,
        "POST",
        &format!("/reservations/{id}/respond"),
        Some(serde_json::json!({ "response": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "paid");
    assert_eq!(resolved["payment_status"], "captured");
    assert_eq!(ctx.payment.capture_count(), 1);
    assert_eq!(ctx.inventory.confirmed_count(), 1);

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/reservations/{id}/respond"),
        Some(serde_json::json!({ "response": "rejected" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_rejection_with_reason() {
    let ctx = setup().await;
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, UserId::new())),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, resolved) = request_json(
        &ctx.app,
        "POST",
        &format!("/reservations/{id}/respond"),
        Some(serde_json::json!({ "response": "rejected", "reason": "unavailable" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "rejected");
    assert_eq!(resolved["owner_response"], "rejected");
    assert_eq!(ctx.inventory.hold_count(), 0);
}

#[tokio::test]
async fn test_invalid_response_value_is_400() {
    let ctx = setup().await;
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, UserId::new())),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/reservations/{id}/respond"),
        Some(serde_json::json!({ "response": "maybe" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_requires_the_holder() {
    let ctx = setup().await;
    let user = UserId::new();
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, user)),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/reservations/{id}/cancel"),
        Some(serde_json::json!({ "user_id": UserId::new().to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = request_json(
        &ctx.app,
        "POST",
        &format!("/reservations/{id}/cancel"),
        Some(serde_json::json!({ "user_id": user.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
}

#[tokio::test]
async fn test_payment_history_after_failed_attempt() {
    let ctx = setup().await;
    ctx.payment.set_decline_on_authorize(true);

    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/reservations",
        Some(create_body(ctx.property.id, UserId::new())),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, resolved) = request_json(
        &ctx.app,
        "POST",
        &format!("/reservations/{id}/respond"),
        Some(serde_json::json!({ "response": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "failed");
    assert_eq!(resolved["payment_attempts"], 1);

    let (status, payments) = request_json(
        &ctx.app,
        "GET",
        &format!("/reservations/{id}/payments"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let attempts = payments.as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["status"], "failed");
    assert_eq!(attempts[0]["attempt_number"], 1);
}

#[tokio::test]
async fn test_unknown_reservation_is_404() {
    let ctx = setup().await;
    let id = UserId::new();

    let (status, _) = request_json(&ctx.app, "GET", &format!("/reservations/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request_json(
        &ctx.app,
        "GET",
        &format!("/reservations/{id}/payments"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
