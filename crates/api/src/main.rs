//! API server entry point.

use api::config::Config;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{HttpInventoryGateway, HttpPaymentGateway, InMemoryPaymentGateway};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Builds the router over `store`, picking HTTP or in-memory gateways
/// from the configuration.
async fn app_for_store<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Router {
    match (&config.inventory_url, &config.payment_url) {
        (Some(inventory_url), Some(payment_url)) => {
            let inventory =
                HttpInventoryGateway::new(inventory_url.clone(), config.gateway_api_key.clone());
            let payment =
                HttpPaymentGateway::new(payment_url.clone(), config.gateway_api_key.clone());
            let state =
                api::create_state(store, inventory, payment, config.decision_window()).await;
            api::create_app(state, metrics_handle)
        }
        _ => {
            tracing::info!("INVENTORY_URL/PAYMENT_URL not set, using in-memory gateways");
            let inventory = saga::InMemoryInventoryGateway::new();
            let property = saga::gateways::inventory::test_property(
                common::OwnerId::new(),
                domain::Money::from_cents(10_000),
            );
            tracing::info!(property = %property.id, "registered demo property");
            inventory.add_property(property);
            let state = api::create_state(
                store,
                inventory,
                InMemoryPaymentGateway::new(),
                config.decision_window(),
            )
            .await;
            api::create_app(state, metrics_handle)
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build the application over the configured store
    let app = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            app_for_store(store, &config, metrics_handle).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            app_for_store(InMemoryStore::new(), &config, metrics_handle).await
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
