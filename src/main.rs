use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod events;
mod matching;
mod metrics;
mod models;
mod risk;
mod storage;
mod webhooks;

use crate::config::AppConfig;
use crate::events::EventBus;
use crate::matching::{MatchingEngine, MatchingService};
use crate::risk::RiskOrchestrator;
use crate::storage::{InMemoryStorage, StorageGateway};
use crate::webhooks::{DeliveryWorker, WebhookNotifier, WebhookQueue};

pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn StorageGateway>,
    pub event_bus: EventBus,
    pub risk: Arc<RiskOrchestrator>,
    pub matching_engine: Arc<MatchingEngine>,
    pub matching_service: Arc<MatchingService>,
    pub webhook_queue: Arc<WebhookQueue>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trade_desk_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting trade-desk-core v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    let metrics_handle = crate::metrics::init_metrics();

    // TODO: swap InMemoryStorage for a Postgres/Redis-backed StorageGateway
    // once a production persistence driver lands behind this trait.
    let storage: Arc<dyn StorageGateway> = Arc::new(InMemoryStorage::new());
    tracing::info!("Storage gateway initialized (in-memory reference implementation)");

    let event_bus = EventBus::default();

    let risk = Arc::new(RiskOrchestrator::new(config.risk.clone(), None));
    tracing::info!(
        "Risk orchestrator initialized (rule_weight={}, ml_weight={})",
        config.risk.rule_weight, config.risk.ml_weight
    );

    let matching_engine = Arc::new(MatchingEngine::new(
        storage.clone(),
        config.matching.clone(),
        risk.clone(),
        event_bus.clone(),
    ));
    let matching_service = MatchingService::new(matching_engine.clone(), storage.clone(), config.matching.clone());
    matching_service.subscribe_events(event_bus.subscribe());
    matching_service.start();
    tracing::info!("Matching service started and subscribed to the domain event bus");

    let webhook_queue = Arc::new(WebhookQueue::new(storage.clone(), config.webhooks.clone()));
    let delivery_worker = Arc::new(DeliveryWorker::new(webhook_queue.clone(), storage.clone(), config.webhooks.clone()));

    // No tenant-registration endpoint exists yet, so there is no list of
    // known tenants to spawn delivery loops for at startup; the notifier
    // starts a tenant's loop itself the first time it enqueues a delivery
    // for that tenant.
    let webhook_notifier = WebhookNotifier::new(webhook_queue.clone(), storage.clone(), delivery_worker);
    webhook_notifier.subscribe_events(event_bus.subscribe());
    tracing::info!("Webhook notifier subscribed to the domain event bus");

    let state = Arc::new(AppState {
        config: config.clone(),
        storage,
        event_bus,
        risk,
        matching_engine,
        matching_service,
        webhook_queue,
        metrics_handle,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics_handle.render()
}

/// Records request count/duration/in-flight gauges for the operability
/// routes, mirroring the request-scoped instrumentation convention this
/// codebase already used for its own (now out-of-scope) REST surface.
async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    crate::metrics::set_http_requests_in_flight(1);
    let response = next.run(request).await;
    crate::metrics::set_http_requests_in_flight(-1);

    let status = response.status().as_u16();
    crate::metrics::record_http_request(&method, &path, status, start.elapsed().as_secs_f64());
    response
}
