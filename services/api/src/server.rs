use crate::cli::ServeArgs;
use crate::infra::{seed_demo_data, AppState, LoggingNotifications, DEMO_HOURLY_RATE};
use crate::routes::with_engagement_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use talent_ledger::config::AppConfig;
use talent_ledger::engagement::memory::InMemoryBackend;
use talent_ledger::engagement::EngagementEngine;
use talent_ledger::error::AppError;
use talent_ledger::telemetry;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.no_seed {
        config.server.seed_demo = false;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backend = InMemoryBackend::new();
    if config.server.seed_demo {
        seed_demo_data(&backend, DEMO_HOURLY_RATE).await;
    }
    let notifications = Arc::new(LoggingNotifications::spawn());
    let engine = Arc::new(EngagementEngine::new(
        backend.ports_with_notifications(notifications),
        &config.engine,
    ));

    let app = with_engagement_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "talent ledger api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
