use crate::cli::ServeArgs;
use crate::infra::{artifact_store, load_service, resolve_artifact, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_guidance::config::AppConfig;
use loan_guidance::error::AppError;
use loan_guidance::telemetry;
use loan_guidance::workflows::guidance::SystemClock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    let location = resolve_artifact(config.artifacts.clone(), args.artifact);

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = artifact_store(&location);
    let service = Arc::new(load_service(&store, &location.key, Arc::new(SystemClock)));
    let model_ready = service.is_ready();
    if !model_ready {
        warn!(root = %location.root.display(), key = %location.key, "serving without a model");
    }

    let app = with_operational_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(model_ready, Ordering::Release);

    info!(?config.environment, %addr, model_ready, "loan guidance service listening");

    axum::serve(listener, app).await?;
    Ok(())
}
