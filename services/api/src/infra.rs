use crate::cli::ArtifactArgs;
use loan_guidance::config::ArtifactConfig;
use loan_guidance::workflows::guidance::{
    load_artifact, ArtifactStore, Clock, FileSystemArtifactStore, LoanGuidanceService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Apply CLI overrides on top of the environment-derived artifact location.
pub(crate) fn resolve_artifact(mut config: ArtifactConfig, args: ArtifactArgs) -> ArtifactConfig {
    if let Some(root) = args.artifact_root {
        config.root = root;
    }
    if let Some(key) = args.artifact_key {
        config.key = key;
    }
    config
}

pub(crate) fn artifact_store(config: &ArtifactConfig) -> FileSystemArtifactStore {
    FileSystemArtifactStore::new(config.root.clone())
}

/// Build the inference service. A missing or invalid artifact leaves the service
/// answering `ModelUnavailable` rather than aborting startup.
pub(crate) fn load_service<S: ArtifactStore + ?Sized>(
    store: &S,
    key: &str,
    clock: Arc<dyn Clock>,
) -> LoanGuidanceService {
    let service = match load_artifact(store, key) {
        Ok(artifact) => LoanGuidanceService::new(Arc::new(artifact)),
        Err(err) => {
            warn!(key, error = %err, "model artifact unavailable");
            LoanGuidanceService::unavailable(err.to_string())
        }
    };
    service.with_clock(clock)
}
