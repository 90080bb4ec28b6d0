//! Versioned model bundle and the blob store it is read from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::features::{
    CategoricalEncoder, FeaturePipeline, FeatureScaler, SectorRiskEvaluator, SectorRiskRules,
    BORROWER_TYPE_FIELD, FEATURE_COUNT, FEATURE_NAMES,
};
use super::models::{PaymentPredictor, RiskScorer};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact key `{0}` must be a relative path without `..`")]
    InvalidKey(String),
    #[error("artifact `{0}` not found")]
    NotFound(String),
    #[error("artifact io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("artifact format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("{component} was fitted under `{found}`, artifact expects `{expected}`")]
    FitIdMismatch {
        component: &'static str,
        expected: String,
        found: String,
    },
    #[error("artifact feature order does not match the compiled feature order")]
    FeatureOrder,
    #[error("{component} expects {found} features, pipeline produces {expected}")]
    WidthMismatch {
        component: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{0} is malformed")]
    Malformed(&'static str),
}

/// Encoder state stamped with the run that fitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEncoder {
    pub fit_id: String,
    pub state: CategoricalEncoder,
}

/// Everything inference needs, produced by one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub fit_id: String,
    pub feature_names: Vec<String>,
    pub scaler: FeatureScaler,
    pub encoder: FittedEncoder,
    pub risk_model: RiskScorer,
    pub payment_model: PaymentPredictor,
    #[serde(default)]
    pub sector_rules: SectorRiskRules,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn new(
        fit_id: impl Into<String>,
        scaler: FeatureScaler,
        encoder: CategoricalEncoder,
        risk_model: RiskScorer,
        payment_model: PaymentPredictor,
        sector_rules: SectorRiskRules,
        trained_at: DateTime<Utc>,
    ) -> Self {
        let fit_id = fit_id.into();
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            encoder: FittedEncoder {
                fit_id: fit_id.clone(),
                state: encoder,
            },
            fit_id,
            scaler,
            risk_model,
            payment_model,
            sector_rules,
            trained_at,
        }
    }

    /// Consistency checks applied on every load. A failure here means the bundle must not
    /// be served.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }

        let stamps = [
            ("scaler", &self.scaler.fit_id),
            ("encoder", &self.encoder.fit_id),
            ("risk model", &self.risk_model.fit_id),
            ("payment model", &self.payment_model.fit_id),
        ];
        for (component, found) in stamps {
            if *found != self.fit_id {
                return Err(ArtifactError::FitIdMismatch {
                    component,
                    expected: self.fit_id.clone(),
                    found: found.clone(),
                });
            }
        }

        if self.feature_names.len() != FEATURE_NAMES.len()
            || self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES)
                .any(|(stored, compiled)| stored != compiled)
        {
            return Err(ArtifactError::FeatureOrder);
        }

        let widths = [
            ("scaler", self.scaler.width()),
            ("risk model", self.risk_model.n_features()),
            ("payment model", self.payment_model.n_features()),
        ];
        for (component, found) in widths {
            if found != FEATURE_COUNT {
                return Err(ArtifactError::WidthMismatch {
                    component,
                    expected: FEATURE_COUNT,
                    found,
                });
            }
        }

        if !self.scaler.is_well_formed() {
            return Err(ArtifactError::Malformed("scaler"));
        }
        let encoder = &self.encoder.state;
        if !encoder.is_fitted(BORROWER_TYPE_FIELD) || !encoder.is_well_formed() {
            return Err(ArtifactError::Malformed("encoder"));
        }
        if !self.risk_model.model().is_well_formed() {
            return Err(ArtifactError::Malformed("risk model"));
        }
        if !self.payment_model.model().is_well_formed() {
            return Err(ArtifactError::Malformed("payment model"));
        }
        Ok(())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let artifact: ModelArtifact = serde_json::from_slice(bytes)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ArtifactError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn pipeline(&self) -> FeaturePipeline {
        FeaturePipeline::new(SectorRiskEvaluator::new(self.sector_rules.clone()))
    }
}

/// Blob storage keyed by relative path.
pub trait ArtifactStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Vec<u8>, ArtifactError>;
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError>;
}

pub fn load_artifact<S: ArtifactStore + ?Sized>(
    store: &S,
    key: &str,
) -> Result<ModelArtifact, ArtifactError> {
    let artifact = ModelArtifact::from_slice(&store.read(key)?)?;
    info!(
        key,
        fit_id = %artifact.fit_id,
        trained_at = %artifact.trained_at,
        "model artifact loaded"
    );
    Ok(artifact)
}

pub fn save_artifact<S: ArtifactStore + ?Sized>(
    store: &S,
    key: &str,
    artifact: &ModelArtifact,
) -> Result<(), ArtifactError> {
    artifact.validate()?;
    store.write(key, &artifact.to_vec()?)?;
    info!(key, fit_id = %artifact.fit_id, "model artifact saved");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FileSystemArtifactStore {
    root: PathBuf,
}

impl FileSystemArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(key);
        let safe = !key.trim().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(ArtifactError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ArtifactStore for FileSystemArtifactStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.resolve(key)?;
        fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(key.to_string())
            } else {
                ArtifactError::Io { path, source }
            }
        })
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, bytes).map_err(|source| ArtifactError::Io { path, source })
    }
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl ArtifactStore for InMemoryArtifactStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, ArtifactError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| ArtifactError::NotFound(key.to_string()))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(key.to_string()))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ArtifactError::Malformed("in-memory artifact store"))?;
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::guidance::tests::common::trained_artifact;
    use serde_json::{json, Value};

    #[test]
    fn artifact_round_trips_through_a_store() {
        let artifact = trained_artifact();
        let store = InMemoryArtifactStore::default();
        save_artifact(&store, "models/current.json", &artifact).expect("save");
        let loaded = load_artifact(&store, "models/current.json").expect("load");
        assert_eq!(loaded.fit_id, artifact.fit_id);
        assert_eq!(loaded.feature_names.len(), FEATURE_COUNT);
    }

    #[test]
    fn mismatched_fit_ids_fail_to_load() {
        let mut artifact = trained_artifact();
        artifact.scaler.fit_id = "fit-other".to_string();
        let bytes = serde_json::to_vec(&artifact).expect("serialize");

        match ModelArtifact::from_slice(&bytes) {
            Err(ArtifactError::FitIdMismatch { component, .. }) => assert_eq!(component, "scaler"),
            other => panic!("expected fit id mismatch, got {other:?}"),
        }
    }

    fn tampered(edit: impl FnOnce(&mut Value)) -> Vec<u8> {
        let mut json = serde_json::to_value(trained_artifact()).expect("serialize");
        edit(&mut json);
        serde_json::to_vec(&json).expect("serialize")
    }

    #[test]
    fn short_encoder_counts_fail_to_load() {
        let bytes = tampered(|json| {
            json["encoder"]["state"]["fields"][BORROWER_TYPE_FIELD]["counts"] = json!([4]);
        });
        assert!(matches!(
            ModelArtifact::from_slice(&bytes),
            Err(ArtifactError::Malformed("encoder"))
        ));
    }

    #[test]
    fn unsorted_encoder_classes_fail_to_load() {
        let bytes = tampered(|json| {
            json["encoder"]["state"]["fields"][BORROWER_TYPE_FIELD]["classes"] =
                json!(["student", "farmer", "business"]);
        });
        assert!(matches!(
            ModelArtifact::from_slice(&bytes),
            Err(ArtifactError::Malformed("encoder"))
        ));
    }

    #[test]
    fn scaler_with_short_scales_fails_to_load() {
        let bytes = tampered(|json| {
            json["scaler"]["scales"] = json!([1.0]);
        });
        assert!(matches!(
            ModelArtifact::from_slice(&bytes),
            Err(ArtifactError::Malformed("scaler"))
        ));
    }

    #[test]
    fn reordered_features_fail_to_load() {
        let mut artifact = trained_artifact();
        artifact.feature_names.swap(0, 1);
        assert!(matches!(artifact.validate(), Err(ArtifactError::FeatureOrder)));
    }

    #[test]
    fn unknown_format_version_fails_to_load() {
        let mut artifact = trained_artifact();
        artifact.format_version = 99;
        assert!(matches!(
            artifact.validate(),
            Err(ArtifactError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn filesystem_store_rejects_escaping_keys() {
        let store = FileSystemArtifactStore::new(std::env::temp_dir());
        assert!(matches!(
            store.read("../etc/passwd"),
            Err(ArtifactError::InvalidKey(_))
        ));
        assert!(matches!(store.read("/etc/passwd"), Err(ArtifactError::InvalidKey(_))));
        assert!(matches!(
            store.read("loan-guidance-missing/artifact.json"),
            Err(ArtifactError::NotFound(_))
        ));
    }

    #[test]
    fn filesystem_store_writes_nested_keys() {
        let root = std::env::temp_dir().join(format!("loan-guidance-store-{}", std::process::id()));
        let store = FileSystemArtifactStore::new(&root);
        store.write("models/a.json", b"{}").expect("write");
        assert_eq!(store.read("models/a.json").expect("read"), b"{}".to_vec());
        let _ = fs::remove_dir_all(root);
    }
}
