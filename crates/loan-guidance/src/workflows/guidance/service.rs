use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, error, info};

use super::artifact::ModelArtifact;
use super::composer::{GuidanceComposer, GuidancePackage};
use super::domain::BorrowerRecord;
use super::error::GuidanceError;
use super::features::FeaturePipeline;
use super::models::ModelError;

/// Source of the date payment schedules are anchored to.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Raw model outputs for one borrower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelAssessment {
    pub risk_score: f64,
    pub predicted_payment: f64,
}

struct LoadedModel {
    artifact: Arc<ModelArtifact>,
    pipeline: FeaturePipeline,
}

/// Inference facade over an immutable, fully validated artifact.
pub struct LoanGuidanceService {
    model: Result<LoadedModel, String>,
    composer: GuidanceComposer,
    clock: Arc<dyn Clock>,
}

impl LoanGuidanceService {
    pub fn new(artifact: Arc<ModelArtifact>) -> Self {
        let pipeline = artifact.pipeline();
        Self {
            model: Ok(LoadedModel { artifact, pipeline }),
            composer: GuidanceComposer,
            clock: Arc::new(SystemClock),
        }
    }

    /// A service that answers every request with `ModelUnavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            model: Err(reason.into()),
            composer: GuidanceComposer,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_ok()
    }

    pub fn artifact(&self) -> Option<&Arc<ModelArtifact>> {
        self.model.as_ref().ok().map(|loaded| &loaded.artifact)
    }

    fn loaded(&self) -> Result<&LoadedModel, GuidanceError> {
        self.model
            .as_ref()
            .map_err(|reason| GuidanceError::ModelUnavailable(reason.clone()))
    }

    pub fn assess(&self, record: &BorrowerRecord) -> Result<ModelAssessment, GuidanceError> {
        let loaded = self.loaded()?;
        record.validate()?;

        let artifact = &loaded.artifact;
        let enriched = loaded
            .pipeline
            .preprocess(record, &artifact.encoder.state)?;
        let matrix = loaded
            .pipeline
            .prepare_features(std::slice::from_ref(&enriched), &artifact.scaler)?;
        let row = matrix
            .row(0)
            .ok_or_else(|| GuidanceError::ModelUnavailable("empty feature matrix".to_string()))?;

        let risk_score = artifact.risk_model.predict_proba(row).map_err(model_failure)?;
        let predicted_payment = artifact.payment_model.predict(row).map_err(model_failure)?;

        for (feature, value) in [("risk_score", risk_score), ("predicted_payment", predicted_payment)]
        {
            if !value.is_finite() {
                error!(feature, record = ?record, "model produced a non-finite output");
                return Err(GuidanceError::FeatureComputation { feature, row: 0 });
            }
        }

        debug!(risk_score, predicted_payment, "borrower scored");
        Ok(ModelAssessment {
            risk_score,
            predicted_payment,
        })
    }

    pub fn generate_guidance(
        &self,
        record: &BorrowerRecord,
    ) -> Result<GuidancePackage, GuidanceError> {
        let assessment = self.assess(record)?;
        let package = self.composer.compose(
            assessment.risk_score,
            record,
            assessment.predicted_payment,
            self.clock.today(),
        );
        info!(
            risk_level = package.risk_assessment.risk_level.label(),
            risk_score = package.risk_assessment.risk_score,
            borrower_type = %record.borrower_type,
            "guidance generated"
        );
        Ok(package)
    }

    /// Validate an untyped request body and generate guidance for it.
    pub fn guidance_for_json(
        &self,
        body: Value,
    ) -> Result<(BorrowerRecord, GuidancePackage), GuidanceError> {
        self.loaded()?;
        let record = BorrowerRecord::from_json(body)?;
        let package = self.generate_guidance(&record)?;
        Ok((record, package))
    }
}

fn model_failure(err: ModelError) -> GuidanceError {
    GuidanceError::ModelUnavailable(err.to_string())
}
