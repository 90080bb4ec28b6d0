//! Offline training run: labelled borrower rows in, validated [`ModelArtifact`] out.

pub mod dataset;
pub mod noise;
pub mod report;

pub use dataset::{load_training_csv, read_training_csv, DatasetError};
pub use noise::{NoiseError, NoisySplit, TrainingNoise};
pub use report::{
    classification_metrics, root_mean_squared_error, ClassificationMetrics, CrossValidation,
    TrainingReport,
};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::workflows::guidance::features::{
    safe_divide_slice, CategoricalEncoder, FeaturePipeline, SectorRiskEvaluator, SectorRiskRules,
};
use crate::workflows::guidance::{
    ArtifactError, BoostingParams, BorrowerRecord, GuidanceError, ModelArtifact, ModelError,
    PaymentPredictor, RiskScorer,
};

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub risk_params: BoostingParams,
    pub payment_params: BoostingParams,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub seed: u64,
    pub noise: Option<TrainingNoise>,
    pub sector_rules: SectorRiskRules,
    pub fit_id: Option<String>,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            risk_params: BoostingParams::default(),
            // The payment regressor monitors its own training loss for early stopping.
            payment_params: BoostingParams {
                validation_fraction: 0.0,
                ..BoostingParams::default()
            },
            test_fraction: 0.3,
            cv_folds: 5,
            seed: 42,
            noise: None,
            sector_rules: SectorRiskRules::default(),
            fit_id: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Guidance(#[from] GuidanceError),
    #[error("model fitting failed: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Noise(#[from] NoiseError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("training row {row} has no loan_status label")]
    MissingLabel { row: usize },
    #[error("insufficient training data: {0}")]
    InsufficientData(String),
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub report: TrainingReport,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingWorkflow {
    options: TrainingOptions,
}

impl TrainingWorkflow {
    pub fn new(options: TrainingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TrainingOptions {
        &self.options
    }

    pub fn train(&self, records: &[BorrowerRecord]) -> Result<TrainingOutcome, TrainingError> {
        self.train_at(records, Utc::now())
    }

    /// Same as [`TrainingWorkflow::train`] with an explicit training timestamp.
    pub fn train_at(
        &self,
        records: &[BorrowerRecord],
        trained_at: DateTime<Utc>,
    ) -> Result<TrainingOutcome, TrainingError> {
        let options = &self.options;
        if !(0.0..1.0).contains(&options.test_fraction) {
            return Err(TrainingError::InsufficientData(format!(
                "test fraction {} must be in [0, 1)",
                options.test_fraction
            )));
        }

        let labels = records
            .iter()
            .enumerate()
            .map(|(row, record)| {
                record
                    .loan_status
                    .map(|status| status.is_default())
                    .ok_or(TrainingError::MissingLabel { row })
            })
            .collect::<Result<Vec<bool>, _>>()?;
        let loan_amounts: Vec<f64> = records.iter().map(|record| record.loan_amount).collect();
        let terms: Vec<f64> = records
            .iter()
            .map(|record| f64::from(record.loan_term_months))
            .collect();
        let payments = safe_divide_slice(&loan_amounts, &terms);

        let (train_idx, test_idx) = stratified_split(&labels, options.test_fraction, options.seed);
        if train_idx.len() < 2 {
            return Err(TrainingError::InsufficientData(format!(
                "{} records leave {} rows for training",
                records.len(),
                train_idx.len()
            )));
        }

        let fit_id = options
            .fit_id
            .clone()
            .unwrap_or_else(|| format!("fit-{}", trained_at.format("%Y%m%dT%H%M%SZ")));
        info!(
            fit_id = %fit_id,
            rows = records.len(),
            train_rows = train_idx.len(),
            test_rows = test_idx.len(),
            "training started"
        );

        let pipeline = FeaturePipeline::new(SectorRiskEvaluator::new(options.sector_rules.clone()));
        // Vocabulary covers every record so the held-out split never meets an unseen label.
        let mut encoder = CategoricalEncoder::new();
        pipeline.fit_encoder(records, &mut encoder)?;
        let enriched = pipeline.preprocess_batch(records, &encoder)?;

        let train_enriched: Vec<_> = train_idx.iter().map(|&i| enriched[i].clone()).collect();
        let (scaler, train_matrix) = pipeline.fit_scaler(&train_enriched, &fit_id)?;
        let mut train_rows = train_matrix.into_rows();
        let mut train_labels: Vec<bool> = train_idx.iter().map(|&i| labels[i]).collect();
        let mut train_payments: Vec<f64> = train_idx.iter().map(|&i| payments[i]).collect();
        let mut weights = None;

        if let Some(noise) = &options.noise {
            let noisy = noise.apply(&train_rows, &train_labels, &train_payments)?;
            debug!(seed = noise.seed, "training noise applied");
            train_rows = noisy.rows;
            train_labels = noisy.labels;
            train_payments = noisy.payments;
            weights = Some(noisy.weights);
        }

        let risk_model = RiskScorer::fit(
            &train_rows,
            &train_labels,
            weights.as_deref(),
            &options.risk_params,
            fit_id.as_str(),
        )?;
        let payment_model = PaymentPredictor::fit(
            &train_rows,
            &train_payments,
            weights.as_deref(),
            &options.payment_params,
            fit_id.as_str(),
        )?;

        let (risk, payment_rmse) = if test_idx.is_empty() {
            warn!("no held-out rows; test metrics are empty");
            (classification_metrics(&[], &[]), 0.0)
        } else {
            let test_enriched: Vec<_> = test_idx.iter().map(|&i| enriched[i].clone()).collect();
            let test_matrix = pipeline.prepare_features(&test_enriched, &scaler)?;
            let actual: Vec<bool> = test_idx.iter().map(|&i| labels[i]).collect();
            let predicted = test_matrix
                .rows()
                .iter()
                .map(|row| risk_model.predict(row))
                .collect::<Result<Vec<_>, _>>()?;
            let actual_payments: Vec<f64> = test_idx.iter().map(|&i| payments[i]).collect();
            let predicted_payments = test_matrix
                .rows()
                .iter()
                .map(|row| payment_model.predict(row))
                .collect::<Result<Vec<_>, _>>()?;
            (
                classification_metrics(&actual, &predicted),
                root_mean_squared_error(&actual_payments, &predicted_payments),
            )
        };

        let cross_validation = self.cross_validate(&train_rows, &train_labels, weights.as_deref())?;

        let report = TrainingReport {
            fit_id: fit_id.clone(),
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
            default_rate: labels.iter().filter(|flag| **flag).count() as f64 / labels.len() as f64,
            risk,
            payment_rmse,
            risk_trees: risk_model.model().trees().len(),
            payment_trees: payment_model.model().trees().len(),
            cross_validation,
        };

        let artifact = ModelArtifact::new(
            fit_id,
            scaler,
            encoder,
            risk_model,
            payment_model,
            options.sector_rules.clone(),
            trained_at,
        );
        artifact.validate()?;

        info!(
            fit_id = %report.fit_id,
            accuracy = report.risk.accuracy,
            f1 = report.risk.f1,
            payment_rmse = report.payment_rmse,
            "training finished"
        );
        Ok(TrainingOutcome { artifact, report })
    }

    /// Stratified k-fold accuracy of the risk classifier over the (scaled) training split.
    fn cross_validate(
        &self,
        rows: &[Vec<f64>],
        labels: &[bool],
        weights: Option<&[f64]>,
    ) -> Result<Option<CrossValidation>, TrainingError> {
        let folds = self.options.cv_folds;
        if folds < 2 || rows.len() < folds * 2 {
            debug!(folds, rows = rows.len(), "cross-validation skipped");
            return Ok(None);
        }

        let assignment = stratified_folds(labels, folds);
        let mut fold_accuracy = Vec::with_capacity(folds);
        for fold in 0..folds {
            let (held, kept): (Vec<usize>, Vec<usize>) =
                (0..rows.len()).partition(|&index| assignment[index] == fold);
            if held.is_empty() || kept.len() < 2 {
                continue;
            }

            let fold_rows: Vec<Vec<f64>> = kept.iter().map(|&i| rows[i].clone()).collect();
            let fold_labels: Vec<bool> = kept.iter().map(|&i| labels[i]).collect();
            let fold_weights: Option<Vec<f64>> =
                weights.map(|weights| kept.iter().map(|&i| weights[i]).collect());
            let scorer = RiskScorer::fit(
                &fold_rows,
                &fold_labels,
                fold_weights.as_deref(),
                &self.options.risk_params,
                "cross-validation",
            )?;

            let actual: Vec<bool> = held.iter().map(|&i| labels[i]).collect();
            let predicted = held
                .iter()
                .map(|&i| scorer.predict(&rows[i]))
                .collect::<Result<Vec<_>, _>>()?;
            fold_accuracy.push(classification_metrics(&actual, &predicted).accuracy);
        }

        if fold_accuracy.is_empty() {
            return Ok(None);
        }
        Ok(Some(CrossValidation::from_folds(fold_accuracy)))
    }
}

/// Seeded per-class shuffle; each class contributes its share of the test split.
fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = (0..labels.len())
            .filter(|&index| labels[index] == class)
            .collect();
        members.shuffle(&mut rng);
        let held = ((members.len() as f64) * test_fraction).round() as usize;
        let held = held.min(members.len().saturating_sub(1));
        test.extend_from_slice(&members[..held]);
        train.extend_from_slice(&members[held..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Round-robin fold assignment within each class, in row order.
fn stratified_folds(labels: &[bool], folds: usize) -> Vec<usize> {
    let mut assignment = vec![0; labels.len()];
    let mut next = [0usize; 2];
    for (index, label) in labels.iter().enumerate() {
        let slot = usize::from(*label);
        assignment[index] = next[slot] % folds;
        next[slot] += 1;
    }
    assignment
}
