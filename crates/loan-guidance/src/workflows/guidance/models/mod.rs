//! Tree-ensemble scorers behind the guidance pipeline.
//!
//! Both scorers carry the `fit_id` of the training run that produced them. The artifact
//! loader compares it against the scaler and encoder before anything is served.

mod gbdt;
mod tree;

pub use gbdt::{BoostingParams, GradientBoostedModel, ModelError, Objective};
pub use tree::{RegressionTree, TreeNode};

use serde::{Deserialize, Serialize};

/// Binary default-risk classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScorer {
    pub fit_id: String,
    model: GradientBoostedModel,
}

impl RiskScorer {
    pub fn fit(
        rows: &[Vec<f64>],
        defaulted: &[bool],
        weights: Option<&[f64]>,
        params: &BoostingParams,
        fit_id: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let targets: Vec<f64> = defaulted
            .iter()
            .map(|flag| if *flag { 1.0 } else { 0.0 })
            .collect();
        let model = GradientBoostedModel::fit(rows, &targets, weights, Objective::Logistic, params)?;
        Ok(Self {
            fit_id: fit_id.into(),
            model,
        })
    }

    /// Probability of default in `[0, 1]`.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        self.model
            .predict(row)
            .map(|probability| probability.clamp(0.0, 1.0))
    }

    /// Hard label at the 0.5 cut.
    pub fn predict(&self, row: &[f64]) -> Result<bool, ModelError> {
        self.predict_proba(row).map(|probability| probability >= 0.5)
    }

    pub fn n_features(&self) -> usize {
        self.model.n_features()
    }

    pub fn model(&self) -> &GradientBoostedModel {
        &self.model
    }
}

/// Monthly payment regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPredictor {
    pub fit_id: String,
    model: GradientBoostedModel,
}

impl PaymentPredictor {
    pub fn fit(
        rows: &[Vec<f64>],
        payments: &[f64],
        weights: Option<&[f64]>,
        params: &BoostingParams,
        fit_id: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let model =
            GradientBoostedModel::fit(rows, payments, weights, Objective::SquaredError, params)?;
        Ok(Self {
            fit_id: fit_id.into(),
            model,
        })
    }

    pub fn predict(&self, row: &[f64]) -> Result<f64, ModelError> {
        self.model.predict(row)
    }

    pub fn n_features(&self) -> usize {
        self.model.n_features()
    }

    pub fn model(&self) -> &GradientBoostedModel {
        &self.model
    }
}
