use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{grow, GrowthInput, GrowthParams, RegressionTree};

const MIN_HESSIAN: f64 = 1e-16;
const PROBABILITY_EPSILON: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("{rows} feature rows but {targets} targets")]
    LengthMismatch { rows: usize, targets: usize },
    #[error("row {row} has {found} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("non-finite value at row {row}, column {column}")]
    NonFiniteInput { row: usize, column: usize },
    #[error("invalid boosting parameter: {0}")]
    InvalidParameter(String),
    #[error("model expects {expected} features, got {found}")]
    WidthMismatch { expected: usize, found: usize },
}

/// Loss driving gradient and hessian computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Logistic,
    SquaredError,
}

impl Objective {
    fn base_margin(self, targets: &[f64], weights: &[f64]) -> f64 {
        let total_weight: f64 = weights.iter().sum();
        let mean = if total_weight > 0.0 {
            targets
                .iter()
                .zip(weights)
                .map(|(target, weight)| target * weight)
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };
        match self {
            Objective::Logistic => {
                let p = mean.clamp(1e-6, 1.0 - 1e-6);
                (p / (1.0 - p)).ln()
            }
            Objective::SquaredError => mean,
        }
    }

    fn gradient(self, margin: f64, target: f64) -> (f64, f64) {
        match self {
            Objective::Logistic => {
                let p = sigmoid(margin);
                (p - target, (p * (1.0 - p)).max(MIN_HESSIAN))
            }
            Objective::SquaredError => (margin - target, 1.0),
        }
    }

    fn loss(self, margin: f64, target: f64) -> f64 {
        match self {
            Objective::Logistic => {
                let p = sigmoid(margin).clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
            }
            Objective::SquaredError => (margin - target).powi(2),
        }
    }

    pub fn transform(self, margin: f64) -> f64 {
        match self {
            Objective::Logistic => sigmoid(margin),
            Objective::SquaredError => margin,
        }
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Hyperparameters for [`GradientBoostedModel::fit`]. Defaults are the conservative
/// settings the production models ship with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
    pub gamma: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub max_leaves: usize,
    pub seed: u64,
    /// Stop after this many rounds without a validation improvement.
    pub early_stopping_rounds: Option<usize>,
    /// Share of rows held out for early stopping. With 0 the training rows are scored.
    pub validation_fraction: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 20,
            max_depth: 2,
            learning_rate: 0.15,
            subsample: 0.4,
            colsample_bytree: 0.4,
            min_child_weight: 15.0,
            gamma: 1.0,
            reg_alpha: 2.0,
            reg_lambda: 4.0,
            max_leaves: 4,
            seed: 42,
            early_stopping_rounds: Some(1),
            validation_fraction: 0.4,
        }
    }
}

impl BoostingParams {
    fn validate(&self) -> Result<(), ModelError> {
        let invalid = |message: &str| Err(ModelError::InvalidParameter(message.to_string()));
        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("learning_rate must be positive");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be within (0, 1]");
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return invalid("colsample_bytree must be within (0, 1]");
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return invalid("validation_fraction must be within [0, 1)");
        }
        if self.min_child_weight < 0.0
            || self.gamma < 0.0
            || self.reg_alpha < 0.0
            || self.reg_lambda < 0.0
        {
            return invalid("regularization terms must be non-negative");
        }
        Ok(())
    }

    fn growth(&self) -> GrowthParams {
        GrowthParams {
            max_depth: self.max_depth,
            max_leaves: self.max_leaves,
            min_child_weight: self.min_child_weight,
            gamma: self.gamma,
            reg_alpha: self.reg_alpha,
            reg_lambda: self.reg_lambda,
            learning_rate: self.learning_rate,
        }
    }
}

/// Additive tree ensemble over a fixed-width numeric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedModel {
    objective: Objective,
    base_margin: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedModel {
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        weights: Option<&[f64]>,
        objective: Objective,
        params: &BoostingParams,
    ) -> Result<Self, ModelError> {
        params.validate()?;
        let n_features = check_training_set(rows, targets, weights)?;

        let uniform;
        let weights = match weights {
            Some(weights) => weights,
            None => {
                uniform = vec![1.0; rows.len()];
                &uniform
            }
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let (train, validation) = holdout(rows.len(), params, &mut rng);

        let train_targets: Vec<f64> = train.iter().map(|row| targets[*row]).collect();
        let train_weights: Vec<f64> = train.iter().map(|row| weights[*row]).collect();
        let base_margin = objective.base_margin(&train_targets, &train_weights);

        let mut margins = vec![base_margin; rows.len()];
        let mut gradients = vec![0.0; rows.len()];
        let mut hessians = vec![0.0; rows.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        let mut best_loss = f64::INFINITY;
        let mut best_rounds = 0usize;
        let mut rounds_since_best = 0usize;
        let growth = params.growth();

        for round in 0..params.n_estimators {
            for row in &train {
                let (grad, hess) = objective.gradient(margins[*row], targets[*row]);
                gradients[*row] = grad * weights[*row];
                hessians[*row] = hess * weights[*row];
            }

            let sample = sample_rows(&train, params.subsample, &mut rng);
            let columns = sample_columns(n_features, params.colsample_bytree, &mut rng);
            let tree = grow(
                &GrowthInput {
                    rows,
                    gradients: &gradients,
                    hessians: &hessians,
                    columns: &columns,
                },
                sample,
                &growth,
            );

            for (margin, row) in margins.iter_mut().zip(rows) {
                *margin += tree.predict(row);
            }
            trees.push(tree);

            let Some(patience) = params.early_stopping_rounds else {
                continue;
            };
            let monitored = if validation.is_empty() { &train } else { &validation };
            let loss = monitored
                .iter()
                .map(|row| objective.loss(margins[*row], targets[*row]))
                .sum::<f64>()
                / monitored.len() as f64;

            if loss < best_loss {
                best_loss = loss;
                best_rounds = round + 1;
                rounds_since_best = 0;
            } else {
                rounds_since_best += 1;
                if rounds_since_best >= patience {
                    debug!(round, best_rounds, best_loss, "early stopping");
                    break;
                }
            }
        }

        if params.early_stopping_rounds.is_some() && best_rounds > 0 {
            trees.truncate(best_rounds);
        }

        Ok(Self {
            objective,
            base_margin,
            n_features,
            trees,
        })
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn margin(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::WidthMismatch {
                expected: self.n_features,
                found: row.len(),
            });
        }
        Ok(self.base_margin + self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>())
    }

    /// Prediction on the objective's output scale.
    pub fn predict(&self, row: &[f64]) -> Result<f64, ModelError> {
        self.margin(row).map(|margin| self.objective.transform(margin))
    }

    pub fn is_well_formed(&self) -> bool {
        self.n_features > 0
            && self.base_margin.is_finite()
            && self.trees.iter().all(|tree| tree.is_well_formed(self.n_features))
    }
}

fn check_training_set(
    rows: &[Vec<f64>],
    targets: &[f64],
    weights: Option<&[f64]>,
) -> Result<usize, ModelError> {
    let Some(first) = rows.first() else {
        return Err(ModelError::EmptyTrainingSet);
    };
    if rows.len() != targets.len() {
        return Err(ModelError::LengthMismatch {
            rows: rows.len(),
            targets: targets.len(),
        });
    }
    let width = first.len();
    if width == 0 {
        return Err(ModelError::RaggedRow {
            row: 0,
            expected: 1,
            found: 0,
        });
    }
    for (index, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(ModelError::RaggedRow {
                row: index,
                expected: width,
                found: row.len(),
            });
        }
        if let Some(column) = row.iter().position(|value| !value.is_finite()) {
            return Err(ModelError::NonFiniteInput { row: index, column });
        }
        if !targets[index].is_finite() {
            return Err(ModelError::NonFiniteInput {
                row: index,
                column: width,
            });
        }
    }
    if let Some(weights) = weights {
        if weights.len() != rows.len() {
            return Err(ModelError::LengthMismatch {
                rows: rows.len(),
                targets: weights.len(),
            });
        }
        if weights.iter().any(|weight| !(weight.is_finite() && *weight >= 0.0)) {
            return Err(ModelError::InvalidParameter(
                "sample weights must be finite and non-negative".to_string(),
            ));
        }
    }
    Ok(width)
}

/// Shuffle row indices and carve off the early-stopping holdout.
fn holdout(count: usize, params: &BoostingParams, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..count).collect();
    if params.early_stopping_rounds.is_none() || params.validation_fraction <= 0.0 || count < 2 {
        return (indices, Vec::new());
    }
    indices.shuffle(rng);
    let held = ((count as f64 * params.validation_fraction).round() as usize).clamp(1, count - 1);
    let validation = indices.split_off(count - held);
    indices.sort_unstable();
    (indices, validation)
}

fn sample_rows(train: &[usize], subsample: f64, rng: &mut StdRng) -> Vec<usize> {
    if subsample >= 1.0 {
        return train.to_vec();
    }
    let sample: Vec<usize> = train
        .iter()
        .copied()
        .filter(|_| rng.gen::<f64>() < subsample)
        .collect();
    if sample.is_empty() {
        train.to_vec()
    } else {
        sample
    }
}

fn sample_columns(width: usize, colsample: f64, rng: &mut StdRng) -> Vec<usize> {
    let keep = ((width as f64 * colsample).round() as usize).clamp(1, width);
    let mut columns = rand::seq::index::sample(rng, width, keep).into_vec();
    columns.sort_unstable();
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relaxed() -> BoostingParams {
        BoostingParams {
            n_estimators: 30,
            max_depth: 3,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_child_weight: 0.0,
            gamma: 0.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            max_leaves: 0,
            seed: 7,
            early_stopping_rounds: None,
            validation_fraction: 0.0,
        }
    }

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|index| vec![f64::from(index), f64::from(index % 3)])
            .collect();
        let targets = (0..40).map(|index| if index >= 20 { 1.0 } else { 0.0 }).collect();
        (rows, targets)
    }

    #[test]
    fn classifier_separates_a_step_function() {
        let (rows, targets) = step_data();
        let model =
            GradientBoostedModel::fit(&rows, &targets, None, Objective::Logistic, &relaxed())
                .expect("fit succeeds");

        let low = model.predict(&[5.0, 2.0]).expect("width matches");
        let high = model.predict(&[35.0, 2.0]).expect("width matches");
        assert!(low < 0.2, "{low}");
        assert!(high > 0.8, "{high}");
    }

    #[test]
    fn regressor_reduces_squared_error_below_the_mean_baseline() {
        let rows: Vec<Vec<f64>> = (0..50).map(|index| vec![f64::from(index)]).collect();
        let targets: Vec<f64> = (0..50).map(|index| 2.0 * f64::from(index)).collect();
        let model =
            GradientBoostedModel::fit(&rows, &targets, None, Objective::SquaredError, &relaxed())
                .expect("fit succeeds");

        let mean = targets.iter().sum::<f64>() / targets.len() as f64;
        let baseline: f64 = targets.iter().map(|target| (target - mean).powi(2)).sum();
        let fitted: f64 = rows
            .iter()
            .zip(&targets)
            .map(|(row, target)| (model.predict(row).expect("width") - target).powi(2))
            .sum();
        assert!(fitted < baseline * 0.1, "{fitted} vs {baseline}");
    }

    #[test]
    fn same_seed_reproduces_the_same_ensemble() {
        let (rows, targets) = step_data();
        let params = BoostingParams {
            min_child_weight: 1.0,
            ..BoostingParams::default()
        };
        let first = GradientBoostedModel::fit(&rows, &targets, None, Objective::Logistic, &params)
            .expect("fit");
        let second = GradientBoostedModel::fit(&rows, &targets, None, Objective::Logistic, &params)
            .expect("fit");
        assert_eq!(first, second);
    }

    #[test]
    fn early_stopping_keeps_only_improving_rounds() {
        // A constant feature admits no split and the L1 term zeroes the leaf, so the
        // second round cannot improve the holdout loss.
        let rows = vec![vec![1.0]; 20];
        let targets: Vec<f64> = (0..20).map(|index| f64::from(index % 2)).collect();
        let params = BoostingParams {
            n_estimators: 50,
            reg_alpha: 1.0,
            early_stopping_rounds: Some(1),
            validation_fraction: 0.4,
            ..relaxed()
        };
        let model =
            GradientBoostedModel::fit(&rows, &targets, None, Objective::SquaredError, &params)
                .expect("fit");
        assert_eq!(model.trees().len(), 1);
    }

    #[test]
    fn probabilities_stay_within_unit_interval() {
        let (rows, targets) = step_data();
        let model = GradientBoostedModel::fit(
            &rows,
            &targets,
            None,
            Objective::Logistic,
            &BoostingParams::default(),
        )
        .expect("fit");
        for probe in [-1e6, 0.0, 19.5, 1e6] {
            let p = model.predict(&[probe, 1.0]).expect("width");
            assert!((0.0..=1.0).contains(&p), "{p}");
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        let params = relaxed();
        assert_eq!(
            GradientBoostedModel::fit(&[], &[], None, Objective::Logistic, &params),
            Err(ModelError::EmptyTrainingSet)
        );
        assert!(matches!(
            GradientBoostedModel::fit(
                &[vec![1.0], vec![1.0, 2.0]],
                &[0.0, 1.0],
                None,
                Objective::Logistic,
                &params
            ),
            Err(ModelError::RaggedRow { row: 1, .. })
        ));
        assert!(matches!(
            GradientBoostedModel::fit(&[vec![f64::NAN]], &[0.0], None, Objective::Logistic, &params),
            Err(ModelError::NonFiniteInput { row: 0, column: 0 })
        ));
        assert!(matches!(
            GradientBoostedModel::fit(
                &[vec![1.0]],
                &[0.0],
                None,
                Objective::Logistic,
                &BoostingParams {
                    subsample: 0.0,
                    ..params
                }
            ),
            Err(ModelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn prediction_checks_row_width() {
        let (rows, targets) = step_data();
        let model =
            GradientBoostedModel::fit(&rows, &targets, None, Objective::Logistic, &relaxed())
                .expect("fit");
        assert_eq!(
            model.predict(&[1.0]),
            Err(ModelError::WidthMismatch {
                expected: 2,
                found: 1
            })
        );
    }
}
