use serde::Serialize;

/// Support-weighted classification scores over both classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

pub fn classification_metrics(actual: &[bool], predicted: &[bool]) -> ClassificationMetrics {
    let support = actual.len().min(predicted.len());
    if support == 0 {
        return ClassificationMetrics {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            support: 0,
        };
    }

    let pairs: Vec<(bool, bool)> = actual
        .iter()
        .copied()
        .zip(predicted.iter().copied())
        .collect();
    let correct = pairs.iter().filter(|(truth, guess)| truth == guess).count();

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;
    for class in [false, true] {
        let class_support = pairs.iter().filter(|(truth, _)| *truth == class).count();
        if class_support == 0 {
            continue;
        }
        let predicted_count = pairs.iter().filter(|(_, guess)| *guess == class).count();
        let true_positive = pairs
            .iter()
            .filter(|(truth, guess)| *truth == class && *guess == class)
            .count();

        let class_precision = ratio(true_positive, predicted_count);
        let class_recall = ratio(true_positive, class_support);
        let class_f1 = if class_precision + class_recall > 0.0 {
            2.0 * class_precision * class_recall / (class_precision + class_recall)
        } else {
            0.0
        };

        let weight = class_support as f64 / support as f64;
        precision += class_precision * weight;
        recall += class_recall * weight;
        f1 += class_f1 * weight;
    }

    ClassificationMetrics {
        accuracy: ratio(correct, support),
        precision,
        recall,
        f1,
        support,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let count = actual.len().min(predicted.len());
    if count == 0 {
        return 0.0;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(truth, guess)| (truth - guess).powi(2))
        .sum();
    (total / count as f64).sqrt()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidation {
    pub fold_accuracy: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl CrossValidation {
    pub fn from_folds(fold_accuracy: Vec<f64>) -> Self {
        let count = fold_accuracy.len().max(1) as f64;
        let mean = fold_accuracy.iter().sum::<f64>() / count;
        let std = (fold_accuracy
            .iter()
            .map(|score| (score - mean).powi(2))
            .sum::<f64>()
            / count)
            .sqrt();
        Self {
            fold_accuracy,
            mean,
            std,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub fit_id: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub default_rate: f64,
    pub risk: ClassificationMetrics,
    pub payment_rmse: f64,
    pub risk_trees: usize,
    pub payment_trees: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_validation: Option<CrossValidation>,
}

impl TrainingReport {
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Fit {}: {} training rows, {} test rows, default rate {:.4}",
                self.fit_id, self.train_rows, self.test_rows, self.default_rate
            ),
            format!("Test Accuracy: {:.4}", self.risk.accuracy),
            format!("Test Precision: {:.4}", self.risk.precision),
            format!("Test Recall: {:.4}", self.risk.recall),
            format!("Test F1 Score: {:.4}", self.risk.f1),
            format!("Payment RMSE: {:.2}", self.payment_rmse),
            format!(
                "Trees kept: risk {}, payment {}",
                self.risk_trees, self.payment_trees
            ),
        ];
        if let Some(cv) = &self.cross_validation {
            lines.push(format!(
                "Mean CV Accuracy: {:.4} (+/- {:.4})",
                cv.mean,
                cv.std * 2.0
            ));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn weighted_scores_follow_class_support() {
        let metrics = classification_metrics(&[true, true, false, false], &[true, false, false, false]);
        assert!(close(metrics.accuracy, 0.75));
        assert!(close(metrics.recall, 0.75));
        assert!(close(metrics.precision, (1.0 * 2.0 + (2.0 / 3.0) * 2.0) / 4.0));
        assert!(close(metrics.f1, ((2.0 / 3.0) * 2.0 + 0.8 * 2.0) / 4.0));
        assert_eq!(metrics.support, 4);
    }

    #[test]
    fn single_class_predictions_do_not_divide_by_zero() {
        let metrics = classification_metrics(&[false, false, true], &[false, false, false]);
        assert!(close(metrics.accuracy, 2.0 / 3.0));
        assert!(metrics.precision.is_finite());
        assert!(metrics.f1.is_finite());
        assert_eq!(classification_metrics(&[], &[]).support, 0);
    }

    #[test]
    fn rmse_and_cross_validation_summaries() {
        assert!(close(root_mean_squared_error(&[1.0, 3.0], &[2.0, 2.0]), 1.0));
        let cv = CrossValidation::from_folds(vec![0.8, 0.6]);
        assert!(close(cv.mean, 0.7));
        assert!(close(cv.std, 0.1));
    }
}
