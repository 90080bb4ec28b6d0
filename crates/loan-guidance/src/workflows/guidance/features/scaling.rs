//! Numeric guards, outlier clipping, and the stored standard scaler.

use serde::{Deserialize, Serialize};

/// Division that yields 0 instead of NaN/Inf for a zero or non-finite denominator, and
/// for any quotient that would not be finite.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let quotient = numerator / denominator;
    if quotient.is_finite() {
        quotient
    } else {
        0.0
    }
}

/// Element-wise [`safe_divide`]. A missing denominator (shorter slice) also yields 0.
pub fn safe_divide_slice(numerators: &[f64], denominators: &[f64]) -> Vec<f64> {
    numerators
        .iter()
        .enumerate()
        .map(|(index, numerator)| match denominators.get(index) {
            Some(denominator) => safe_divide(*numerator, *denominator),
            None => 0.0,
        })
        .collect()
}

/// Replace `±inf` in a column with the column's largest absolute finite value.
///
/// A column with no finite values is left untouched so that the caller's finiteness check
/// reports it.
pub fn replace_infinities(column: &mut [f64]) {
    if !column.iter().any(|value| value.is_infinite()) {
        return;
    }
    let replacement = column
        .iter()
        .filter(|value| value.is_finite())
        .map(|value| value.abs())
        .fold(None, |acc: Option<f64>, value| {
            Some(acc.map_or(value, |current| current.max(value)))
        });
    if let Some(replacement) = replacement {
        for value in column.iter_mut().filter(|value| value.is_infinite()) {
            *value = replacement;
        }
    }
}

/// Linear-interpolated quantile of a column (`q` in `[0, 1]`).
pub fn quantile(column: &[f64], q: f64) -> Option<f64> {
    if column.is_empty() {
        return None;
    }
    let mut sorted = column.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Clip a column to its `[lower_q, upper_q]` quantile range.
pub fn clip_to_quantiles(column: &mut [f64], lower_q: f64, upper_q: f64) {
    let (Some(low), Some(high)) = (quantile(column, lower_q), quantile(column, upper_q)) else {
        return;
    };
    for value in column.iter_mut() {
        *value = value.clamp(low, high);
    }
}

/// Per-feature mean/standard-deviation normalization, fitted once during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub fit_id: String,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl FeatureScaler {
    /// Fit on row-major data. Constant columns get a scale of 1.
    pub fn fit(rows: &[Vec<f64>], width: usize, fit_id: impl Into<String>) -> Self {
        let count = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value / count;
            }
        }

        let mut variances = vec![0.0; width];
        for row in rows {
            for ((variance, value), mean) in variances.iter_mut().zip(row).zip(&means) {
                *variance += (value - mean).powi(2) / count;
            }
        }

        let scales = variances
            .into_iter()
            .map(|variance| {
                let std = variance.sqrt();
                if std > f64::EPSILON && std.is_finite() {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Self {
            fit_id: fit_id.into(),
            means,
            scales,
        }
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    /// One finite mean and one finite, positive scale per column.
    pub fn is_well_formed(&self) -> bool {
        self.means.len() == self.scales.len()
            && self.means.iter().all(|mean| mean.is_finite())
            && self
                .scales
                .iter()
                .all(|scale| scale.is_finite() && *scale > 0.0)
    }

    pub fn transform_row(&self, row: &mut [f64]) {
        for ((value, mean), scale) in row.iter_mut().zip(&self.means).zip(&self.scales) {
            *value = (*value - mean) / scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_divide_never_returns_non_finite() {
        assert_eq!(safe_divide(5.0, 0.0), 0.0);
        assert_eq!(safe_divide(0.0, 0.0), 0.0);
        assert_eq!(safe_divide(5.0, f64::NAN), 0.0);
        assert_eq!(safe_divide(f64::MAX, 1e-300), 0.0);
        assert_eq!(safe_divide(6.0, 3.0), 2.0);
    }

    #[test]
    fn safe_divide_slice_handles_zero_and_missing_denominators() {
        let result = safe_divide_slice(&[1.0, 2.0, 3.0], &[0.0, 4.0]);
        assert_eq!(result, vec![0.0, 0.5, 0.0]);
        assert!(result.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn infinities_take_the_column_max_abs() {
        let mut column = vec![1.0, -7.5, f64::INFINITY, f64::NEG_INFINITY, 3.0];
        replace_infinities(&mut column);
        assert_eq!(column, vec![1.0, -7.5, 7.5, 7.5, 3.0]);
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let column: Vec<f64> = (0..=100).map(f64::from).collect();
        assert_eq!(quantile(&column, 0.01), Some(1.0));
        assert_eq!(quantile(&column, 0.99), Some(99.0));
        assert_eq!(quantile(&[4.0, 2.0], 0.5), Some(3.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn clipping_a_single_row_is_a_no_op() {
        let mut column = vec![42.0];
        clip_to_quantiles(&mut column, 0.01, 0.99);
        assert_eq!(column, vec![42.0]);
    }

    #[test]
    fn clipping_pulls_in_extremes() {
        let mut column: Vec<f64> = (0..100).map(f64::from).collect();
        column.push(10_000.0);
        clip_to_quantiles(&mut column, 0.01, 0.99);
        assert!(column.iter().all(|value| *value <= 100.0));
        assert_eq!(column[0], 1.0);
    }

    #[test]
    fn scaler_standardizes_and_tolerates_constant_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = FeatureScaler::fit(&rows, 2, "fit-a");
        let mut row = vec![3.0, 5.0];
        scaler.transform_row(&mut row);
        assert_eq!(row, vec![1.0, 0.0]);
        assert_eq!(scaler.width(), 2);
        assert!(scaler.is_well_formed());
    }

    #[test]
    fn mismatched_or_degenerate_scales_are_malformed() {
        let scaler = |means: Vec<f64>, scales: Vec<f64>| FeatureScaler {
            fit_id: "fit-a".into(),
            means,
            scales,
        };
        assert!(!scaler(vec![0.0, 1.0], vec![1.0]).is_well_formed());
        assert!(!scaler(vec![0.0], vec![0.0]).is_well_formed());
        assert!(!scaler(vec![f64::NAN], vec![1.0]).is_well_formed());
        assert!(!scaler(vec![0.0], vec![f64::INFINITY]).is_well_formed());
    }
}
