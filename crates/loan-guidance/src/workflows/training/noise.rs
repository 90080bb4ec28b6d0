//! Optional regularizing perturbations applied to the training split only.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingNoise {
    pub seed: u64,
    /// Gaussian feature noise, as a share of each column's standard deviation.
    pub feature_noise: f64,
    /// Probability that a single feature cell is zeroed.
    pub feature_dropout: f64,
    pub label_flip: f64,
    pub weight_low: f64,
    pub weight_high: f64,
    /// Gaussian payment-target noise, as a share of the target's standard deviation.
    pub target_noise: f64,
}

impl Default for TrainingNoise {
    fn default() -> Self {
        Self {
            seed: 42,
            feature_noise: 0.1,
            feature_dropout: 0.2,
            label_flip: 0.05,
            weight_low: 0.7,
            weight_high: 1.3,
            target_noise: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NoiseError {
    #[error("noise setting `{0}` is out of range")]
    OutOfRange(&'static str),
    #[error("noise distribution error: {0}")]
    Distribution(String),
}

/// Perturbed copy of a training split.
#[derive(Debug, Clone, PartialEq)]
pub struct NoisySplit {
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
    pub payments: Vec<f64>,
    pub weights: Vec<f64>,
}

impl TrainingNoise {
    fn validate(&self) -> Result<(), NoiseError> {
        let probability = |value: f64| (0.0..=1.0).contains(&value);
        if !(self.feature_noise >= 0.0 && self.feature_noise.is_finite()) {
            return Err(NoiseError::OutOfRange("feature_noise"));
        }
        if !probability(self.feature_dropout) {
            return Err(NoiseError::OutOfRange("feature_dropout"));
        }
        if !probability(self.label_flip) {
            return Err(NoiseError::OutOfRange("label_flip"));
        }
        if !(self.weight_low > 0.0 && self.weight_low <= self.weight_high && self.weight_high.is_finite())
        {
            return Err(NoiseError::OutOfRange("weight_low/weight_high"));
        }
        if !(self.target_noise >= 0.0 && self.target_noise.is_finite()) {
            return Err(NoiseError::OutOfRange("target_noise"));
        }
        Ok(())
    }

    pub fn apply(
        &self,
        rows: &[Vec<f64>],
        labels: &[bool],
        payments: &[f64],
    ) -> Result<NoisySplit, NoiseError> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let width = rows.first().map_or(0, Vec::len);

        let column_noise = (0..width)
            .map(|column| {
                let values: Vec<f64> = rows.iter().map(|row| row[column]).collect();
                normal(population_std(&values) * self.feature_noise)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&column_noise)
                    .map(|(value, noise)| {
                        let noisy = value + noise.sample(&mut rng);
                        if rng.gen::<f64>() < self.feature_dropout {
                            0.0
                        } else {
                            noisy
                        }
                    })
                    .collect()
            })
            .collect();

        let labels = labels
            .iter()
            .map(|label| {
                if rng.gen::<f64>() < self.label_flip {
                    !label
                } else {
                    *label
                }
            })
            .collect();

        let target = normal(population_std(payments) * self.target_noise)?;
        let payments: Vec<f64> = payments
            .iter()
            .map(|payment| payment + target.sample(&mut rng))
            .collect();

        let weights = payments
            .iter()
            .map(|_| rng.gen_range(self.weight_low..=self.weight_high))
            .collect();

        Ok(NoisySplit {
            rows,
            labels,
            payments,
            weights,
        })
    }
}

fn normal(std_dev: f64) -> Result<Normal<f64>, NoiseError> {
    Normal::new(0.0, std_dev).map_err(|err| NoiseError::Distribution(err.to_string()))
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
