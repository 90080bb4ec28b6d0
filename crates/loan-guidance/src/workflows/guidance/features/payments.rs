use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::super::domain::PaymentRecord;

/// Fixed statistical summary of a borrower's repayment behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaymentFeatures {
    /// `1 - total_delay / (count * 30)`; can go negative for chronic lateness.
    pub payment_regularity: f64,
    pub late_payments: f64,
    pub avg_payment_delay: f64,
    pub payment_volatility: f64,
    /// Positive when delays shrink over time.
    pub payment_trend: f64,
}

impl PaymentFeatures {
    pub const NEUTRAL: PaymentFeatures = PaymentFeatures {
        payment_regularity: 1.0,
        late_payments: 0.0,
        avg_payment_delay: 0.0,
        payment_volatility: 0.0,
        payment_trend: 0.0,
    };
}

impl Default for PaymentFeatures {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentHistoryAnalyzer;

impl PaymentHistoryAnalyzer {
    pub fn analyze(&self, history: &[PaymentRecord]) -> PaymentFeatures {
        if history.is_empty() {
            return PaymentFeatures::NEUTRAL;
        }

        let delays: Vec<f64> = history
            .iter()
            .map(|payment| (payment.payment_date - payment.due_date).num_days().max(0) as f64)
            .collect();
        let amounts: Vec<f64> = history
            .iter()
            .filter_map(|payment| payment.amount_paid)
            .collect();

        let count = delays.len() as f64;
        let total_delay: f64 = delays.iter().sum();

        let payment_trend = if delays.len() > 1 {
            let diffs: Vec<f64> = delays.windows(2).map(|pair| pair[1] - pair[0]).collect();
            -mean(&diffs)
        } else {
            0.0
        };

        PaymentFeatures {
            payment_regularity: 1.0 - total_delay / (count * 30.0),
            late_payments: delays.iter().filter(|delay| **delay > 0.0).count() as f64,
            avg_payment_delay: total_delay / count,
            payment_volatility: population_std(&amounts),
            payment_trend,
        }
    }

    /// Analyze a history that arrived as untyped JSON, e.g. a CSV cell. Anything that does
    /// not parse into payment records yields the neutral feature set.
    pub fn analyze_json(&self, raw: &Value) -> PaymentFeatures {
        match serde_json::from_value::<Vec<PaymentRecord>>(raw.clone()) {
            Ok(history) => self.analyze(&history),
            Err(err) => {
                warn!(error = %err, "unparseable payment history treated as neutral");
                PaymentFeatures::NEUTRAL
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|value| (value - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
