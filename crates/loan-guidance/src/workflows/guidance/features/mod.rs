//! Borrower record → fixed-width numeric feature matrix.
//!
//! The column order in [`FEATURE_NAMES`] is the contract with the trained models. The
//! artifact stores the names it was fitted with and refuses to load when they differ.

mod encoder;
mod payments;
mod scaling;
mod sector;

pub use encoder::{CategoricalEncoder, EncoderError, FieldEncoding};
pub use payments::{PaymentFeatures, PaymentHistoryAnalyzer};
pub use scaling::{
    clip_to_quantiles, quantile, replace_infinities, safe_divide, safe_divide_slice,
    FeatureScaler,
};
pub use sector::{
    AttributeModifier, SectorModifier, SectorRiskEvaluator, SectorRiskRule, SectorRiskRules,
    NEUTRAL_SECTOR_RISK,
};

use serde::Serialize;
use tracing::error;

use super::domain::BorrowerRecord;
use super::error::GuidanceError;

pub const FEATURE_COUNT: usize = 18;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "monthly_income",
    "loan_amount",
    "interest_rate",
    "loan_term_months",
    "credit_score",
    "age",
    "borrower_type",
    "sector_risk",
    "payment_regularity",
    "late_payments",
    "avg_payment_delay",
    "payment_volatility",
    "debt_to_income",
    "monthly_payment_ratio",
    "income_to_loan_ratio",
    "credit_income_interaction",
    "age_credit_interaction",
    "borrower_type_freq",
];

pub const BORROWER_TYPE_FIELD: &str = "borrower_type";

const CLIP_LOWER_QUANTILE: f64 = 0.01;
const CLIP_UPPER_QUANTILE: f64 = 0.99;

/// Borrower record plus every derived feature, before selection and scaling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    pub monthly_income: f64,
    pub loan_amount: f64,
    pub interest_rate: f64,
    pub loan_term_months: f64,
    pub credit_score: f64,
    pub age: f64,
    pub borrower_type_code: f64,
    pub borrower_type_freq: f64,
    pub sector_risk: f64,
    pub payment: PaymentFeatures,
    pub debt_to_income: f64,
    pub monthly_payment_ratio: f64,
    pub income_to_loan_ratio: f64,
    pub credit_income_interaction: f64,
    pub age_credit_interaction: f64,
}

impl EnrichedRecord {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn feature_row(&self) -> Vec<f64> {
        vec![
            self.monthly_income,
            self.loan_amount,
            self.interest_rate,
            self.loan_term_months,
            self.credit_score,
            self.age,
            self.borrower_type_code,
            self.sector_risk,
            self.payment.payment_regularity,
            self.payment.late_payments,
            self.payment.avg_payment_delay,
            self.payment.payment_volatility,
            self.debt_to_income,
            self.monthly_payment_ratio,
            self.income_to_loan_ratio,
            self.credit_income_interaction,
            self.age_credit_interaction,
            self.borrower_type_freq,
        ]
    }
}

/// Scaled, model-ready rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}

/// Orchestrates sector scoring, payment analysis, and categorical encoding.
#[derive(Debug, Clone, Default)]
pub struct FeaturePipeline {
    sector: SectorRiskEvaluator,
    payments: PaymentHistoryAnalyzer,
}

impl FeaturePipeline {
    pub fn new(sector: SectorRiskEvaluator) -> Self {
        Self {
            sector,
            payments: PaymentHistoryAnalyzer,
        }
    }

    pub fn sector_evaluator(&self) -> &SectorRiskEvaluator {
        &self.sector
    }

    /// Fit the borrower-type mapping on a training batch. A field that is already fitted
    /// keeps its codes, and any new label in `records` is reported as unknown.
    pub fn fit_encoder(
        &self,
        records: &[BorrowerRecord],
        encoder: &mut CategoricalEncoder,
    ) -> Result<(), GuidanceError> {
        let labels: Vec<&str> = records
            .iter()
            .map(|record| record.borrower_type.label())
            .collect();
        encoder.fit_transform(BORROWER_TYPE_FIELD, &labels)?;
        Ok(())
    }

    pub fn preprocess(
        &self,
        record: &BorrowerRecord,
        encoder: &CategoricalEncoder,
    ) -> Result<EnrichedRecord, GuidanceError> {
        let label = record.borrower_type.label();
        let borrower_type_code = encoder
            .transform(BORROWER_TYPE_FIELD, &[label])?
            .first()
            .copied()
            .map(f64::from)
            .unwrap_or_default();
        let borrower_type_freq = encoder.frequency(BORROWER_TYPE_FIELD, label)?;

        let monthly_income = record.monthly_income;
        let loan_amount = record.loan_amount;
        let term = f64::from(record.loan_term_months);
        let credit_score = f64::from(record.credit_score);
        let age = f64::from(record.age);

        Ok(EnrichedRecord {
            monthly_income,
            loan_amount,
            interest_rate: record.interest_rate,
            loan_term_months: term,
            credit_score,
            age,
            borrower_type_code,
            borrower_type_freq,
            sector_risk: self.sector.evaluate(&record.sector_data),
            payment: self.payments.analyze(&record.payment_history),
            debt_to_income: safe_divide(loan_amount, monthly_income * term),
            monthly_payment_ratio: safe_divide(safe_divide(loan_amount, term), monthly_income),
            income_to_loan_ratio: safe_divide(monthly_income * term, loan_amount),
            credit_income_interaction: safe_divide(credit_score * monthly_income, 100_000.0),
            age_credit_interaction: safe_divide(age * credit_score, 100.0),
        })
    }

    pub fn preprocess_batch(
        &self,
        records: &[BorrowerRecord],
        encoder: &CategoricalEncoder,
    ) -> Result<Vec<EnrichedRecord>, GuidanceError> {
        records
            .iter()
            .map(|record| self.preprocess(record, encoder))
            .collect()
    }

    /// Fit the scaler on a training batch and return it with the scaled matrix.
    pub fn fit_scaler(
        &self,
        enriched: &[EnrichedRecord],
        fit_id: &str,
    ) -> Result<(FeatureScaler, FeatureMatrix), GuidanceError> {
        let rows = self.clipped_rows(enriched)?;
        let scaler = FeatureScaler::fit(&rows, FEATURE_COUNT, fit_id);
        let matrix = scale_rows(rows, &scaler);
        Ok((scaler, matrix))
    }

    /// Select, clip, and scale with a scaler fitted at training time.
    pub fn prepare_features(
        &self,
        enriched: &[EnrichedRecord],
        scaler: &FeatureScaler,
    ) -> Result<FeatureMatrix, GuidanceError> {
        if scaler.width() != FEATURE_COUNT {
            return Err(GuidanceError::ModelUnavailable(format!(
                "scaler expects {} features, pipeline produces {}",
                scaler.width(),
                FEATURE_COUNT
            )));
        }
        let rows = self.clipped_rows(enriched)?;
        Ok(scale_rows(rows, scaler))
    }

    fn clipped_rows(&self, enriched: &[EnrichedRecord]) -> Result<Vec<Vec<f64>>, GuidanceError> {
        let mut rows: Vec<Vec<f64>> = enriched.iter().map(EnrichedRecord::feature_row).collect();

        for column in 0..FEATURE_COUNT {
            let mut values: Vec<f64> = rows.iter().map(|row| row[column]).collect();
            replace_infinities(&mut values);

            if let Some(row_index) = values.iter().position(|value| !value.is_finite()) {
                let feature = FEATURE_NAMES[column];
                error!(
                    feature,
                    row = row_index,
                    record = ?enriched[row_index],
                    "non-finite feature survived numeric guards"
                );
                return Err(GuidanceError::FeatureComputation {
                    feature,
                    row: row_index,
                });
            }

            clip_to_quantiles(&mut values, CLIP_LOWER_QUANTILE, CLIP_UPPER_QUANTILE);
            for (row, value) in rows.iter_mut().zip(values) {
                row[column] = value;
            }
        }

        Ok(rows)
    }
}

fn scale_rows(mut rows: Vec<Vec<f64>>, scaler: &FeatureScaler) -> FeatureMatrix {
    for row in rows.iter_mut() {
        scaler.transform_row(row);
    }
    FeatureMatrix { rows }
}
