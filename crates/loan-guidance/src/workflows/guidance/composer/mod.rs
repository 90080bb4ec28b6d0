//! Deterministic post-model business logic: risk score + borrower → guidance package.

mod recommendations;
mod schedule;

pub use recommendations::{
    monitoring_plan, smart_recommendations, AlertThresholds, MonitoringFrequency,
    MonitoringPlan, Recommendations,
};
pub use schedule::{
    create_detailed_schedule, early_payment_benefits, flexibility_options, BiWeeklyImpact,
    BiWeeklyOption, EarlyPaymentBenefits, ExtraPaymentOption, FlexibilityOptions, PaymentPlan,
    ScheduledPayment,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::BorrowerRecord;

const LOW_RISK_CEILING: f64 = 0.3;
const MODERATE_RISK_CEILING: f64 = 0.7;
const LOW_CREDIT_SCORE: u16 = 650;
const HIGH_DEBT_TO_INCOME: f64 = 0.4;
const LIMITED_HISTORY_AGE: u16 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Moderate Risk")]
    Moderate,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low Risk",
            RiskLevel::Moderate => "Moderate Risk",
            RiskLevel::High => "High Risk",
        }
    }

    pub const fn mitigation_strategies(self) -> [&'static str; 3] {
        match self {
            RiskLevel::Low => [
                "Continue regular payments",
                "Consider early payment options",
                "Build emergency fund",
            ],
            RiskLevel::Moderate => [
                "Set up automatic payments",
                "Create strict budget",
                "Build larger emergency fund",
            ],
            RiskLevel::High => [
                "Consider loan restructuring",
                "Seek financial counseling",
                "Explore additional income sources",
            ],
        }
    }
}

/// Tier boundaries are half-open: 0.3 is already moderate, 0.7 already high.
pub fn categorize_risk(risk_score: f64) -> RiskLevel {
    if risk_score < LOW_RISK_CEILING {
        RiskLevel::Low
    } else if risk_score < MODERATE_RISK_CEILING {
        RiskLevel::Moderate
    } else {
        RiskLevel::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub impact: Impact,
}

impl RiskFactor {
    fn new(factor: &str, impact: Impact) -> Self {
        Self {
            factor: factor.to_string(),
            impact,
        }
    }
}

/// Rule-based factors, reported in evaluation order.
pub fn identify_risk_factors(record: &BorrowerRecord) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    if record.credit_score < LOW_CREDIT_SCORE {
        factors.push(RiskFactor::new("Low Credit Score", Impact::High));
    }
    if record.raw_debt_to_income() > HIGH_DEBT_TO_INCOME {
        factors.push(RiskFactor::new("High Debt-to-Income Ratio", Impact::High));
    }
    if record.age < LIMITED_HISTORY_AGE {
        factors.push(RiskFactor::new("Limited Credit History", Impact::Medium));
    }
    factors
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub key_factors: Vec<RiskFactor>,
    pub mitigation_strategies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidancePackage {
    pub risk_assessment: RiskAssessment,
    pub payment_plan: PaymentPlan,
    pub recommendations: Recommendations,
    pub monitoring_plan: MonitoringPlan,
}

/// Assembles the guidance package. `today` anchors the payment schedule so that output is
/// reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidanceComposer;

impl GuidanceComposer {
    pub fn compose(
        &self,
        risk_score: f64,
        record: &BorrowerRecord,
        predicted_payment: f64,
        today: NaiveDate,
    ) -> GuidancePackage {
        let risk_score = risk_score.clamp(0.0, 1.0);
        GuidancePackage {
            risk_assessment: self.risk_assessment(risk_score, record),
            payment_plan: PaymentPlan {
                monthly_payment: round_to(predicted_payment, 2),
                payment_schedule: create_detailed_schedule(record, predicted_payment, today),
                flexibility_options: flexibility_options(record),
                early_payment_benefits: early_payment_benefits(record),
            },
            recommendations: smart_recommendations(record, risk_score),
            monitoring_plan: monitoring_plan(risk_score),
        }
    }

    pub fn risk_assessment(&self, risk_score: f64, record: &BorrowerRecord) -> RiskAssessment {
        let risk_level = categorize_risk(risk_score);
        RiskAssessment {
            risk_level,
            risk_score: round_to(risk_score, 4),
            key_factors: identify_risk_factors(record),
            mitigation_strategies: risk_level
                .mitigation_strategies()
                .iter()
                .map(|strategy| strategy.to_string())
                .collect(),
        }
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
