use serde::{Deserialize, Serialize};

use crate::workflows::guidance::domain::{BorrowerRecord, BorrowerType};

const LARGE_LOAN_INCOME_MULTIPLE: f64 = 24.0;
const ELEVATED_RISK: f64 = 0.6;
const MODERATE_RISK: f64 = 0.3;
const CREDIT_BUILDING_THRESHOLD: u16 = 700;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendations {
    pub payment_strategy: Vec<String>,
    pub risk_mitigation: Vec<String>,
    pub financial_planning: Vec<String>,
}

fn borrower_strategies(borrower_type: BorrowerType) -> [&'static str; 3] {
    match borrower_type {
        BorrowerType::Farmer => [
            "Time payments with harvest cycles",
            "Consider crop insurance for risk mitigation",
            "Explore government agricultural subsidies",
        ],
        BorrowerType::Student => [
            "Look for part-time work opportunities",
            "Apply for educational scholarships",
            "Consider income-based repayment options",
        ],
        BorrowerType::Business => [
            "Align payments with business cash flow cycles",
            "Maintain separate business and personal accounts",
            "Explore invoice financing options",
        ],
    }
}

pub fn smart_recommendations(record: &BorrowerRecord, risk_score: f64) -> Recommendations {
    let mut recommendations = Recommendations::default();

    if record.loan_amount / record.monthly_income > LARGE_LOAN_INCOME_MULTIPLE {
        extend(
            &mut recommendations.payment_strategy,
            &[
                "Consider bi-weekly payments to reduce interest",
                "Allocate year-end bonus to loan payment",
            ],
        );
    }
    extend(
        &mut recommendations.payment_strategy,
        &borrower_strategies(record.borrower_type),
    );

    if risk_score > ELEVATED_RISK {
        extend(
            &mut recommendations.risk_mitigation,
            &[
                "Build emergency fund of 6 months",
                "Consider payment protection insurance",
                "Set up automatic payments to avoid delays",
            ],
        );
    } else if risk_score > MODERATE_RISK {
        extend(
            &mut recommendations.risk_mitigation,
            &[
                "Build emergency fund of 3 months",
                "Review monthly budget",
                "Consider income diversification",
            ],
        );
    }

    if record.credit_score < CREDIT_BUILDING_THRESHOLD {
        extend(
            &mut recommendations.financial_planning,
            &[
                "Focus on improving credit score",
                "Review and dispute any credit report errors",
                "Minimize new credit applications",
            ],
        );
    }

    recommendations
}

fn extend(target: &mut Vec<String>, items: &[&str]) {
    target.extend(items.iter().map(|item| item.to_string()));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringFrequency {
    Quarterly,
    Monthly,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub missed_payments: u32,
    pub credit_score_drop: u32,
    pub income_change: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            missed_payments: 1,
            credit_score_drop: 50,
            income_change: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringPlan {
    pub monitoring_frequency: MonitoringFrequency,
    pub required_checks: Vec<String>,
    pub alert_thresholds: AlertThresholds,
}

pub fn monitoring_plan(risk_score: f64) -> MonitoringPlan {
    let (frequency, check_count) = if risk_score < 0.3 {
        (MonitoringFrequency::Quarterly, 2)
    } else if risk_score < 0.7 {
        (MonitoringFrequency::Monthly, 3)
    } else {
        (MonitoringFrequency::Weekly, 4)
    };

    let checks = [
        "Payment History",
        "Credit Score",
        "Income Verification",
        "Expense Tracking",
    ];

    MonitoringPlan {
        monitoring_frequency: frequency,
        required_checks: checks[..check_count]
            .iter()
            .map(|check| check.to_string())
            .collect(),
        alert_thresholds: AlertThresholds::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::guidance::tests::common::borrower;

    #[test]
    fn business_borrower_with_good_credit_gets_only_type_strategies() {
        let recommendations = smart_recommendations(&borrower(), 0.2);
        assert_eq!(
            recommendations.payment_strategy,
            vec![
                "Align payments with business cash flow cycles",
                "Maintain separate business and personal accounts",
                "Explore invoice financing options",
            ]
        );
        assert!(recommendations.risk_mitigation.is_empty());
        assert!(recommendations.financial_planning.is_empty());
    }

    #[test]
    fn large_loans_lead_with_bi_weekly_advice() {
        let mut record = borrower();
        record.loan_amount = 150_000.0;
        record.borrower_type = BorrowerType::Farmer;
        let recommendations = smart_recommendations(&record, 0.5);

        assert_eq!(recommendations.payment_strategy.len(), 5);
        assert_eq!(
            recommendations.payment_strategy[0],
            "Consider bi-weekly payments to reduce interest"
        );
        assert_eq!(
            recommendations.payment_strategy[2],
            "Time payments with harvest cycles"
        );
        assert_eq!(
            recommendations.risk_mitigation[0],
            "Build emergency fund of 3 months"
        );
    }

    #[test]
    fn risk_mitigation_thresholds_are_exclusive() {
        let record = borrower();
        assert!(smart_recommendations(&record, 0.3).risk_mitigation.is_empty());
        assert_eq!(
            smart_recommendations(&record, 0.6).risk_mitigation[0],
            "Build emergency fund of 3 months"
        );
        assert_eq!(
            smart_recommendations(&record, 0.61).risk_mitigation[0],
            "Build emergency fund of 6 months"
        );
    }

    #[test]
    fn weak_credit_adds_financial_planning() {
        let mut record = borrower();
        record.credit_score = 699;
        record.borrower_type = BorrowerType::Student;
        let recommendations = smart_recommendations(&record, 0.1);
        assert_eq!(recommendations.financial_planning.len(), 3);
        assert_eq!(
            recommendations.payment_strategy[0],
            "Look for part-time work opportunities"
        );
    }

    #[test]
    fn monitoring_cadence_follows_risk_tier() {
        let low = monitoring_plan(0.29);
        assert_eq!(low.monitoring_frequency, MonitoringFrequency::Quarterly);
        assert_eq!(low.required_checks, vec!["Payment History", "Credit Score"]);

        let moderate = monitoring_plan(0.3);
        assert_eq!(moderate.monitoring_frequency, MonitoringFrequency::Monthly);
        assert_eq!(moderate.required_checks.len(), 3);

        let high = monitoring_plan(0.7);
        assert_eq!(high.monitoring_frequency, MonitoringFrequency::Weekly);
        assert_eq!(high.required_checks[3], "Expense Tracking");
        assert_eq!(high.alert_thresholds, AlertThresholds::default());
        assert_eq!(high.alert_thresholds.credit_score_drop, 50);
    }
}
