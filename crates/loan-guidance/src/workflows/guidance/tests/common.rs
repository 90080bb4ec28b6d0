use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use crate::workflows::guidance::domain::{
    AttributeValue, BorrowerRecord, BorrowerType, BusinessProfile, FarmingProfile, LoanStatus,
    PaymentRecord, SectorData, StudentProfile,
};
use crate::workflows::guidance::{FixedClock, LoanGuidanceService, ModelArtifact};
use crate::workflows::training::{TrainingOptions, TrainingWorkflow};

pub(crate) const TEST_FIT_ID: &str = "fit-test";

pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Business borrower used across composer, service, and routing tests.
pub(crate) fn borrower() -> BorrowerRecord {
    BorrowerRecord {
        monthly_income: 5000.0,
        loan_amount: 50000.0,
        interest_rate: 8.5,
        loan_term_months: 36,
        credit_score: 720,
        age: 30,
        borrower_type: BorrowerType::Business,
        sector_data: SectorData::Business(BusinessProfile {
            years: Some(AttributeValue::Number(6.0)),
            business_type: Some(AttributeValue::Text("retail".to_string())),
        }),
        payment_history: vec![PaymentRecord {
            due_date: date(2023, 1, 1),
            payment_date: date(2023, 1, 1),
            amount_paid: Some(1500.0),
        }],
        loan_status: None,
    }
}

pub(crate) fn request_body() -> Value {
    json!({
        "monthly_income": 5000,
        "loan_amount": 50000,
        "interest_rate": 8.5,
        "loan_term_months": 36,
        "credit_score": 720,
        "age": 30,
        "borrower_type": "business",
        "sector_data": { "business": { "years": 6, "type": "retail" } },
        "payment_history": [
            { "due_date": "2023-01-01", "payment_date": "2023-01-01", "amount_paid": 1500 }
        ]
    })
}

/// Deterministic labelled rows covering every borrower type and both outcomes.
pub(crate) fn training_records(count: usize) -> Vec<BorrowerRecord> {
    (0..count)
        .map(|index| {
            let step = index as u32;
            let credit_score = 480 + ((step * 37) % 360) as u16;
            let monthly_income = 2000.0 + f64::from((step * 613) % 6000);
            let loan_term_months = [12, 24, 36, 60][index % 4];
            let loan_amount = 5000.0 + f64::from((step * 1711) % 45000);
            let delay = i64::from((step * 5) % 21);

            let (borrower_type, sector_data) = match index % 3 {
                0 => (
                    BorrowerType::Farmer,
                    SectorData::Farming(FarmingProfile {
                        irrigation_type: Some(AttributeValue::Text(
                            if index % 2 == 0 { "rainfed" } else { "irrigated" }.to_string(),
                        )),
                        land_ownership: Some(AttributeValue::Text("owned".to_string())),
                        crop_diversity: Some(AttributeValue::Number(f64::from(step % 5))),
                    }),
                ),
                1 => (
                    BorrowerType::Business,
                    SectorData::Business(BusinessProfile {
                        years: Some(AttributeValue::Number(f64::from(step % 10))),
                        business_type: Some(AttributeValue::Text("service".to_string())),
                    }),
                ),
                _ => (
                    BorrowerType::Student,
                    SectorData::Student(StudentProfile {
                        course_type: Some(AttributeValue::Text("engineering".to_string())),
                    }),
                ),
            };

            let due = date(2023, 1, 1) + chrono::Duration::days(i64::from(step % 28));
            let payment_history = vec![
                PaymentRecord {
                    due_date: due,
                    payment_date: due + chrono::Duration::days(delay),
                    amount_paid: Some(400.0 + f64::from(step % 9) * 25.0),
                },
                PaymentRecord {
                    due_date: due + chrono::Duration::days(30),
                    payment_date: due + chrono::Duration::days(30 + delay / 2),
                    amount_paid: Some(400.0),
                },
            ];

            let defaulted = credit_score < 560 || (delay > 15 && index % 2 == 1);
            let loan_status = if defaulted {
                LoanStatus::ChargedOff
            } else if index % 5 == 0 {
                LoanStatus::FullyPaid
            } else {
                LoanStatus::Current
            };

            BorrowerRecord {
                monthly_income,
                loan_amount,
                interest_rate: 4.0 + f64::from(step % 16),
                loan_term_months,
                credit_score,
                age: 19 + (step % 50) as u16,
                borrower_type,
                sector_data,
                payment_history,
                loan_status: Some(loan_status),
            }
        })
        .collect()
}

pub(crate) fn trained_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 15, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn trained_artifact() -> ModelArtifact {
    TrainingWorkflow::new(TrainingOptions {
        fit_id: Some(TEST_FIT_ID.to_string()),
        cv_folds: 0,
        ..TrainingOptions::default()
    })
    .train_at(&training_records(90), trained_at())
    .expect("training succeeds")
    .artifact
}

pub(crate) fn ready_service() -> Arc<LoanGuidanceService> {
    Arc::new(
        LoanGuidanceService::new(Arc::new(trained_artifact()))
            .with_clock(Arc::new(FixedClock(today()))),
    )
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
