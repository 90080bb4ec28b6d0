use std::sync::Arc;

use super::common::*;
use serde_json::json;

use crate::workflows::guidance::domain::{BorrowerType, SectorData, StudentProfile};
use crate::workflows::guidance::{GuidanceError, LoanGuidanceService};

#[test]
fn unavailable_service_rejects_every_request() {
    let service = LoanGuidanceService::unavailable("artifact still loading");
    assert!(!service.is_ready());
    assert!(service.artifact().is_none());
    assert_eq!(
        service.generate_guidance(&borrower()),
        Err(GuidanceError::ModelUnavailable(
            "artifact still loading".to_string()
        ))
    );
    assert!(matches!(
        service.guidance_for_json(json!({})),
        Err(GuidanceError::ModelUnavailable(_))
    ));
}

#[test]
fn assessment_stays_within_model_ranges() {
    let service = ready_service();
    assert!(service.is_ready());
    let assessment = service.assess(&borrower()).expect("assessment");
    assert!((0.0..=1.0).contains(&assessment.risk_score));
    assert!(assessment.predicted_payment.is_finite());
}

#[test]
fn repeated_requests_score_identically() {
    let service = ready_service();
    let first = service.generate_guidance(&borrower()).expect("guidance");
    let second = service.generate_guidance(&borrower()).expect("guidance");
    assert_eq!(first, second);
}

#[test]
fn fixed_clock_yields_a_full_thirty_six_month_schedule() {
    let service = ready_service();
    let package = service.generate_guidance(&borrower()).expect("guidance");
    let schedule = &package.payment_plan.payment_schedule;

    assert_eq!(schedule.len(), 36);
    assert_eq!(schedule[0].due_date, today());
    assert_eq!(schedule[1].due_date, today() + chrono::Duration::days(30));
    assert!(schedule.iter().all(|entry| entry.remaining_balance >= 0.0));
    assert!(package
        .recommendations
        .payment_strategy
        .iter()
        .any(|line| line == "Align payments with business cash flow cycles"));
}

#[test]
fn invalid_records_fail_validation_before_scoring() {
    let service = ready_service();
    let mut record = borrower();
    record.credit_score = 900;
    match service.assess(&record) {
        Err(GuidanceError::Validation { field, .. }) => assert_eq!(field, "credit_score"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn categories_missing_from_the_fitted_encoder_are_unknown() {
    let artifact = {
        let mut artifact = trained_artifact();
        let business_only = vec![borrower(); 3];
        let mut encoder = crate::workflows::guidance::features::CategoricalEncoder::new();
        artifact
            .pipeline()
            .fit_encoder(&business_only, &mut encoder)
            .expect("encoder fits");
        artifact.encoder.state = encoder;
        artifact
    };
    let service = LoanGuidanceService::new(Arc::new(artifact));

    let mut record = borrower();
    record.borrower_type = BorrowerType::Student;
    record.sector_data = SectorData::Student(StudentProfile::default());
    match service.generate_guidance(&record) {
        Err(GuidanceError::UnknownCategory { field, value }) => {
            assert_eq!(field, "borrower_type");
            assert_eq!(value, "student");
        }
        other => panic!("expected unknown category, got {other:?}"),
    }
}

#[test]
fn json_bodies_report_the_missing_field() {
    let service = ready_service();
    let mut body = request_body();
    body.as_object_mut()
        .expect("object body")
        .remove("sector_data");
    match service.guidance_for_json(body) {
        Err(GuidanceError::Validation { field, .. }) => assert_eq!(field, "sector_data"),
        other => panic!("expected validation error, got {other:?}"),
    }

    let (record, package) = service
        .guidance_for_json(request_body())
        .expect("guidance");
    assert_eq!(record.loan_term_months, 36);
    assert_eq!(package.payment_plan.payment_schedule.len(), 36);
}
