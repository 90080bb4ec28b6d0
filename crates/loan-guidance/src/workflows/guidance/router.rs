use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::composer::GuidancePackage;
use super::error::GuidanceError;
use super::service::LoanGuidanceService;

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub loan_amount: f64,
    pub term_months: u32,
    pub monthly_income: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuidanceResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub request_summary: RequestSummary,
    pub guidance: GuidancePackage,
}

/// Router builder exposing the guidance endpoint.
pub fn guidance_router(service: Arc<LoanGuidanceService>) -> Router {
    Router::new()
        .route("/api/v1/loans/guidance", post(guidance_handler))
        .with_state(service)
}

pub(crate) async fn guidance_handler(
    State(service): State<Arc<LoanGuidanceService>>,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    match service.guidance_for_json(body) {
        Ok((record, guidance)) => {
            let payload = GuidanceResponse {
                status: "success",
                timestamp: Utc::now(),
                request_summary: RequestSummary {
                    loan_amount: record.loan_amount,
                    term_months: record.loan_term_months,
                    monthly_income: record.monthly_income,
                },
                guidance,
            };
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) fn status_for(err: &GuidanceError) -> StatusCode {
    match err {
        GuidanceError::Validation { .. } => StatusCode::BAD_REQUEST,
        GuidanceError::UnknownCategory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GuidanceError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GuidanceError::FeatureComputation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: GuidanceError) -> Response {
    let status = status_for(&err);
    if err.is_client_error() {
        warn!(error = %err, "guidance request rejected");
    } else {
        error!(error = %err, "guidance request failed");
    }

    let mut payload = json!({
        "status": "error",
        "error": err.to_string(),
    });
    match &err {
        GuidanceError::Validation { field, .. } => payload["field"] = json!(field),
        GuidanceError::UnknownCategory { field, value } => {
            payload["field"] = json!(field);
            payload["value"] = json!(value);
        }
        _ => {}
    }
    (status, axum::Json(payload)).into_response()
}
