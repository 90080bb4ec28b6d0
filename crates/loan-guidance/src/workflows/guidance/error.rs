/// Errors surfaced by the guidance pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GuidanceError {
    #[error("invalid `{field}`: {reason}")]
    Validation { field: String, reason: String },
    #[error("category '{value}' for `{field}` was not seen when the model was trained")]
    UnknownCategory { field: String, value: String },
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("feature `{feature}` is not finite for row {row}")]
    FeatureComputation { feature: &'static str, row: usize },
}

impl GuidanceError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller can correct the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GuidanceError::Validation { .. } | GuidanceError::UnknownCategory { .. }
        )
    }
}
