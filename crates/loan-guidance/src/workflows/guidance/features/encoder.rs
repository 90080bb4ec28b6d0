//! Label encoding with fit-once, transform-after semantics.
//!
//! Codes are dense and follow the sorted order of the labels seen at fit time. A code never
//! changes once assigned, so the encoder is persisted with the models trained against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::super::error::GuidanceError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncoderError {
    #[error("category '{value}' was never seen for field `{field}`")]
    UnknownCategory { field: String, value: String },
    #[error("field `{0}` has no fitted encoding")]
    UnfittedField(String),
}

impl From<EncoderError> for GuidanceError {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::UnknownCategory { field, value } => {
                GuidanceError::UnknownCategory { field, value }
            }
            EncoderError::UnfittedField(field) => GuidanceError::ModelUnavailable(format!(
                "categorical encoder has no mapping for `{field}`"
            )),
        }
    }
}

/// Mapping for a single categorical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEncoding {
    /// Labels in code order; a label's index is its code.
    classes: Vec<String>,
    /// Fit-time occurrence counts, parallel to `classes`.
    counts: Vec<u64>,
}

impl FieldEncoding {
    fn fit<S: AsRef<str>>(values: &[S]) -> Self {
        let mut tally: BTreeMap<&str, u64> = BTreeMap::new();
        for value in values {
            *tally.entry(value.as_ref()).or_default() += 1;
        }
        let (classes, counts) = tally
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .unzip();
        Self { classes, counts }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    fn code(&self, value: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(value))
            .ok()
    }

    fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Labels strictly ascending and one count per label. Lookups rely on both.
    pub fn is_well_formed(&self) -> bool {
        self.counts.len() == self.classes.len()
            && self.classes.windows(2).all(|pair| pair[0] < pair[1])
    }
}

/// Per-field label encoder state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    fields: BTreeMap<String, FieldEncoding>,
}

impl CategoricalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit `field` on first use and encode `values`. Once a field is fitted this behaves
    /// exactly like [`CategoricalEncoder::transform`].
    pub fn fit_transform<S: AsRef<str>>(
        &mut self,
        field: &str,
        values: &[S],
    ) -> Result<Vec<u32>, EncoderError> {
        if !self.fields.contains_key(field) {
            self.fields
                .insert(field.to_string(), FieldEncoding::fit(values));
        }
        self.transform(field, values)
    }

    pub fn transform<S: AsRef<str>>(
        &self,
        field: &str,
        values: &[S],
    ) -> Result<Vec<u32>, EncoderError> {
        let encoding = self.encoding(field)?;
        values
            .iter()
            .map(|value| {
                encoding
                    .code(value.as_ref())
                    .map(|code| code as u32)
                    .ok_or_else(|| EncoderError::UnknownCategory {
                        field: field.to_string(),
                        value: value.as_ref().to_string(),
                    })
            })
            .collect()
    }

    /// Relative frequency of `value` among the labels the field was fitted on.
    pub fn frequency(&self, field: &str, value: &str) -> Result<f64, EncoderError> {
        let encoding = self.encoding(field)?;
        let code = encoding
            .code(value)
            .ok_or_else(|| EncoderError::UnknownCategory {
                field: field.to_string(),
                value: value.to_string(),
            })?;
        let total = encoding.total();
        let count = encoding.counts.get(code).copied().unwrap_or(0);
        Ok(if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        })
    }

    pub fn is_fitted(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_well_formed(&self) -> bool {
        self.fields.values().all(FieldEncoding::is_well_formed)
    }

    pub fn encoding(&self, field: &str) -> Result<&FieldEncoding, EncoderError> {
        self.fields
            .get(field)
            .ok_or_else(|| EncoderError::UnfittedField(field.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_sorted_label_order() {
        let mut encoder = CategoricalEncoder::new();
        let codes = encoder
            .fit_transform("borrower_type", &["student", "business", "farmer", "business"])
            .expect("fit succeeds");
        assert_eq!(codes, vec![2, 0, 1, 0]);
        assert_eq!(
            encoder.encoding("borrower_type").expect("fitted").classes(),
            ["business", "farmer", "student"]
        );
    }

    #[test]
    fn same_category_keeps_its_code_across_calls() {
        let mut encoder = CategoricalEncoder::new();
        encoder
            .fit_transform("borrower_type", &["farmer", "student"])
            .expect("fit succeeds");
        let first = encoder.transform("borrower_type", &["student"]).expect("known");
        let second = encoder.transform("borrower_type", &["student"]).expect("known");
        assert_eq!(first, second);
    }

    #[test]
    fn refitting_a_fitted_field_keeps_its_mapping() {
        let mut encoder = CategoricalEncoder::new();
        encoder
            .fit_transform("borrower_type", &["farmer", "student"])
            .expect("fit succeeds");
        let err = encoder
            .fit_transform("borrower_type", &["business"])
            .expect_err("second fit must not extend the mapping");
        assert!(matches!(err, EncoderError::UnknownCategory { .. }));
    }

    #[test]
    fn unseen_category_fails_fast() {
        let mut encoder = CategoricalEncoder::new();
        encoder
            .fit_transform("borrower_type", &["business"])
            .expect("fit succeeds");
        match encoder.transform("borrower_type", &["farmer"]) {
            Err(EncoderError::UnknownCategory { field, value }) => {
                assert_eq!(field, "borrower_type");
                assert_eq!(value, "farmer");
            }
            other => panic!("expected unknown category, got {other:?}"),
        }
    }

    #[test]
    fn transform_before_fit_is_an_error() {
        let encoder = CategoricalEncoder::new();
        assert_eq!(
            encoder.transform("borrower_type", &["farmer"]),
            Err(EncoderError::UnfittedField("borrower_type".to_string()))
        );
        let mapped: GuidanceError = EncoderError::UnfittedField("borrower_type".into()).into();
        assert!(matches!(mapped, GuidanceError::ModelUnavailable(_)));
    }

    #[test]
    fn frequency_reflects_fit_time_counts() {
        let mut encoder = CategoricalEncoder::new();
        encoder
            .fit_transform("borrower_type", &["business", "business", "farmer", "student"])
            .expect("fit succeeds");
        assert_eq!(encoder.frequency("borrower_type", "business"), Ok(0.5));
        assert_eq!(encoder.frequency("borrower_type", "farmer"), Ok(0.25));
    }

    #[test]
    fn fitted_encodings_are_well_formed() {
        let mut encoder = CategoricalEncoder::new();
        encoder
            .fit_transform("borrower_type", &["student", "farmer", "business", "farmer"])
            .expect("fit succeeds");
        assert!(encoder.is_well_formed());
    }

    #[test]
    fn short_counts_and_unsorted_classes_are_malformed() {
        let short = FieldEncoding {
            classes: vec!["business".into(), "farmer".into(), "student".into()],
            counts: vec![4],
        };
        assert!(!short.is_well_formed());

        let unsorted = FieldEncoding {
            classes: vec!["student".into(), "farmer".into(), "business".into()],
            counts: vec![1, 1, 1],
        };
        assert!(!unsorted.is_well_formed());

        let duplicated = FieldEncoding {
            classes: vec!["farmer".into(), "farmer".into()],
            counts: vec![1, 1],
        };
        assert!(!duplicated.is_well_formed());
    }

    #[test]
    fn encoder_state_survives_serialization() {
        let mut encoder = CategoricalEncoder::new();
        encoder
            .fit_transform("borrower_type", &["student", "farmer"])
            .expect("fit succeeds");
        let json = serde_json::to_string(&encoder).expect("serializes");
        let restored: CategoricalEncoder = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(
            restored.transform("borrower_type", &["student"]),
            encoder.transform("borrower_type", &["student"])
        );
    }
}
