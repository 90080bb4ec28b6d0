//! Rule-table scoring of sector metadata.
//!
//! Each sector carries a base risk and a list of attribute modifiers. Modifiers are either a
//! categorical table keyed by the attribute's string form or a numeric threshold. Sector
//! metadata is advisory, so anything malformed scores as neutral instead of failing the
//! request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::super::domain::{AttributeValue, SectorData, SectorKind};

pub const NEUTRAL_SECTOR_RISK: f64 = 0.5;

/// Adjustment applied for a single sector attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectorModifier {
    Table {
        entries: BTreeMap<String, f64>,
    },
    Threshold {
        cutoff: f64,
        above: f64,
        at_or_below: f64,
    },
}

impl SectorModifier {
    fn table(entries: &[(&str, f64)]) -> Self {
        SectorModifier::Table {
            entries: entries
                .iter()
                .map(|(key, delta)| (key.to_string(), *delta))
                .collect(),
        }
    }

    fn apply(&self, attribute: &str, value: &AttributeValue) -> Result<f64, SectorRuleError> {
        match self {
            SectorModifier::Table { entries } => {
                Ok(entries.get(&value.lookup_key()).copied().unwrap_or(0.0))
            }
            SectorModifier::Threshold {
                cutoff,
                above,
                at_or_below,
            } => {
                let number = value
                    .as_number()
                    .ok_or_else(|| SectorRuleError::NotNumeric(attribute.to_string()))?;
                Ok(if number > *cutoff { *above } else { *at_or_below })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeModifier {
    pub attribute: String,
    pub modifier: SectorModifier,
}

/// Base risk and modifiers for one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRiskRule {
    pub base: f64,
    pub modifiers: Vec<AttributeModifier>,
}

impl SectorRiskRule {
    fn new(base: f64, modifiers: Vec<(&str, SectorModifier)>) -> Self {
        Self {
            base,
            modifiers: modifiers
                .into_iter()
                .map(|(attribute, modifier)| AttributeModifier {
                    attribute: attribute.to_string(),
                    modifier,
                })
                .collect(),
        }
    }
}

/// Static rule table, loaded once and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRiskRules {
    pub rules: BTreeMap<SectorKind, SectorRiskRule>,
}

impl SectorRiskRules {
    pub fn standard() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            SectorKind::Farming,
            SectorRiskRule::new(
                0.7,
                vec![
                    (
                        "irrigation_type",
                        SectorModifier::table(&[("rainfed", 0.2), ("irrigated", -0.1)]),
                    ),
                    (
                        "land_ownership",
                        SectorModifier::table(&[("leased", 0.1), ("owned", -0.1)]),
                    ),
                    (
                        "crop_diversity",
                        SectorModifier::Threshold {
                            cutoff: 2.0,
                            above: -0.1,
                            at_or_below: 0.1,
                        },
                    ),
                ],
            ),
        );
        rules.insert(
            SectorKind::Business,
            SectorRiskRule::new(
                0.5,
                vec![
                    (
                        "years",
                        SectorModifier::Threshold {
                            cutoff: 5.0,
                            above: -0.1,
                            at_or_below: 0.1,
                        },
                    ),
                    (
                        "type",
                        SectorModifier::table(&[
                            ("retail", 0.1),
                            ("manufacturing", 0.2),
                            ("service", 0.0),
                        ]),
                    ),
                ],
            ),
        );
        rules.insert(
            SectorKind::Student,
            SectorRiskRule::new(
                0.3,
                vec![(
                    "course_type",
                    SectorModifier::table(&[
                        ("engineering", -0.1),
                        ("medical", -0.1),
                        ("business", 0.0),
                        ("arts", 0.1),
                    ]),
                )],
            ),
        );
        Self { rules }
    }
}

impl Default for SectorRiskRules {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, thiserror::Error)]
enum SectorRuleError {
    #[error("attribute `{0}` must be numeric for a threshold rule")]
    NotNumeric(String),
}

/// Maps sector metadata to a risk scalar in `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct SectorRiskEvaluator {
    rules: SectorRiskRules,
}

impl SectorRiskEvaluator {
    pub fn new(rules: SectorRiskRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SectorRiskRules {
        &self.rules
    }

    pub fn evaluate(&self, sector: &SectorData) -> f64 {
        match self.try_evaluate(sector) {
            Ok(risk) => risk,
            Err(err) => {
                debug!(
                    sector = sector.kind().map_or("unrecognized", SectorKind::key),
                    error = %err,
                    "sector risk fell back to neutral"
                );
                NEUTRAL_SECTOR_RISK
            }
        }
    }

    /// Score loosely typed sector metadata; anything that is not a single known sector
    /// object scores neutral.
    pub fn evaluate_json(&self, raw: &Value) -> f64 {
        self.evaluate(&SectorData::from_json_lossy(raw))
    }

    fn try_evaluate(&self, sector: &SectorData) -> Result<f64, SectorRuleError> {
        let Some(rule) = sector.kind().and_then(|kind| self.rules.rules.get(&kind)) else {
            return Ok(NEUTRAL_SECTOR_RISK);
        };

        let mut risk = rule.base;
        for entry in &rule.modifiers {
            if let Some(value) = sector.attribute(&entry.attribute) {
                risk += entry.modifier.apply(&entry.attribute, value)?;
            }
        }

        Ok(risk.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::guidance::domain::{BusinessProfile, FarmingProfile, StudentProfile};
    use serde_json::json;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn established_retail_business_nets_to_base() {
        let evaluator = SectorRiskEvaluator::default();
        let risk = evaluator.evaluate_json(&json!({"business": {"years": 6, "type": "retail"}}));
        assert!(close(risk, 0.5), "{risk}");
    }

    #[test]
    fn young_manufacturer_accumulates_modifiers() {
        let evaluator = SectorRiskEvaluator::default();
        let sector = SectorData::Business(BusinessProfile {
            years: Some(AttributeValue::Number(2.0)),
            business_type: Some(AttributeValue::Text("manufacturing".into())),
        });
        assert!(close(evaluator.evaluate(&sector), 0.8));
    }

    #[test]
    fn rainfed_leased_farm_clamps_to_one() {
        let evaluator = SectorRiskEvaluator::default();
        let sector = SectorData::Farming(FarmingProfile {
            irrigation_type: Some(AttributeValue::Text("rainfed".into())),
            land_ownership: Some(AttributeValue::Text("leased".into())),
            crop_diversity: Some(AttributeValue::Number(1.0)),
        });
        assert!(close(evaluator.evaluate(&sector), 1.0));
    }

    #[test]
    fn unknown_categories_and_missing_attributes_add_nothing() {
        let evaluator = SectorRiskEvaluator::default();
        let sector = SectorData::Student(StudentProfile {
            course_type: Some(AttributeValue::Text("astronomy".into())),
        });
        assert!(close(evaluator.evaluate(&sector), 0.3));
        let bare = SectorData::Student(StudentProfile::default());
        assert!(close(evaluator.evaluate(&bare), 0.3));
        assert!(close(evaluator.evaluate(&SectorData::Unrecognized), NEUTRAL_SECTOR_RISK));
    }

    #[test]
    fn engineering_student_lowers_risk() {
        let evaluator = SectorRiskEvaluator::default();
        let risk = evaluator.evaluate_json(&json!({"student": {"course_type": "engineering"}}));
        assert!(close(risk, 0.2), "{risk}");
    }

    #[test]
    fn non_numeric_threshold_input_is_neutral() {
        let evaluator = SectorRiskEvaluator::default();
        let risk = evaluator.evaluate_json(&json!({"business": {"years": "six", "type": "retail"}}));
        assert!(close(risk, NEUTRAL_SECTOR_RISK));
    }

    #[test]
    fn malformed_metadata_is_neutral() {
        let evaluator = SectorRiskEvaluator::default();
        assert!(close(evaluator.evaluate_json(&json!(null)), 0.5));
        assert!(close(evaluator.evaluate_json(&json!({"mining": {"depth": 3}})), 0.5));
        assert!(close(
            evaluator.evaluate_json(&json!("{'business': {'years': 6}}")),
            0.5
        ));
    }

    #[test]
    fn sectors_without_rules_use_neutral_base() {
        let mut rules = SectorRiskRules::standard();
        rules.rules.remove(&SectorKind::Farming);
        let evaluator = SectorRiskEvaluator::new(rules);
        let risk = evaluator.evaluate_json(&json!({"farming": {"crop_diversity": 5}}));
        assert!(close(risk, NEUTRAL_SECTOR_RISK));
    }

    #[test]
    fn rules_round_trip_through_json_configuration() {
        let rules = SectorRiskRules::standard();
        let encoded = serde_json::to_string(&rules).expect("rules serialize");
        let decoded: SectorRiskRules = serde_json::from_str(&encoded).expect("rules parse");
        assert_eq!(decoded, rules);
    }
}
