use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::GuidanceError;

/// Fields a guidance request must carry before it is deserialized.
pub const REQUIRED_FIELDS: [&str; 8] = [
    "monthly_income",
    "loan_amount",
    "interest_rate",
    "loan_term_months",
    "credit_score",
    "age",
    "borrower_type",
    "sector_data",
];

/// One applicant's loan parameters and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowerRecord {
    pub monthly_income: f64,
    pub loan_amount: f64,
    pub interest_rate: f64,
    pub loan_term_months: u32,
    pub credit_score: u16,
    pub age: u16,
    pub borrower_type: BorrowerType,
    /// Unreadable sector metadata becomes [`SectorData::Unrecognized`] and scores neutral.
    #[serde(deserialize_with = "deserialize_sector_lossy")]
    pub sector_data: SectorData,
    #[serde(default)]
    pub payment_history: Vec<PaymentRecord>,
    /// Training label only; ignored by the inference path, so unknown labels read as `None`.
    #[serde(
        default,
        deserialize_with = "deserialize_status_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub loan_status: Option<LoanStatus>,
}

impl BorrowerRecord {
    /// Parse an untyped request body, naming the first missing field when one is absent.
    pub fn from_json(value: Value) -> Result<Self, GuidanceError> {
        let Value::Object(map) = &value else {
            return Err(GuidanceError::validation(
                "request",
                "expected a JSON object",
            ));
        };

        if let Some(missing) = REQUIRED_FIELDS
            .iter()
            .find(|field| map.get(**field).map_or(true, Value::is_null))
        {
            return Err(GuidanceError::validation(*missing, "missing required field"));
        }

        let record: BorrowerRecord = serde_json::from_value(value)
            .map_err(|err| GuidanceError::validation("request", err.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Range checks mirrored from the intake contract.
    pub fn validate(&self) -> Result<(), GuidanceError> {
        if !(self.monthly_income.is_finite() && self.monthly_income > 0.0) {
            return Err(GuidanceError::validation(
                "monthly_income",
                "must be greater than 0",
            ));
        }
        if !(self.loan_amount.is_finite() && self.loan_amount > 0.0) {
            return Err(GuidanceError::validation(
                "loan_amount",
                "must be greater than 0",
            ));
        }
        if !(self.interest_rate > 0.0 && self.interest_rate <= 100.0) {
            return Err(GuidanceError::validation(
                "interest_rate",
                "must be within (0, 100]",
            ));
        }
        if !(1..=360).contains(&self.loan_term_months) {
            return Err(GuidanceError::validation(
                "loan_term_months",
                "must be within 1..=360",
            ));
        }
        if !(300..=850).contains(&self.credit_score) {
            return Err(GuidanceError::validation(
                "credit_score",
                "must be within 300..=850",
            ));
        }
        if self.age < 18 {
            return Err(GuidanceError::validation("age", "must be at least 18"));
        }
        for (index, payment) in self.payment_history.iter().enumerate() {
            if payment.amount_paid.map_or(false, |amount| !amount.is_finite()) {
                return Err(GuidanceError::validation(
                    format!("payment_history[{index}].amount_paid"),
                    "must be a finite number",
                ));
            }
        }
        Ok(())
    }

    /// Raw loan-to-lifetime-income ratio, used for rule-based factors.
    pub fn raw_debt_to_income(&self) -> f64 {
        self.loan_amount / (self.monthly_income * self.loan_term_months as f64)
    }
}

/// Borrower segment used for categorical encoding and recommendation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowerType {
    Farmer,
    Business,
    Student,
}

impl BorrowerType {
    pub const fn label(self) -> &'static str {
        match self {
            BorrowerType::Farmer => "farmer",
            BorrowerType::Business => "business",
            BorrowerType::Student => "student",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "farmer" => Some(Self::Farmer),
            "business" => Some(Self::Business),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

impl fmt::Display for BorrowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for BorrowerType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        BorrowerType::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "borrower_type must be one of farmer, business, student (got '{raw}')"
            ))
        })
    }
}

/// Outcome label attached to historical loans in the training set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    Current,
    #[serde(rename = "Fully Paid")]
    FullyPaid,
    Late,
    #[serde(rename = "Charged Off")]
    ChargedOff,
}

impl LoanStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "current" => Some(Self::Current),
            "fully paid" => Some(Self::FullyPaid),
            "late" => Some(Self::Late),
            "charged off" => Some(Self::ChargedOff),
            _ => None,
        }
    }

    pub const fn is_default(self) -> bool {
        matches!(self, LoanStatus::ChargedOff)
    }
}

/// Single scheduled installment with the date it was actually settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(deserialize_with = "deserialize_date")]
    pub due_date: NaiveDate,
    #[serde(deserialize_with = "deserialize_date")]
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub amount_paid: Option<f64>,
}

/// Sector attribute value; the intake format allows either numbers or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Key used for categorical lookups. Whole numbers print without a fractional part.
    pub fn lookup_key(&self) -> String {
        match self {
            AttributeValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                format!("{}", *value as i64)
            }
            AttributeValue::Number(value) => value.to_string(),
            AttributeValue::Text(text) => text.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(value) => Some(*value),
            AttributeValue::Text(_) => None,
        }
    }
}

/// Closed set of sector-specific attribute records. Exactly one sector key is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorData {
    Farming(FarmingProfile),
    Business(BusinessProfile),
    Student(StudentProfile),
    /// Metadata that could not be read; scores as neutral sector risk.
    #[serde(skip_deserializing)]
    Unrecognized,
}

impl SectorData {
    pub const fn kind(&self) -> Option<SectorKind> {
        match self {
            SectorData::Farming(_) => Some(SectorKind::Farming),
            SectorData::Business(_) => Some(SectorKind::Business),
            SectorData::Student(_) => Some(SectorKind::Student),
            SectorData::Unrecognized => None,
        }
    }

    /// Attribute lookup by its wire name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        match (self, name) {
            (SectorData::Farming(profile), "irrigation_type") => profile.irrigation_type.as_ref(),
            (SectorData::Farming(profile), "land_ownership") => profile.land_ownership.as_ref(),
            (SectorData::Farming(profile), "crop_diversity") => profile.crop_diversity.as_ref(),
            (SectorData::Business(profile), "years") => profile.years.as_ref(),
            (SectorData::Business(profile), "type") => profile.business_type.as_ref(),
            (SectorData::Student(profile), "course_type") => profile.course_type.as_ref(),
            _ => None,
        }
    }

    /// Convert loosely typed metadata. Returns `None` unless the value is an object with
    /// exactly one known sector key.
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Like [`SectorData::from_json`], but keeps unreadable metadata as `Unrecognized`.
    pub fn from_json_lossy(value: &Value) -> Self {
        Self::from_json(value).unwrap_or(SectorData::Unrecognized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorKind {
    Farming,
    Business,
    Student,
}

impl SectorKind {
    pub const fn key(self) -> &'static str {
        match self {
            SectorKind::Farming => "farming",
            SectorKind::Business => "business",
            SectorKind::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmingProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irrigation_type: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_ownership: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_diversity: Option<AttributeValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years: Option<AttributeValue>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub business_type: Option<AttributeValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_type: Option<AttributeValue>,
}

/// Parse a `YYYY-MM-DD` date, naming the rejected input on failure.
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_sector_lossy<'de, D>(deserializer: D) -> Result<SectorData, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(SectorData::from_json_lossy(&raw))
}

fn deserialize_status_lenient<'de, D>(deserializer: D) -> Result<Option<LoanStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(LoanStatus::parse))
}
