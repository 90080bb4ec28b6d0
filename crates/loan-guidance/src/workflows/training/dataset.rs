use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::workflows::guidance::{
    BorrowerRecord, BorrowerType, GuidanceError, LoanStatus, PaymentRecord, SectorData,
};

#[derive(Debug)]
pub enum DatasetError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row {
        line: u64,
        field: String,
        reason: String,
    },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::Io(err) => write!(f, "failed to read training data: {}", err),
            DatasetError::Csv(err) => write!(f, "invalid training CSV: {}", err),
            DatasetError::Row {
                line,
                field,
                reason,
            } => write!(f, "line {line}: invalid `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Io(err) => Some(err),
            DatasetError::Csv(err) => Some(err),
            DatasetError::Row { .. } => None,
        }
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub fn load_training_csv(path: impl AsRef<Path>) -> Result<Vec<BorrowerRecord>, DatasetError> {
    let file = File::open(path)?;
    read_training_csv(file)
}

/// Parse labelled borrower rows. `sector_data` and `payment_history` are JSON cells.
pub fn read_training_csv<R: Read>(reader: R) -> Result<Vec<BorrowerRecord>, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut records = Vec::new();

    for raw in csv_reader.records() {
        let raw = raw?;
        let line = raw.position().map_or(0, |position| position.line());
        let row: TrainingRow = raw.deserialize(Some(&headers))?;
        records.push(row.into_record(line)?);
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct TrainingRow {
    monthly_income: f64,
    loan_amount: f64,
    interest_rate: f64,
    loan_term_months: u32,
    credit_score: u16,
    age: u16,
    borrower_type: String,
    #[serde(default)]
    sector_data: String,
    #[serde(default)]
    payment_history: String,
    loan_status: String,
}

impl TrainingRow {
    fn into_record(self, line: u64) -> Result<BorrowerRecord, DatasetError> {
        let row_error = |field: &str, reason: String| DatasetError::Row {
            line,
            field: field.to_string(),
            reason,
        };

        let borrower_type = BorrowerType::parse(&self.borrower_type).ok_or_else(|| {
            row_error(
                "borrower_type",
                format!("unknown borrower type '{}'", self.borrower_type),
            )
        })?;
        let loan_status = LoanStatus::parse(&self.loan_status).ok_or_else(|| {
            row_error(
                "loan_status",
                format!("unknown loan status '{}'", self.loan_status),
            )
        })?;

        let record = BorrowerRecord {
            monthly_income: self.monthly_income,
            loan_amount: self.loan_amount,
            interest_rate: self.interest_rate,
            loan_term_months: self.loan_term_months,
            credit_score: self.credit_score,
            age: self.age,
            borrower_type,
            sector_data: parse_sector(&self.sector_data),
            payment_history: parse_history(&self.payment_history),
            loan_status: Some(loan_status),
        };

        record.validate().map_err(|err| match err {
            GuidanceError::Validation { field, reason } => DatasetError::Row {
                line,
                field,
                reason,
            },
            other => row_error("record", other.to_string()),
        })?;
        Ok(record)
    }
}

/// JSON first; exports that used single-quoted keys are retried with the quotes swapped.
fn parse_json_cell(raw: &str) -> Option<Value> {
    serde_json::from_str(raw)
        .ok()
        .or_else(|| serde_json::from_str(&raw.replace('\'', "\"")).ok())
}

fn parse_sector(raw: &str) -> SectorData {
    let sector = parse_json_cell(raw)
        .map(|value| SectorData::from_json_lossy(&value))
        .unwrap_or(SectorData::Unrecognized);
    if sector == SectorData::Unrecognized {
        warn!(raw, "sector metadata unreadable; scoring neutral");
    }
    sector
}

fn parse_history(raw: &str) -> Vec<PaymentRecord> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match parse_json_cell(raw).map(serde_json::from_value::<Vec<PaymentRecord>>) {
        Some(Ok(history)) => history,
        _ => {
            warn!(raw, "payment history unreadable; treating as empty");
            Vec::new()
        }
    }
}
