use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::round_to;
use crate::workflows::guidance::domain::BorrowerRecord;

/// Periods are a flat 30 days apart, not calendar months.
const PERIOD_DAYS: i64 = 30;
const REMINDER_OFFSETS: [i64; 3] = [7, 3, 0];
const EARLY_PAYOFF_MONTHS: u32 = 6;
const EXTRA_PAYMENT_SHARE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub payment_number: u32,
    pub due_date: NaiveDate,
    pub payment_amount: f64,
    pub principal: f64,
    pub interest: f64,
    pub remaining_balance: f64,
    pub reminder_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiWeeklyImpact {
    pub payment_amount: f64,
    pub yearly_savings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiWeeklyOption {
    pub available: bool,
    pub impact: BiWeeklyImpact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraPaymentOption {
    pub available: bool,
    pub min_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibilityOptions {
    pub bi_weekly_option: BiWeeklyOption,
    pub extra_payment_option: ExtraPaymentOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyPaymentBenefits {
    pub potential_savings: f64,
    /// Months.
    pub time_saved: u32,
    pub reduced_interest: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub monthly_payment: f64,
    pub payment_schedule: Vec<ScheduledPayment>,
    pub flexibility_options: FlexibilityOptions,
    pub early_payment_benefits: EarlyPaymentBenefits,
}

/// Amortize `monthly_payment` against the loan for every period of the term.
///
/// The running balance is not floored, only the displayed one, so an overpaying schedule
/// keeps reporting zero rather than a negative balance.
pub fn create_detailed_schedule(
    record: &BorrowerRecord,
    monthly_payment: f64,
    today: NaiveDate,
) -> Vec<ScheduledPayment> {
    let mut balance = record.loan_amount;
    (0..record.loan_term_months)
        .map(|period| {
            let due_date = today + Duration::days(PERIOD_DAYS * i64::from(period));
            let interest = balance * record.interest_rate / 1200.0;
            let principal = monthly_payment - interest;
            balance -= principal;

            ScheduledPayment {
                payment_number: period + 1,
                due_date,
                payment_amount: round_to(monthly_payment, 2),
                principal: round_to(principal, 2),
                interest: round_to(interest, 2),
                remaining_balance: round_to(balance.max(0.0), 2),
                reminder_dates: REMINDER_OFFSETS
                    .iter()
                    .map(|offset| due_date - Duration::days(*offset))
                    .collect(),
            }
        })
        .collect()
}

pub fn flexibility_options(record: &BorrowerRecord) -> FlexibilityOptions {
    let straight_line = record.loan_amount / f64::from(record.loan_term_months);
    FlexibilityOptions {
        bi_weekly_option: BiWeeklyOption {
            available: true,
            impact: BiWeeklyImpact {
                payment_amount: round_to(straight_line / 2.0, 2),
                yearly_savings: round_to(straight_line * 0.5, 2),
            },
        },
        extra_payment_option: ExtraPaymentOption {
            available: true,
            min_amount: record.monthly_income * EXTRA_PAYMENT_SHARE,
        },
    }
}

/// Simple-interest approximation of paying the loan off six months early.
pub fn early_payment_benefits(record: &BorrowerRecord) -> EarlyPaymentBenefits {
    let rate = record.interest_rate / 100.0;
    let term = f64::from(record.loan_term_months);
    let regular_total = record.loan_amount * (1.0 + rate * term / 12.0);
    let early_total =
        record.loan_amount * (1.0 + rate * (term - f64::from(EARLY_PAYOFF_MONTHS)) / 12.0);
    let savings = round_to(regular_total - early_total, 2);

    EarlyPaymentBenefits {
        potential_savings: savings,
        time_saved: EARLY_PAYOFF_MONTHS,
        reduced_interest: savings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::guidance::tests::common::borrower;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
    }

    #[test]
    fn schedule_has_one_entry_per_period_with_reminders() {
        let record = borrower();
        let schedule = create_detailed_schedule(&record, 1578.0, today());

        assert_eq!(schedule.len(), 36);
        let first = &schedule[0];
        assert_eq!(first.payment_number, 1);
        assert_eq!(first.due_date, today());
        assert_eq!(
            first.reminder_dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 23).expect("valid"),
                NaiveDate::from_ymd_opt(2024, 2, 27).expect("valid"),
                today(),
            ]
        );
        assert_eq!(schedule[1].due_date, NaiveDate::from_ymd_opt(2024, 3, 31).expect("valid"));
        assert_eq!(schedule[35].payment_number, 36);
    }

    #[test]
    fn first_period_splits_interest_and_principal() {
        let record = borrower();
        let schedule = create_detailed_schedule(&record, 1578.0, today());
        // 50000 * 8.5 / 1200 = 354.1666...
        assert_eq!(schedule[0].interest, 354.17);
        assert_eq!(schedule[0].principal, 1223.83);
        assert_eq!(schedule[0].remaining_balance, 48776.17);
    }

    #[test]
    fn zero_interest_schedule_retires_principal_evenly() {
        let mut record = borrower();
        record.loan_amount = 1200.0;
        record.loan_term_months = 12;
        record.interest_rate = 0.0;

        let schedule = create_detailed_schedule(&record, 100.0, today());
        assert_eq!(schedule.len(), 12);
        assert!(schedule.iter().all(|entry| entry.interest == 0.0 && entry.principal == 100.0));
        assert_eq!(schedule[11].remaining_balance, 0.0);
    }

    #[test]
    fn overpayment_floors_displayed_balance_at_zero() {
        let mut record = borrower();
        record.loan_term_months = 3;
        let schedule = create_detailed_schedule(&record, 40000.0, today());
        assert_eq!(schedule[1].remaining_balance, 0.0);
        assert_eq!(schedule[2].remaining_balance, 0.0);
        assert!(schedule[2].interest < 0.0);
    }

    #[test]
    fn flexibility_and_early_payment_figures() {
        let record = borrower();
        let options = flexibility_options(&record);
        assert_eq!(options.bi_weekly_option.impact.payment_amount, 694.44);
        assert_eq!(options.bi_weekly_option.impact.yearly_savings, 694.44);
        assert_eq!(options.extra_payment_option.min_amount, 500.0);

        let benefits = early_payment_benefits(&record);
        // 50000 * 0.085 * 6 / 12
        assert_eq!(benefits.potential_savings, 2125.0);
        assert_eq!(benefits.reduced_interest, 2125.0);
        assert_eq!(benefits.time_saved, 6);
    }
}
