//! Fees, payments, expenses and report shapes
//!
//! All amounts are integer minor currency units (e.g. cents).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    /// Payment state derived from the paid amount
    InvoiceStatus {
        Unpaid => "unpaid",
        Partial => "partial",
        Paid => "paid",
    }
}

impl InvoiceStatus {
    pub fn derive(total_amount: i64, amount_paid: i64) -> Self {
        if amount_paid >= total_amount {
            InvoiceStatus::Paid
        } else if amount_paid > 0 {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Unpaid
        }
    }

    /// SQL predicate selecting invoices in this state
    pub fn sql_predicate(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "i.amount_paid = 0",
            InvoiceStatus::Partial => "i.amount_paid > 0 AND i.amount_paid < i.total_amount",
            InvoiceStatus::Paid => "i.amount_paid >= i.total_amount",
        }
    }
}

text_enum! {
    PaymentMethod {
        Cash => "cash",
        Bank => "bank",
        MobileMoney => "mobile_money",
        Cheque => "cheque",
    }
}

/// A fee invoice with the billed student populated.
///
/// `balance` and `status` are computed by the query from the stored totals.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: Option<String>,
    pub student_id: i64,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub term_id: Option<i64>,
    pub description: String,
    pub total_amount: i64,
    pub amount_paid: i64,
    pub balance: i64,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeePayment {
    pub id: i64,
    pub invoice_id: i64,
    pub invoice_number: Option<String>,
    pub student_id: i64,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_on: NaiveDate,
    pub received_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl FeePayment {
    pub fn receipt_number(&self) -> String {
        format!("RCT-{:06}", self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Expense {
    pub id: i64,
    pub category: String,
    pub description: String,
    pub amount: i64,
    pub spent_on: NaiveDate,
    pub recorded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Grouped total produced by a report query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AmountByLabel {
    pub label: String,
    pub count: i64,
    pub amount: i64,
}

/// Per-class line of the fee collection summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClassCollection {
    pub class_id: i64,
    pub class_name: String,
    pub invoice_count: i64,
    pub invoiced: i64,
    pub collected: i64,
    pub outstanding: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCollectionSummary {
    pub term_id: Option<i64>,
    pub invoice_count: i64,
    pub total_invoiced: i64,
    pub total_collected: i64,
    pub total_outstanding: i64,
    pub by_class: Vec<ClassCollection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Fee income grouped by payment method
    pub income: Vec<AmountByLabel>,
    pub total_income: i64,
    /// Spending grouped by category
    pub expenses: Vec<AmountByLabel>,
    pub total_expenses: i64,
    pub net: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub categories: Vec<AmountByLabel>,
    pub count: i64,
    pub total: i64,
}

/// Render minor units as a decimal major-unit string (`1234` → `12.34`).
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_derivation() {
        assert_eq!(InvoiceStatus::derive(1000, 0), InvoiceStatus::Unpaid);
        assert_eq!(InvoiceStatus::derive(1000, 1), InvoiceStatus::Partial);
        assert_eq!(InvoiceStatus::derive(1000, 1000), InvoiceStatus::Paid);
    }

    #[test]
    fn test_format_minor_units() {
        assert_eq!(format_minor_units(0), "0.00");
        assert_eq!(format_minor_units(5), "0.05");
        assert_eq!(format_minor_units(1234), "12.34");
        assert_eq!(format_minor_units(-250), "-2.50");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn formatted_amount_parses_back(amount in -10_000_000i64..10_000_000) {
            let text = format_minor_units(amount);
            let parsed: f64 = text.parse().unwrap();
            prop_assert!((parsed * 100.0 - amount as f64).abs() < 0.5);
        }

        #[test]
        fn status_is_paid_iff_no_balance(total in 1i64..1_000_000, paid in 0i64..1_000_000) {
            let paid = paid.min(total);
            let status = InvoiceStatus::derive(total, paid);
            prop_assert_eq!(status == InvoiceStatus::Paid, total - paid == 0);
        }
    }
}
