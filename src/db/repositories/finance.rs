//! Finance repository: invoices, fee payments, expenses and report queries
//!
//! Invoice balances are never stored. `balance` and `status` are derived in
//! the SELECT from `total_amount` and `amount_paid`, and `amount_paid` only
//! changes inside the payment transactions below.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{
    AmountByLabel, ClassCollection, Expense, FeePayment, Invoice, InvoiceStatus, PaymentMethod,
};

const INVOICE_SELECT: &str = "SELECT i.id, i.invoice_number, i.student_id, s.admission_number, \
     s.first_name, s.last_name, i.term_id, i.description, i.total_amount, i.amount_paid, \
     i.total_amount - i.amount_paid AS balance, \
     CASE WHEN i.amount_paid >= i.total_amount THEN 'paid' \
          WHEN i.amount_paid > 0 THEN 'partial' ELSE 'unpaid' END AS status, \
     i.due_date, i.created_at, i.updated_at \
     FROM invoices i JOIN students s ON s.id = i.student_id";

const PAYMENT_SELECT: &str = "SELECT f.id, f.invoice_id, i.invoice_number, i.student_id, \
     s.admission_number, s.first_name, s.last_name, f.amount, f.method, f.reference, f.paid_on, \
     f.received_by, f.created_at \
     FROM fee_payments f \
     JOIN invoices i ON i.id = f.invoice_id \
     JOIN students s ON s.id = i.student_id";

const EXPENSE_COLUMNS: &str = "id, category, description, amount, spent_on, recorded_by, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub student_id: i64,
    #[serde(default)]
    pub term_id: Option<i64>,
    pub description: String,
    pub total_amount: i64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub student_id: Option<i64>,
    pub term_id: Option<i64>,
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub amount: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    pub paid_on: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpense {
    pub category: String,
    pub description: String,
    pub amount: i64,
    pub spent_on: NaiveDate,
}

/// Result of the payment transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Recorded(i64),
    InvoiceNotFound,
    ExceedsBalance { balance: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct InvoiceTotals {
    pub invoice_count: i64,
    pub invoiced: i64,
    pub collected: i64,
}

pub struct FinanceRepository {
    pool: DynDatabasePool,
}

impl FinanceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    // Invoices

    /// Insert an invoice and stamp its `INV-000123` number
    pub async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice> {
        let id = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let id = sqlx::query(
                "INSERT INTO invoices (student_id, term_id, description, total_amount, due_date) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(input.student_id)
            .bind(input.term_id)
            .bind(&input.description)
            .bind(input.total_amount)
            .bind(input.due_date)
            .execute(&mut *tx)
            .await
            .context("Failed to insert invoice")?
            .inserted_id();
            sqlx::query("UPDATE invoices SET invoice_number = ? WHERE id = ?")
                .bind(format!("INV-{:06}", id))
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            id
        });

        self.get_invoice(id).await?.context("Invoice missing after insert")
    }

    pub async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>> {
        let sql = format!("{} WHERE i.id = ?", INVOICE_SELECT);
        let invoice = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Invoice>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(invoice)
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let mut conditions: Vec<&str> = Vec::new();
        if filter.student_id.is_some() {
            conditions.push("i.student_id = ?");
        }
        if filter.term_id.is_some() {
            conditions.push("i.term_id = ?");
        }
        if let Some(status) = filter.status {
            conditions.push(status.sql_predicate());
        }
        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("{}{} ORDER BY i.id DESC", INVOICE_SELECT, where_sql);

        let invoices = on_pool!(self.pool, p => {
            let mut query = sqlx::query_as::<_, Invoice>(&sql);
            if let Some(student_id) = filter.student_id {
                query = query.bind(student_id);
            }
            if let Some(term_id) = filter.term_id {
                query = query.bind(term_id);
            }
            query.fetch_all(p).await?
        });
        Ok(invoices)
    }

    // Payments

    /// Record a payment and raise the invoice's paid amount atomically.
    /// The amount must not exceed the remaining balance.
    pub async fn record_payment(
        &self,
        invoice_id: i64,
        input: &NewPayment,
        received_by: Option<i64>,
    ) -> Result<PaymentOutcome> {
        let outcome = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            // The balance check is part of the write so concurrent payments cannot overshoot.
            let raised = sqlx::query(
                "UPDATE invoices SET amount_paid = amount_paid + ?, updated_at = CURRENT_TIMESTAMP \
                 WHERE id = ? AND total_amount - amount_paid >= ?",
            )
            .bind(input.amount)
            .bind(invoice_id)
            .bind(input.amount)
            .execute(&mut *tx)
            .await
            .context("Failed to raise invoice paid amount")?
            .rows_affected();

            if raised != 1 {
                let balance = sqlx::query_scalar::<_, i64>(
                    "SELECT total_amount - amount_paid FROM invoices WHERE id = ?",
                )
                .bind(invoice_id)
                .fetch_optional(&mut *tx)
                .await?;
                tx.rollback().await?;
                match balance {
                    None => PaymentOutcome::InvoiceNotFound,
                    Some(balance) => PaymentOutcome::ExceedsBalance { balance },
                }
            } else {
                let payment_id = sqlx::query(
                    "INSERT INTO fee_payments (invoice_id, amount, method, reference, paid_on, received_by) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(invoice_id)
                .bind(input.amount)
                .bind(input.method.as_str())
                .bind(&input.reference)
                .bind(input.paid_on)
                .bind(received_by)
                .execute(&mut *tx)
                .await
                .context("Failed to insert payment")?
                .inserted_id();
                tx.commit().await.context("Failed to commit payment")?;
                PaymentOutcome::Recorded(payment_id)
            }
        });
        Ok(outcome)
    }

    /// Delete a payment and give its amount back to the invoice balance.
    /// Returns `false` when the payment does not exist.
    pub async fn void_payment(&self, payment_id: i64) -> Result<bool> {
        let found = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let row = sqlx::query_as::<_, (i64, i64)>(
                "SELECT invoice_id, amount FROM fee_payments WHERE id = ?",
            )
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                None => false,
                Some((invoice_id, amount)) => {
                    sqlx::query("DELETE FROM fee_payments WHERE id = ?")
                        .bind(payment_id)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query(
                        "UPDATE invoices SET amount_paid = amount_paid - ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                    )
                    .bind(amount)
                    .bind(invoice_id)
                    .execute(&mut *tx)
                    .await?;
                    tx.commit().await.context("Failed to void payment")?;
                    true
                }
            }
        });
        Ok(found)
    }

    pub async fn get_payment(&self, id: i64) -> Result<Option<FeePayment>> {
        let sql = format!("{} WHERE f.id = ?", PAYMENT_SELECT);
        let payment = on_pool!(self.pool, p => {
            sqlx::query_as::<_, FeePayment>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(payment)
    }

    pub async fn payments_for_invoice(&self, invoice_id: i64) -> Result<Vec<FeePayment>> {
        let sql = format!("{} WHERE f.invoice_id = ? ORDER BY f.paid_on, f.id", PAYMENT_SELECT);
        let payments = on_pool!(self.pool, p => {
            sqlx::query_as::<_, FeePayment>(&sql).bind(invoice_id).fetch_all(p).await?
        });
        Ok(payments)
    }

    /// Payments received within `[from, to]`, oldest first
    pub async fn payments_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<FeePayment>> {
        let sql = format!(
            "{} WHERE f.paid_on >= ? AND f.paid_on <= ? ORDER BY f.paid_on, f.id",
            PAYMENT_SELECT
        );
        let payments = on_pool!(self.pool, p => {
            sqlx::query_as::<_, FeePayment>(&sql)
                .bind(from)
                .bind(to)
                .fetch_all(p)
                .await?
        });
        Ok(payments)
    }

    // Expenses

    pub async fn create_expense(&self, input: &NewExpense, recorded_by: Option<i64>) -> Result<Expense> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO expenses (category, description, amount, spent_on, recorded_by) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.amount)
            .bind(input.spent_on)
            .bind(recorded_by)
            .execute(p)
            .await
            .context("Failed to insert expense")?
            .inserted_id()
        });

        let sql = format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS);
        let expense = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Expense>(&sql).bind(id).fetch_one(p).await?
        });
        Ok(expense)
    }

    pub async fn list_expenses(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Expense>> {
        let sql = format!(
            "SELECT {} FROM expenses WHERE spent_on >= ? AND spent_on <= ? ORDER BY spent_on DESC, id DESC",
            EXPENSE_COLUMNS
        );
        let expenses = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Expense>(&sql).bind(from).bind(to).fetch_all(p).await?
        });
        Ok(expenses)
    }

    pub async fn delete_expense(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM expenses WHERE id = ?")
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    // Reports

    pub async fn invoice_totals(&self, term_id: Option<i64>) -> Result<InvoiceTotals> {
        let base = "SELECT COUNT(*) AS invoice_count, \
             CAST(COALESCE(SUM(i.total_amount), 0) AS SIGNED) AS invoiced, \
             CAST(COALESCE(SUM(i.amount_paid), 0) AS SIGNED) AS collected \
             FROM invoices i";
        let totals = match term_id {
            Some(term_id) => {
                let sql = format!("{} WHERE i.term_id = ?", base);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, InvoiceTotals>(&sql).bind(term_id).fetch_one(p).await?
                })
            }
            None => on_pool!(self.pool, p => {
                sqlx::query_as::<_, InvoiceTotals>(base).fetch_one(p).await?
            }),
        };
        Ok(totals)
    }

    pub async fn collection_by_class(&self, term_id: Option<i64>) -> Result<Vec<ClassCollection>> {
        let filter = if term_id.is_some() { " WHERE i.term_id = ?" } else { "" };
        let sql = format!(
            "SELECT c.id AS class_id, c.name AS class_name, COUNT(i.id) AS invoice_count, \
             CAST(COALESCE(SUM(i.total_amount), 0) AS SIGNED) AS invoiced, \
             CAST(COALESCE(SUM(i.amount_paid), 0) AS SIGNED) AS collected, \
             CAST(COALESCE(SUM(i.total_amount - i.amount_paid), 0) AS SIGNED) AS outstanding \
             FROM invoices i \
             JOIN students s ON s.id = i.student_id \
             JOIN classes c ON c.id = s.class_id{} \
             GROUP BY c.id, c.name ORDER BY c.name",
            filter
        );
        let rows = on_pool!(self.pool, p => {
            let mut query = sqlx::query_as::<_, ClassCollection>(&sql);
            if let Some(term_id) = term_id {
                query = query.bind(term_id);
            }
            query.fetch_all(p).await?
        });
        Ok(rows)
    }

    /// Fee income within `[from, to]` grouped by payment method
    pub async fn income_by_method(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AmountByLabel>> {
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, AmountByLabel>(
                "SELECT method AS label, COUNT(*) AS count, \
                 CAST(COALESCE(SUM(amount), 0) AS SIGNED) AS amount \
                 FROM fee_payments WHERE paid_on >= ? AND paid_on <= ? \
                 GROUP BY method ORDER BY method",
            )
            .bind(from)
            .bind(to)
            .fetch_all(p)
            .await?
        });
        Ok(rows)
    }

    /// Spending within `[from, to]` grouped by category
    pub async fn expenses_by_category(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AmountByLabel>> {
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, AmountByLabel>(
                "SELECT category AS label, COUNT(*) AS count, \
                 CAST(COALESCE(SUM(amount), 0) AS SIGNED) AS amount \
                 FROM expenses WHERE spent_on >= ? AND spent_on <= ? \
                 GROUP BY category ORDER BY category",
            )
            .bind(from)
            .bind(to)
            .fetch_all(p)
            .await?
        });
        Ok(rows)
    }

    /// Sum of every unpaid balance
    pub async fn outstanding_total(&self) -> Result<i64> {
        let total = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>(
                "SELECT CAST(COALESCE(SUM(total_amount - amount_paid), 0) AS SIGNED) FROM invoices",
            )
            .fetch_one(p)
            .await?
        });
        Ok(total)
    }
}
