//! Fees, payments, expenses and financial reports
//!
//! Amounts are integer minor units throughout. Reports are computed by the
//! database with `SUM`/`GROUP BY`; this layer only combines the totals.

use chrono::{Datelike, NaiveDate, Utc};

use super::{optional, positive, required, ServiceError, ServiceResult};
use crate::db::repositories::{
    AcademicsRepository, FinanceRepository, InvoiceFilter, NewExpense, NewInvoice, NewPayment,
    PaymentOutcome, StudentRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    format_minor_units, Expense, ExpenseSummary, FeeCollectionSummary, FeePayment,
    IncomeStatement, Invoice,
};

pub const CSV_HEADER: [&str; 8] = [
    "receipt",
    "invoice_number",
    "admission_number",
    "student_name",
    "amount",
    "method",
    "reference",
    "paid_on",
];

/// Report period; defaults to the current calendar year up to today
pub fn resolve_period(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ServiceResult<(NaiveDate, NaiveDate)> {
    let today = Utc::now().date_naive();
    let to = to.unwrap_or(today);
    let from = match from {
        Some(from) => from,
        None => NaiveDate::from_ymd_opt(to.year(), 1, 1).unwrap_or(to),
    };
    if from > to {
        return Err(ServiceError::Validation("'from' must not be after 'to'".to_string()));
    }
    Ok((from, to))
}

pub struct FinanceService {
    finance: FinanceRepository,
    students: StudentRepository,
    academics: AcademicsRepository,
}

impl FinanceService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            finance: FinanceRepository::new(db.clone()),
            students: StudentRepository::new(db.clone()),
            academics: AcademicsRepository::new(db),
        }
    }

    // Invoices

    pub async fn create_invoice(&self, input: NewInvoice) -> ServiceResult<Invoice> {
        let input = NewInvoice {
            description: required("Description", &input.description)?,
            total_amount: positive("total_amount", input.total_amount)?,
            ..input
        };
        if self.students.get(input.student_id).await?.is_none() {
            return Err(ServiceError::Validation(format!("Student {} does not exist", input.student_id)));
        }
        if let Some(term_id) = input.term_id {
            if self.academics.get_term(term_id).await?.is_none() {
                return Err(ServiceError::Validation(format!("Term {} does not exist", term_id)));
            }
        }

        let invoice = self
            .finance
            .create_invoice(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "Duplicate invoice"))?;
        tracing::debug!("Created invoice {:?} for student {}", invoice.invoice_number, invoice.student_id);
        Ok(invoice)
    }

    pub async fn get_invoice(&self, id: i64) -> ServiceResult<Invoice> {
        self.finance
            .get_invoice(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice", id))
    }

    pub async fn list_invoices(&self, filter: InvoiceFilter) -> ServiceResult<Vec<Invoice>> {
        Ok(self.finance.list_invoices(&filter).await?)
    }

    // Payments

    pub async fn record_payment(
        &self,
        invoice_id: i64,
        input: NewPayment,
        received_by: Option<i64>,
    ) -> ServiceResult<FeePayment> {
        let input = NewPayment {
            amount: positive("amount", input.amount)?,
            reference: optional(&input.reference),
            ..input
        };

        match self.finance.record_payment(invoice_id, &input, received_by).await? {
            PaymentOutcome::Recorded(id) => self
                .finance
                .get_payment(id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Payment", id)),
            PaymentOutcome::InvoiceNotFound => Err(ServiceError::not_found("Invoice", invoice_id)),
            PaymentOutcome::ExceedsBalance { balance } => Err(ServiceError::Validation(format!(
                "Payment of {} exceeds the outstanding balance of {}",
                format_minor_units(input.amount),
                format_minor_units(balance)
            ))),
        }
    }

    pub async fn payments_for_invoice(&self, invoice_id: i64) -> ServiceResult<Vec<FeePayment>> {
        self.get_invoice(invoice_id).await?;
        Ok(self.finance.payments_for_invoice(invoice_id).await?)
    }

    /// Delete a payment and restore the invoice balance
    pub async fn void_payment(&self, payment_id: i64) -> ServiceResult<()> {
        if !self.finance.void_payment(payment_id).await? {
            return Err(ServiceError::not_found("Payment", payment_id));
        }
        tracing::info!("Voided payment {}", payment_id);
        Ok(())
    }

    // Expenses

    pub async fn create_expense(&self, input: NewExpense, recorded_by: Option<i64>) -> ServiceResult<Expense> {
        let input = NewExpense {
            category: required("Category", &input.category)?.to_lowercase(),
            description: required("Description", &input.description)?,
            amount: positive("amount", input.amount)?,
            ..input
        };
        Ok(self.finance.create_expense(&input, recorded_by).await?)
    }

    pub async fn list_expenses(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> ServiceResult<Vec<Expense>> {
        let (from, to) = resolve_period(from, to)?;
        Ok(self.finance.list_expenses(from, to).await?)
    }

    pub async fn delete_expense(&self, id: i64) -> ServiceResult<()> {
        if !self.finance.delete_expense(id).await? {
            return Err(ServiceError::not_found("Expense", id));
        }
        Ok(())
    }

    // Reports

    pub async fn fee_collection(&self, term_id: Option<i64>) -> ServiceResult<FeeCollectionSummary> {
        let totals = self.finance.invoice_totals(term_id).await?;
        let by_class = self.finance.collection_by_class(term_id).await?;

        Ok(FeeCollectionSummary {
            term_id,
            invoice_count: totals.invoice_count,
            total_invoiced: totals.invoiced,
            total_collected: totals.collected,
            total_outstanding: totals.invoiced - totals.collected,
            by_class,
        })
    }

    pub async fn income_statement(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ServiceResult<IncomeStatement> {
        let (from, to) = resolve_period(from, to)?;
        let income = self.finance.income_by_method(from, to).await?;
        let expenses = self.finance.expenses_by_category(from, to).await?;

        let total_income: i64 = income.iter().map(|row| row.amount).sum();
        let total_expenses: i64 = expenses.iter().map(|row| row.amount).sum();

        Ok(IncomeStatement {
            from,
            to,
            income,
            total_income,
            expenses,
            total_expenses,
            net: total_income - total_expenses,
        })
    }

    pub async fn expense_summary(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ServiceResult<ExpenseSummary> {
        let (from, to) = resolve_period(from, to)?;
        let categories = self.finance.expenses_by_category(from, to).await?;

        Ok(ExpenseSummary {
            from,
            to,
            count: categories.iter().map(|row| row.count).sum(),
            total: categories.iter().map(|row| row.amount).sum(),
            categories,
        })
    }

    /// Payments of a period as CSV, amounts in major units
    pub async fn export_payments_csv(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> ServiceResult<String> {
        let (from, to) = resolve_period(from, to)?;
        let payments = self.finance.payments_between(from, to).await?;
        Ok(payments_to_csv(&payments)?)
    }
}

pub fn payments_to_csv(payments: &[FeePayment]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for payment in payments {
        writer.write_record([
            payment.receipt_number(),
            payment.invoice_number.clone().unwrap_or_default(),
            payment.admission_number.clone(),
            format!("{} {}", payment.first_name, payment.last_name),
            format_minor_units(payment.amount),
            payment.method.as_str().to_string(),
            payment.reference.clone().unwrap_or_default(),
            payment.paid_on.format("%Y-%m-%d").to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{NewClass, NewStudent};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{InvoiceStatus, PaymentMethod};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded() -> (FinanceService, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        let class = AcademicsRepository::new(pool.clone())
            .create_class(&NewClass { name: "Grade 6".to_string(), class_teacher_id: None })
            .await
            .unwrap();
        let student = StudentRepository::new(pool.clone())
            .create(&NewStudent {
                admission_number: "F-001".to_string(),
                first_name: "Neema".to_string(),
                last_name: "Mushi".to_string(),
                gender: "female".to_string(),
                date_of_birth: None,
                class_id: class.id,
                guardian_name: None,
                guardian_phone: None,
                status: Default::default(),
            })
            .await
            .unwrap();
        (FinanceService::new(pool), student.id)
    }

    fn invoice(student_id: i64, total: i64) -> NewInvoice {
        NewInvoice {
            student_id,
            term_id: None,
            description: "Term 1 tuition".to_string(),
            total_amount: total,
            due_date: None,
        }
    }

    fn payment(amount: i64, paid_on: NaiveDate) -> NewPayment {
        NewPayment {
            amount,
            method: PaymentMethod::MobileMoney,
            reference: Some("QK7X".to_string()),
            paid_on,
        }
    }

    #[tokio::test]
    async fn test_invoice_validation() {
        let (service, student_id) = seeded().await;
        assert!(matches!(service.create_invoice(invoice(student_id, 0)).await, Err(ServiceError::Validation(_))));
        assert!(matches!(service.create_invoice(invoice(404, 100)).await, Err(ServiceError::Validation(_))));

        let created = service.create_invoice(invoice(student_id, 50_000)).await.unwrap();
        assert_eq!(created.balance, 50_000);
        assert_eq!(created.status, InvoiceStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_payment_flow() {
        let (service, student_id) = seeded().await;
        let inv = service.create_invoice(invoice(student_id, 10_000)).await.unwrap();

        service.record_payment(inv.id, payment(4_000, date(2024, 2, 1)), Some(1)).await.unwrap();
        let over = service.record_payment(inv.id, payment(6_001, date(2024, 2, 2)), None).await;
        assert!(matches!(over, Err(ServiceError::Validation(_))));
        let missing = service.record_payment(999, payment(1, date(2024, 2, 2)), None).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));

        let last = service.record_payment(inv.id, payment(6_000, date(2024, 2, 3)), None).await.unwrap();
        let paid = service.get_invoice(inv.id).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.balance, 0);

        service.void_payment(last.id).await.unwrap();
        let reopened = service.get_invoice(inv.id).await.unwrap();
        assert_eq!(reopened.balance, 6_000);
        assert_eq!(reopened.status, InvoiceStatus::Partial);
        assert!(matches!(service.void_payment(last.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reports_and_csv() {
        let (service, student_id) = seeded().await;
        let inv = service.create_invoice(invoice(student_id, 20_000)).await.unwrap();
        service.record_payment(inv.id, payment(12_345, date(2024, 3, 5)), None).await.unwrap();
        service
            .create_expense(
                NewExpense {
                    category: " Utilities ".to_string(),
                    description: "Water bill".to_string(),
                    amount: 2_345,
                    spent_on: date(2024, 3, 6),
                },
                None,
            )
            .await
            .unwrap();

        let fees = service.fee_collection(None).await.unwrap();
        assert_eq!(fees.total_invoiced, 20_000);
        assert_eq!(fees.total_collected, 12_345);
        assert_eq!(fees.total_outstanding, 7_655);
        assert_eq!(fees.by_class.len(), 1);

        let (from, to) = (Some(date(2024, 1, 1)), Some(date(2024, 12, 31)));
        let statement = service.income_statement(from, to).await.unwrap();
        assert_eq!(statement.total_income, 12_345);
        assert_eq!(statement.total_expenses, 2_345);
        assert_eq!(statement.net, 10_000);

        let expenses = service.expense_summary(from, to).await.unwrap();
        assert_eq!(expenses.count, 1);
        assert_eq!(expenses.categories[0].label, "utilities");

        let csv = service.export_payments_csv(from, to).await.unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("receipt,invoice_number,admission_number,student_name,amount,method,reference,paid_on")
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",F-001,Neema Mushi,123.45,mobile_money,QK7X,2024-03-05"));
        assert!(lines.next().is_none());

        assert!(matches!(
            service.income_statement(to, from).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_default_period_is_year_to_date() {
        let (from, to) = resolve_period(None, Some(date(2024, 6, 15))).unwrap();
        assert_eq!(from, date(2024, 1, 1));
        assert_eq!(to, date(2024, 6, 15));
    }
}
