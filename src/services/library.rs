//! Library catalogue and loans

use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

use super::{optional, required, ServiceError, ServiceResult};
use crate::db::repositories::{
    BookChange, BookUpdate, IssueOutcome, LibraryRepository, LoanFilter, NewBook, ReturnOutcome,
    StudentRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Book, BookLoan};

/// Loan period when no due date is given
pub const DEFAULT_LOAN_DAYS: i64 = 14;

#[derive(Debug, Clone, Deserialize)]
pub struct IssueLoanInput {
    pub book_id: i64,
    pub student_id: i64,
    #[serde(default)]
    pub issued_on: Option<NaiveDate>,
    #[serde(default)]
    pub due_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoanQuery {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub overdue: bool,
    pub student_id: Option<i64>,
}

pub struct LibraryService {
    library: LibraryRepository,
    students: StudentRepository,
}

fn copies(value: i64) -> ServiceResult<i64> {
    if value < 1 {
        return Err(ServiceError::Validation("total_copies must be at least 1".to_string()));
    }
    Ok(value)
}

impl LibraryService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            library: LibraryRepository::new(db.clone()),
            students: StudentRepository::new(db),
        }
    }

    pub async fn create_book(&self, input: NewBook) -> ServiceResult<Book> {
        let input = NewBook {
            title: required("Title", &input.title)?,
            author: required("Author", &input.author)?,
            isbn: optional(&input.isbn),
            total_copies: copies(input.total_copies)?,
        };
        self.library
            .create_book(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "A book with this ISBN exists"))
    }

    pub async fn get_book(&self, id: i64) -> ServiceResult<Book> {
        self.library
            .get_book(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book", id))
    }

    pub async fn list_books(&self, q: Option<String>) -> ServiceResult<Vec<Book>> {
        Ok(self.library.list_books(optional(&q).as_deref()).await?)
    }

    pub async fn update_book(&self, id: i64, update: BookUpdate) -> ServiceResult<Book> {
        let update = BookUpdate {
            title: update.title.as_deref().map(|t| required("Title", t)).transpose()?,
            author: update.author.as_deref().map(|a| required("Author", a)).transpose()?,
            isbn: optional(&update.isbn),
            total_copies: update.total_copies.map(copies).transpose()?,
        };

        let change = self
            .library
            .update_book(id, &update)
            .await
            .map_err(|e| ServiceError::from_db(e, "A book with this ISBN exists"))?;
        match change {
            BookChange::Done => self.get_book(id).await,
            BookChange::NotFound => Err(ServiceError::not_found("Book", id)),
            BookChange::CopiesOnLoan(on_loan) => Err(ServiceError::Conflict(format!(
                "total_copies cannot be lower than the {} copies on loan",
                on_loan
            ))),
        }
    }

    pub async fn delete_book(&self, id: i64) -> ServiceResult<()> {
        match self.library.delete_book(id).await? {
            BookChange::Done => Ok(()),
            BookChange::NotFound => Err(ServiceError::not_found("Book", id)),
            BookChange::CopiesOnLoan(on_loan) => Err(ServiceError::Conflict(format!(
                "{} copies are still on loan",
                on_loan
            ))),
        }
    }

    pub async fn issue_loan(&self, input: IssueLoanInput) -> ServiceResult<BookLoan> {
        let issued_on = input.issued_on.unwrap_or_else(|| Utc::now().date_naive());
        let due_on = input.due_on.unwrap_or(issued_on + Duration::days(DEFAULT_LOAN_DAYS));
        if due_on < issued_on {
            return Err(ServiceError::Validation("due_on must not be before issued_on".to_string()));
        }
        if self.students.get(input.student_id).await?.is_none() {
            return Err(ServiceError::Validation(format!("Student {} does not exist", input.student_id)));
        }

        match self
            .library
            .issue_loan(input.book_id, input.student_id, issued_on, due_on)
            .await?
        {
            IssueOutcome::Issued(loan_id) => self.get_loan(loan_id).await,
            IssueOutcome::BookNotFound => Err(ServiceError::not_found("Book", input.book_id)),
            IssueOutcome::NoCopiesAvailable => Err(ServiceError::Conflict(
                "No copies of this book are available".to_string(),
            )),
        }
    }

    pub async fn return_loan(&self, loan_id: i64, returned_on: Option<NaiveDate>) -> ServiceResult<BookLoan> {
        let returned_on = returned_on.unwrap_or_else(|| Utc::now().date_naive());
        let current = self.get_loan(loan_id).await?;
        if returned_on < current.issued_on {
            return Err(ServiceError::Validation(
                "returned_on must not be before issued_on".to_string(),
            ));
        }

        match self.library.return_loan(loan_id, returned_on).await? {
            ReturnOutcome::Returned => self.get_loan(loan_id).await,
            ReturnOutcome::NotFound => Err(ServiceError::not_found("Loan", loan_id)),
            ReturnOutcome::AlreadyReturned => {
                Err(ServiceError::Conflict("This loan was already returned".to_string()))
            }
        }
    }

    pub async fn get_loan(&self, id: i64) -> ServiceResult<BookLoan> {
        self.library
            .get_loan(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Loan", id))
    }

    pub async fn list_loans(&self, query: LoanQuery) -> ServiceResult<Vec<BookLoan>> {
        let filter = LoanFilter {
            active: query.active,
            overdue_on: query.overdue.then(|| Utc::now().date_naive()),
            student_id: query.student_id,
        };
        Ok(self.library.list_loans(&filter).await?)
    }
}
