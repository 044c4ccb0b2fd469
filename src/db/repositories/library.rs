//! Library repository
//!
//! `available_copies` is only moved by the loan transactions and by
//! `update_book`, which shifts it by the same delta as `total_copies`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{Book, BookLoan};

const BOOK_COLUMNS: &str = "id, title, author, isbn, total_copies, available_copies, created_at";
const LOAN_SELECT: &str = "SELECT l.id, l.book_id, b.title AS book_title, l.student_id, \
     s.admission_number, s.first_name, s.last_name, l.issued_on, l.due_on, l.returned_on, l.created_at \
     FROM book_loans l \
     JOIN books b ON b.id = l.book_id \
     JOIN students s ON s.id = l.student_id";

#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    pub total_copies: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub total_copies: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    /// Only loans not yet returned
    pub active: bool,
    /// Only loans not returned and due before this date
    pub overdue_on: Option<NaiveDate>,
    pub student_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookChange {
    Done,
    NotFound,
    /// Fewer copies than are currently lent out
    CopiesOnLoan(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued(i64),
    BookNotFound,
    NoCopiesAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnOutcome {
    Returned,
    NotFound,
    AlreadyReturned,
}

pub struct LibraryRepository {
    pool: DynDatabasePool,
}

impl LibraryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub async fn create_book(&self, input: &NewBook) -> Result<Book> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO books (title, author, isbn, total_copies, available_copies) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&input.title)
            .bind(&input.author)
            .bind(&input.isbn)
            .bind(input.total_copies)
            .bind(input.total_copies)
            .execute(p)
            .await
            .context("Failed to insert book")?
            .inserted_id()
        });

        self.get_book(id).await?.context("Book missing after insert")
    }

    pub async fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let sql = format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS);
        let book = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Book>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(book)
    }

    pub async fn list_books(&self, q: Option<&str>) -> Result<Vec<Book>> {
        let pattern = q.map(str::trim).filter(|q| !q.is_empty()).map(|q| format!("%{}%", q));
        let books = match pattern {
            Some(pattern) => {
                let sql = format!(
                    "SELECT {} FROM books WHERE title LIKE ? OR author LIKE ? OR isbn LIKE ? ORDER BY title",
                    BOOK_COLUMNS
                );
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Book>(&sql)
                        .bind(&pattern)
                        .bind(&pattern)
                        .bind(&pattern)
                        .fetch_all(p)
                        .await?
                })
            }
            None => {
                let sql = format!("SELECT {} FROM books ORDER BY title", BOOK_COLUMNS);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Book>(&sql).fetch_all(p).await?
                })
            }
        };
        Ok(books)
    }

    /// Apply a partial update. A new total keeps the number of copies on
    /// loan and moves `available_copies` by the same delta.
    pub async fn update_book(&self, id: i64, update: &BookUpdate) -> Result<BookChange> {
        let Some(current) = self.get_book(id).await? else {
            return Ok(BookChange::NotFound);
        };
        let total = update.total_copies.unwrap_or(current.total_copies);

        // available_copies is assigned first: MySQL evaluates SET left to right
        let affected = on_pool!(self.pool, p => {
            sqlx::query(
                "UPDATE books SET available_copies = available_copies + (? - total_copies), \
                 total_copies = ?, title = ?, author = ?, isbn = ? \
                 WHERE id = ? AND total_copies - available_copies <= ?",
            )
            .bind(total)
            .bind(total)
            .bind(update.title.as_ref().unwrap_or(&current.title))
            .bind(update.author.as_ref().unwrap_or(&current.author))
            .bind(update.isbn.as_ref().or(current.isbn.as_ref()))
            .bind(id)
            .bind(total)
            .execute(p)
            .await
            .context("Failed to update book")?
            .rows_affected()
        });

        if affected > 0 {
            return Ok(BookChange::Done);
        }
        match self.get_book(id).await? {
            Some(book) => Ok(BookChange::CopiesOnLoan(book.on_loan())),
            None => Ok(BookChange::NotFound),
        }
    }

    /// Delete a book together with its returned-loan history.
    /// Refused while any copy is lent out.
    pub async fn delete_book(&self, id: i64) -> Result<BookChange> {
        let change = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let on_loan = sqlx::query_scalar::<_, i64>(
                "SELECT total_copies - available_copies FROM books WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            match on_loan {
                None => BookChange::NotFound,
                Some(n) if n > 0 => BookChange::CopiesOnLoan(n),
                Some(_) => {
                    sqlx::query("DELETE FROM book_loans WHERE book_id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query("DELETE FROM books WHERE id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await.context("Failed to delete book")?;
                    BookChange::Done
                }
            }
        });
        Ok(change)
    }

    /// Lend one copy: decrement availability and open a loan atomically
    pub async fn issue_loan(
        &self,
        book_id: i64,
        student_id: i64,
        issued_on: NaiveDate,
        due_on: NaiveDate,
    ) -> Result<IssueOutcome> {
        let outcome = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let taken = sqlx::query(
                "UPDATE books SET available_copies = available_copies - 1 WHERE id = ? AND available_copies > 0",
            )
            .bind(book_id)
            .execute(&mut *tx)
            .await
            .context("Failed to take a copy")?
            .rows_affected();

            if taken != 1 {
                let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM books WHERE id = ?")
                    .bind(book_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                tx.rollback().await?;
                if exists.is_some() {
                    IssueOutcome::NoCopiesAvailable
                } else {
                    IssueOutcome::BookNotFound
                }
            } else {
                let loan_id = sqlx::query(
                    "INSERT INTO book_loans (book_id, student_id, issued_on, due_on) VALUES (?, ?, ?, ?)",
                )
                .bind(book_id)
                .bind(student_id)
                .bind(issued_on)
                .bind(due_on)
                .execute(&mut *tx)
                .await
                .context("Failed to insert loan")?
                .inserted_id();
                tx.commit().await.context("Failed to commit loan")?;
                IssueOutcome::Issued(loan_id)
            }
        });
        Ok(outcome)
    }

    /// Close a loan and put the copy back on the shelf atomically
    pub async fn return_loan(&self, loan_id: i64, returned_on: NaiveDate) -> Result<ReturnOutcome> {
        let outcome = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let row = sqlx::query_as::<_, (i64, Option<NaiveDate>)>(
                "SELECT book_id, returned_on FROM book_loans WHERE id = ?",
            )
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                None => ReturnOutcome::NotFound,
                Some((_, Some(_))) => ReturnOutcome::AlreadyReturned,
                Some((book_id, None)) => {
                    let closed = sqlx::query(
                        "UPDATE book_loans SET returned_on = ? WHERE id = ? AND returned_on IS NULL",
                    )
                    .bind(returned_on)
                    .bind(loan_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                    if closed != 1 {
                        tx.rollback().await?;
                        return Ok(ReturnOutcome::AlreadyReturned);
                    }
                    sqlx::query("UPDATE books SET available_copies = available_copies + 1 WHERE id = ?")
                        .bind(book_id)
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await.context("Failed to commit return")?;
                    ReturnOutcome::Returned
                }
            }
        });
        Ok(outcome)
    }

    pub async fn get_loan(&self, id: i64) -> Result<Option<BookLoan>> {
        let sql = format!("{} WHERE l.id = ?", LOAN_SELECT);
        let loan = on_pool!(self.pool, p => {
            sqlx::query_as::<_, BookLoan>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(loan)
    }

    pub async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<BookLoan>> {
        let mut conditions: Vec<&str> = Vec::new();
        if filter.active || filter.overdue_on.is_some() {
            conditions.push("l.returned_on IS NULL");
        }
        if filter.overdue_on.is_some() {
            conditions.push("l.due_on < ?");
        }
        if filter.student_id.is_some() {
            conditions.push("l.student_id = ?");
        }
        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("{}{} ORDER BY l.issued_on DESC, l.id DESC", LOAN_SELECT, where_sql);

        let loans = on_pool!(self.pool, p => {
            let mut query = sqlx::query_as::<_, BookLoan>(&sql);
            if let Some(today) = filter.overdue_on {
                query = query.bind(today);
            }
            if let Some(student_id) = filter.student_id {
                query = query.bind(student_id);
            }
            query.fetch_all(p).await?
        });
        Ok(loans)
    }

    pub async fn count_on_loan(&self) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM book_loans WHERE returned_on IS NULL")
                .fetch_one(p)
                .await?
        });
        Ok(count)
    }
}
