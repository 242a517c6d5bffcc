//! Issues repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::{Postgres, Transaction};

use super::{books, Repository, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{page_bounds, Book, Issue, IssueQuery, NewIssue, Student, UpdateBook},
};

impl Repository {
    /// Get issue by ID
    pub async fn issues_get_by_id(&self, id: i32) -> AppResult<Option<Issue>> {
        let issue = sqlx::query_as::<_, Issue>("SELECT * FROM issues WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(issue)
    }

    /// List open issues, earliest due first
    pub async fn issues_list_open(&self) -> AppResult<Vec<Issue>> {
        let issues = sqlx::query_as::<_, Issue>(
            "SELECT * FROM issues WHERE returned_date IS NULL ORDER BY due_date, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(issues)
    }

    /// List every issue of a student, newest first
    pub async fn issues_list_by_student(&self, student_id: i32) -> AppResult<Vec<Issue>> {
        let issues = sqlx::query_as::<_, Issue>(
            "SELECT * FROM issues WHERE student_id = $1 ORDER BY issue_date DESC, id DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(issues)
    }

    /// Filter issues by student, held book and overdue state, newest first
    pub async fn issues_search(
        &self,
        query: &IssueQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Issue>> {
        let (offset, limit) = page_bounds(query.page, query.limit);

        let issues = sqlx::query_as::<_, Issue>(
            r#"
            SELECT * FROM issues
            WHERE ($1::int IS NULL OR student_id = $1)
              AND ($2::int IS NULL OR $2 = ANY(book_ids))
              AND ($3::bool IS NULL OR $3 = (returned_date IS NULL AND due_date < $4))
            ORDER BY issue_date DESC, id DESC
            OFFSET $5 LIMIT $6
            "#,
        )
        .bind(query.student_id)
        .bind(query.book_id)
        .bind(query.is_overdue)
        .bind(now)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(issues)
    }

    /// Count open issues of a student
    pub async fn issues_count_open_for_student(&self, student_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM issues WHERE returned_date IS NULL AND student_id = $1",
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Issue/return transaction on PostgreSQL. Rows read through the `lock_*`
/// methods stay locked until commit or rollback.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

impl PgStoreTx {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_student(&mut self, id: i32) -> AppResult<Option<Student>> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::from_write(e, &format!("student {}", id)))
    }

    async fn lock_books(&mut self, ids: &[i32]) -> AppResult<Vec<Book>> {
        // Locking in id order keeps concurrent issues from deadlocking
        sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_write(e, "books"))
    }

    async fn lock_open_issue_on(
        &mut self,
        student_id: i32,
        day: NaiveDate,
    ) -> AppResult<Option<Issue>> {
        let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        let end = start + Duration::days(1);

        sqlx::query_as::<_, Issue>(
            r#"
            SELECT * FROM issues
            WHERE student_id = $1
              AND returned_date IS NULL
              AND issue_date >= $2 AND issue_date < $3
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(student_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_write(e, "issue"))
    }

    async fn lock_issue(&mut self, id: i32) -> AppResult<Option<Issue>> {
        sqlx::query_as::<_, Issue>("SELECT * FROM issues WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::from_write(e, &format!("issue {}", id)))
    }

    async fn insert_issue(&mut self, issue: &NewIssue) -> AppResult<Issue> {
        sqlx::query_as::<_, Issue>(
            r#"
            INSERT INTO issues (student_id, book_ids, books_titles, issue_date, due_date,
                                is_overdue, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, $4, $4)
            RETURNING *
            "#,
        )
        .bind(issue.student_id)
        .bind(&issue.book_ids)
        .bind(&issue.books_titles)
        .bind(issue.issue_date)
        .bind(issue.due_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_write(e, "issue"))
    }

    async fn update_issue(&mut self, issue: &Issue) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE issues
            SET book_ids = $2, books_titles = $3, returned_date = $4,
                is_overdue = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(issue.id)
        .bind(&issue.book_ids)
        .bind(&issue.books_titles)
        .bind(issue.returned_date)
        .bind(issue.is_overdue)
        .bind(issue.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_write(e, &format!("issue {}", issue.id)))?;
        Ok(())
    }

    async fn take_copy(&mut self, book_id: i32) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(book_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_write(e, &format!("book {}", book_id)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Book {} ran out of copies during the issue",
                book_id
            )));
        }
        Ok(())
    }

    async fn put_back_copy(&mut self, book_id: i32) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE books
            SET available_copies = LEAST(copies, available_copies + 1), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(book_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::from_write(e, &format!("book {}", book_id)))?;
        Ok(())
    }

    async fn open_issues_holding(&mut self, book_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM issues WHERE returned_date IS NULL AND $1 = ANY(book_ids)",
        )
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn update_book(&mut self, id: i32, data: &UpdateBook) -> AppResult<Option<Book>> {
        books::update_book(&mut *self.tx, id, data).await
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<()> {
        books::delete_book(&mut *self.tx, id).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::from_write(e, "transaction"))
    }
}
