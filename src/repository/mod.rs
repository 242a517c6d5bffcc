//! Repository layer for database operations
//!
//! Services talk to storage through the [`Store`] trait. [`Repository`] is
//! the PostgreSQL implementation; [`memory::MemoryStore`] keeps everything
//! in process with the same transactional behavior.

pub mod books;
pub mod issues;
pub mod memory;
pub mod students;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        Book, BookQuery, CreateBook, CreateStudent, Issue, IssueQuery, NewIssue, Student,
        StudentQuery, UpdateBook, UpdateStudent,
    },
};

pub use memory::MemoryStore;

/// Catalog and ledger storage
#[async_trait]
pub trait Store: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> AppResult<()>;

    // ---- Books ----
    async fn books_create(&self, data: &CreateBook) -> AppResult<Book>;
    async fn books_list(&self, query: &BookQuery) -> AppResult<Vec<Book>>;
    async fn books_get(&self, id: i32) -> AppResult<Option<Book>>;
    async fn books_count(&self) -> AppResult<i64>;

    // ---- Students ----
    async fn students_create(&self, data: &CreateStudent) -> AppResult<Student>;
    async fn students_list(&self, query: &StudentQuery) -> AppResult<Vec<Student>>;
    async fn students_get(&self, id: i32) -> AppResult<Option<Student>>;
    async fn students_update(&self, id: i32, data: &UpdateStudent) -> AppResult<Option<Student>>;
    async fn students_delete(&self, id: i32) -> AppResult<bool>;
    async fn students_count(&self) -> AppResult<i64>;

    // ---- Issues (read side) ----
    async fn issues_get(&self, id: i32) -> AppResult<Option<Issue>>;
    /// Every issue with a null return date
    async fn issues_open(&self) -> AppResult<Vec<Issue>>;
    /// All issues of a student, newest first
    async fn issues_by_student(&self, student_id: i32) -> AppResult<Vec<Issue>>;
    /// Filtered, paged issue list, newest first. `now` decides overdue.
    async fn issues_list(&self, query: &IssueQuery, now: DateTime<Utc>)
        -> AppResult<Vec<Issue>>;
    /// Number of open issues of the student
    async fn issues_open_count_for_student(&self, student_id: i32) -> AppResult<i64>;

    /// Start a transaction. Dropping the handle without `commit` rolls back.
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;
}

/// Write side of the ledger, scoped to one transaction
#[async_trait]
pub trait StoreTx: Send {
    /// Fetch and lock a student. Holding the lock serializes issues to
    /// the same student, so two first issues of a day cannot both insert.
    async fn lock_student(&mut self, id: i32) -> AppResult<Option<Student>>;

    /// Fetch and lock the given books, ordered by id. Unknown ids are
    /// simply absent from the result.
    async fn lock_books(&mut self, ids: &[i32]) -> AppResult<Vec<Book>>;

    /// Fetch and lock the open issue of a student created on `day`
    async fn lock_open_issue_on(&mut self, student_id: i32, day: NaiveDate)
        -> AppResult<Option<Issue>>;

    async fn lock_issue(&mut self, id: i32) -> AppResult<Option<Issue>>;

    async fn insert_issue(&mut self, issue: &NewIssue) -> AppResult<Issue>;

    /// Persist book set, titles, return date and overdue flag
    async fn update_issue(&mut self, issue: &Issue) -> AppResult<()>;

    /// Take one copy off the shelf. Fails with `Conflict` when none is left.
    async fn take_copy(&mut self, book_id: i32) -> AppResult<()>;

    /// Put one copy back on the shelf, never above `copies`.
    async fn put_back_copy(&mut self, book_id: i32) -> AppResult<()>;

    /// Number of open issues holding the book
    async fn open_issues_holding(&mut self, book_id: i32) -> AppResult<i64>;

    /// Apply an update; `available_copies` moves with `copies`.
    async fn update_book(&mut self, id: i32, data: &UpdateBook) -> AppResult<Option<Book>>;

    async fn delete_book(&mut self, id: i32) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// PostgreSQL repository holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for Repository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn books_create(&self, data: &CreateBook) -> AppResult<Book> {
        self.books_insert(data).await
    }

    async fn books_list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        self.books_search(query).await
    }

    async fn books_get(&self, id: i32) -> AppResult<Option<Book>> {
        self.books_get_by_id(id).await
    }

    async fn books_count(&self) -> AppResult<i64> {
        self.books_count_all().await
    }

    async fn students_create(&self, data: &CreateStudent) -> AppResult<Student> {
        self.students_insert(data).await
    }

    async fn students_list(&self, query: &StudentQuery) -> AppResult<Vec<Student>> {
        self.students_search(query).await
    }

    async fn students_get(&self, id: i32) -> AppResult<Option<Student>> {
        self.students_get_by_id(id).await
    }

    async fn students_update(&self, id: i32, data: &UpdateStudent) -> AppResult<Option<Student>> {
        self.students_update_student(id, data).await
    }

    async fn students_delete(&self, id: i32) -> AppResult<bool> {
        self.students_delete_student(id).await
    }

    async fn students_count(&self) -> AppResult<i64> {
        self.students_count_all().await
    }

    async fn issues_get(&self, id: i32) -> AppResult<Option<Issue>> {
        self.issues_get_by_id(id).await
    }

    async fn issues_open(&self) -> AppResult<Vec<Issue>> {
        self.issues_list_open().await
    }

    async fn issues_by_student(&self, student_id: i32) -> AppResult<Vec<Issue>> {
        self.issues_list_by_student(student_id).await
    }

    async fn issues_list(&self, query: &IssueQuery, now: DateTime<Utc>) -> AppResult<Vec<Issue>> {
        self.issues_search(query, now).await
    }

    async fn issues_open_count_for_student(&self, student_id: i32) -> AppResult<i64> {
        self.issues_count_open_for_student(student_id).await
    }

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(issues::PgStoreTx::new(tx)))
    }
}
