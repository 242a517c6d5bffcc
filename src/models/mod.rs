//! Data models for the library server

pub mod book;
pub mod issue;
pub mod student;

// Re-export commonly used types
pub use book::{Book, BookQuery, CreateBook, UpdateBook};
pub use issue::{Issue, IssueBooksRequest, IssueQuery, IssueStatus, IssueView, NewIssue};
pub use student::{CreateStudent, Student, StudentQuery, UpdateStudent};

/// Default page size for list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound on the page size a caller may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Turn optional `page` / `limit` query values into `(offset, limit)`.
/// Pages are 1-based. Huge page numbers saturate instead of overflowing.
pub fn page_bounds(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).max(1);
    ((page - 1).saturating_mul(limit), limit)
}
