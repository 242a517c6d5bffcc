//! Issue (books handed out to a student) model and related types
//!
//! One issue row holds every book a student took out on a given day. The
//! row stays open while `returned_date` is null and shrinks as books come
//! back; returning the last book closes it and freezes `is_overdue`.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::{book::Book, student::Student};
use crate::error::{AppError, AppResult};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Separator used in the denormalized title string
pub const TITLE_SEPARATOR: &str = ", ";

/// Whole days in a duration, rounded toward negative infinity.
pub fn whole_days(delta: Duration) -> i64 {
    delta.num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Sorted, de-duplicated titles joined for display
pub fn join_titles<'a>(titles: impl IntoIterator<Item = &'a str>) -> String {
    titles
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(TITLE_SEPARATOR)
}

/// Issue model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Issue {
    pub id: i32,
    pub student_id: i32,
    /// Books still out on this issue
    pub book_ids: Vec<i32>,
    pub books_titles: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Set when the last book comes back
    pub returned_date: Option<DateTime<Utc>>,
    /// Frozen on close: whether the issue was returned late
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived issue status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Overdue,
    Closed,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.returned_date.is_none()
    }

    pub fn holds(&self, book_id: i32) -> bool {
        self.book_ids.contains(&book_id)
    }

    /// Whether the issue was created on the given UTC calendar day
    pub fn issued_on(&self, day: NaiveDate) -> bool {
        self.issue_date.date_naive() == day
    }

    /// Add books to the set, skipping those already held.
    /// Returns the ids that were actually added.
    pub fn attach(&mut self, book_ids: &[i32]) -> Vec<i32> {
        let mut added = Vec::new();
        for &id in book_ids {
            if !self.holds(id) {
                self.book_ids.push(id);
                added.push(id);
            }
        }
        added
    }

    /// Remove a book from the set. Returns false when it was not held.
    pub fn detach(&mut self, book_id: i32) -> bool {
        let before = self.book_ids.len();
        self.book_ids.retain(|&id| id != book_id);
        self.book_ids.len() != before
    }

    /// Recompute the title string from the books still held
    pub fn retitle(&mut self, books: &[Book]) {
        self.books_titles = join_titles(
            books
                .iter()
                .filter(|b| self.holds(b.id))
                .map(|b| b.title.as_str()),
        );
    }

    /// Stamp the return date and freeze the overdue flag
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.returned_date = Some(now);
        self.is_overdue = now > self.due_date;
        self.updated_at = now;
    }

    /// Whole days left until the due date (negative once past due)
    pub fn days_until_due(&self, now: DateTime<Utc>) -> i64 {
        whole_days(self.due_date - now)
    }

    pub fn status(&self, now: DateTime<Utc>) -> IssueStatus {
        if !self.is_open() {
            IssueStatus::Closed
        } else if self.due_date < now {
            IssueStatus::Overdue
        } else {
            IssueStatus::Open
        }
    }
}

/// Issue row to insert
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub student_id: i32,
    pub book_ids: Vec<i32>,
    pub books_titles: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

impl NewIssue {
    pub fn new(student_id: i32, books: &[Book], now: DateTime<Utc>, loan_period: Duration) -> Self {
        Self {
            student_id,
            book_ids: books.iter().map(|b| b.id).collect(),
            books_titles: join_titles(books.iter().map(|b| b.title.as_str())),
            issue_date: now,
            due_date: now + loan_period,
        }
    }
}

/// Issue with its live-derived fields, as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueView {
    pub id: i32,
    pub student_id: i32,
    pub book_ids: Vec<i32>,
    pub books_titles: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_date: Option<DateTime<Utc>>,
    /// Live for open issues, frozen once closed
    pub is_overdue: bool,
    pub status: IssueStatus,
    /// Whole days left, for open issues not yet due
    pub days_remaining: Option<i64>,
    /// Whole days past due, for open overdue issues
    pub days_overdue: Option<i64>,
    pub student: Option<Student>,
}

impl IssueView {
    pub fn new(issue: Issue, student: Option<Student>, now: DateTime<Utc>) -> Self {
        let status = issue.status(now);
        let (is_overdue, days_remaining, days_overdue) = match status {
            IssueStatus::Closed => (issue.is_overdue, None, None),
            IssueStatus::Overdue => (true, None, Some(whole_days(now - issue.due_date))),
            IssueStatus::Open => (false, Some(issue.days_until_due(now)), None),
        };

        Self {
            id: issue.id,
            student_id: issue.student_id,
            book_ids: issue.book_ids,
            books_titles: issue.books_titles,
            issue_date: issue.issue_date,
            due_date: issue.due_date,
            returned_date: issue.returned_date,
            is_overdue,
            status,
            days_remaining,
            days_overdue,
            student,
        }
    }
}

/// Issue list filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct IssueQuery {
    /// Issues of this student
    pub student_id: Option<i32>,
    /// Open issues currently holding this book
    pub book_id: Option<i32>,
    /// `true`: open and past due; `false`: everything else
    pub is_overdue: Option<bool>,
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Issues per page (default: 10)
    pub limit: Option<i64>,
}

impl IssueQuery {
    /// In-memory equivalent of the store's issue filter
    pub fn matches(&self, issue: &Issue, now: DateTime<Utc>) -> bool {
        self.student_id.map_or(true, |id| issue.student_id == id)
            && self.book_id.map_or(true, |id| issue.holds(id))
            && self
                .is_overdue
                .map_or(true, |overdue| (issue.status(now) == IssueStatus::Overdue) == overdue)
    }
}

/// Issue books request: exactly one of `book_id` / `book_ids`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IssueBooksRequest {
    pub student_id: i32,
    /// Single book to issue
    pub book_id: Option<i32>,
    /// Several books to issue together
    pub book_ids: Option<Vec<i32>>,
}

impl IssueBooksRequest {
    /// Requested book ids, duplicates removed, request order kept
    pub fn requested_book_ids(&self) -> AppResult<Vec<i32>> {
        let many = self.book_ids.as_deref().filter(|ids| !ids.is_empty());
        let ids: Vec<i32> = match (self.book_id, many) {
            (Some(id), None) => vec![id],
            (None, Some(ids)) => ids.to_vec(),
            (None, None) => {
                return Err(AppError::InvalidRequest(
                    "Either book_id or at least one id in book_ids must be provided".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(AppError::InvalidRequest(
                    "Cannot provide both book_id and book_ids".to_string(),
                ))
            }
        };

        let mut seen = BTreeSet::new();
        Ok(ids.into_iter().filter(|id| seen.insert(*id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    fn book(id: i32, title: &str) -> Book {
        Book {
            id,
            title: title.to_string(),
            author: "Author".to_string(),
            isbn: format!("isbn-{}", id),
            copies: 2,
            available_copies: 2,
            category: "Fiction".to_string(),
            description: None,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    fn issue(book_ids: Vec<i32>) -> Issue {
        Issue {
            id: 1,
            student_id: 1,
            book_ids,
            books_titles: String::new(),
            issue_date: t0(),
            due_date: t0() + Duration::days(15),
            returned_date: None,
            is_overdue: false,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    #[test]
    fn test_whole_days_floors() {
        assert_eq!(whole_days(Duration::days(5)), 5);
        assert_eq!(whole_days(Duration::hours(47)), 1);
        assert_eq!(whole_days(Duration::hours(-1)), -1);
        assert_eq!(whole_days(Duration::zero()), 0);
    }

    #[test]
    fn test_join_titles_sorted_and_unique() {
        assert_eq!(join_titles(["Dune", "1984", "Dune"]), "1984, Dune");
        assert_eq!(join_titles(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_new_issue_due_date() {
        let new = NewIssue::new(4, &[book(2, "b"), book(1, "a")], t0(), Duration::days(15));
        assert_eq!(new.book_ids, vec![2, 1]);
        assert_eq!(new.books_titles, "a, b");
        assert_eq!(new.due_date, t0() + Duration::days(15));
    }

    #[test]
    fn test_attach_skips_held_books() {
        let mut i = issue(vec![1, 2]);
        assert_eq!(i.attach(&[2, 3]), vec![3]);
        assert_eq!(i.book_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_issue_query_filters() {
        let open = issue(vec![1, 2]);
        let late = t0() + Duration::days(16);

        assert!(IssueQuery::default().matches(&open, t0()));
        assert!(IssueQuery {
            student_id: Some(1),
            book_id: Some(2),
            ..Default::default()
        }
        .matches(&open, t0()));
        assert!(!IssueQuery {
            book_id: Some(3),
            ..Default::default()
        }
        .matches(&open, t0()));

        let overdue = IssueQuery {
            is_overdue: Some(true),
            ..Default::default()
        };
        assert!(!overdue.matches(&open, t0()));
        assert!(overdue.matches(&open, late));

        let mut closed = issue(vec![]);
        closed.close(late);
        assert!(!overdue.matches(&closed, late));
        assert!(IssueQuery {
            is_overdue: Some(false),
            ..Default::default()
        }
        .matches(&closed, late));
    }

    #[test]
    fn test_detach_and_retitle() {
        let mut i = issue(vec![1, 2]);
        assert!(i.detach(1));
        assert!(!i.detach(1));
        i.retitle(&[book(1, "Dune"), book(2, "Emma")]);
        assert_eq!(i.books_titles, "Emma");
    }

    #[test]
    fn test_close_freezes_overdue() {
        let mut late = issue(vec![]);
        late.close(t0() + Duration::days(16));
        assert!(late.is_overdue);
        assert_eq!(late.status(t0() + Duration::days(100)), IssueStatus::Closed);

        let mut on_time = issue(vec![]);
        on_time.close(t0() + Duration::days(3));
        assert!(!on_time.is_overdue);
    }

    #[test]
    fn test_view_days_overdue() {
        let view = IssueView::new(issue(vec![1]), None, t0() + Duration::days(20));
        assert_eq!(view.status, IssueStatus::Overdue);
        assert!(view.is_overdue);
        assert_eq!(view.days_overdue, Some(5));
        assert_eq!(view.days_remaining, None);
    }

    #[test]
    fn test_view_days_remaining() {
        let view = IssueView::new(issue(vec![1]), None, t0() + Duration::days(4));
        assert_eq!(view.status, IssueStatus::Open);
        assert!(!view.is_overdue);
        assert_eq!(view.days_remaining, Some(11));
    }

    #[test]
    fn test_view_of_closed_issue_uses_frozen_flag() {
        let mut i = issue(vec![]);
        i.close(t0() + Duration::days(1));
        let view = IssueView::new(i, None, t0() + Duration::days(90));
        assert!(!view.is_overdue);
        assert_eq!(view.status, IssueStatus::Closed);
        assert_eq!(view.days_overdue, None);
    }

    #[test]
    fn test_requested_book_ids() {
        let req = |book_id, book_ids| IssueBooksRequest {
            student_id: 1,
            book_id,
            book_ids,
        };

        assert_eq!(req(Some(3), None).requested_book_ids().unwrap(), vec![3]);
        assert_eq!(
            req(None, Some(vec![4, 2, 4])).requested_book_ids().unwrap(),
            vec![4, 2]
        );
        assert!(matches!(
            req(None, None).requested_book_ids(),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            req(None, Some(vec![])).requested_book_ids(),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            req(Some(1), Some(vec![2])).requested_book_ids(),
            Err(AppError::InvalidRequest(_))
        ));
    }
}
