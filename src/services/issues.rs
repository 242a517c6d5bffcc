//! Issue lifecycle: handing books out, taking them back, overdue tracking
//!
//! Every mutation runs in one store transaction: the issue row and the
//! copy counters of the books involved change together or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::LoansConfig,
    error::{join_ids, AppError, AppResult},
    models::{Book, Issue, IssueQuery, IssueStatus, IssueView, NewIssue, Student},
    repository::Store,
};

#[derive(Clone)]
pub struct IssuesService {
    store: Arc<dyn Store>,
    loan_period: Duration,
}

impl IssuesService {
    pub fn new(store: Arc<dyn Store>, loans: &LoansConfig) -> Self {
        Self {
            store,
            loan_period: Duration::days(loans.loan_period_days),
        }
    }

    /// Issue books to a student.
    ///
    /// An open issue the student received earlier the same (UTC) day absorbs
    /// the books; otherwise a new issue is created. Books the day's issue
    /// already holds are left alone, and an id repeated in the request counts
    /// once. Nothing is written unless every book exists and has a copy on
    /// the shelf.
    pub async fn issue_books(
        &self,
        student_id: i32,
        book_ids: &[i32],
        now: DateTime<Utc>,
    ) -> AppResult<IssueView> {
        let mut requested: Vec<i32> = Vec::with_capacity(book_ids.len());
        for &id in book_ids {
            if !requested.contains(&id) {
                requested.push(id);
            }
        }
        let book_ids = requested.as_slice();

        if book_ids.is_empty() {
            return Err(AppError::InvalidRequest(
                "At least one book id must be provided".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        // Held until commit: two issues for one student never interleave
        let student = tx
            .lock_student(student_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))?;

        let mut existing = tx.lock_open_issue_on(student_id, now.date_naive()).await?;

        let mut lock_ids = book_ids.to_vec();
        if let Some(ref issue) = existing {
            lock_ids.extend_from_slice(&issue.book_ids);
        }
        lock_ids.sort_unstable();
        lock_ids.dedup();
        let books: HashMap<i32, Book> = tx
            .lock_books(&lock_ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let missing: Vec<i32> = book_ids
            .iter()
            .copied()
            .filter(|id| !books.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::NotFound(format!(
                "Books not found: {}",
                join_ids(&missing)
            )));
        }

        let to_take = match existing.as_mut() {
            Some(issue) => issue.attach(book_ids),
            None => book_ids.to_vec(),
        };

        let unavailable: Vec<i32> = to_take
            .iter()
            .copied()
            .filter(|id| books.get(id).map_or(true, |b| !b.is_available()))
            .collect();
        if !unavailable.is_empty() {
            tracing::info!(
                student_id,
                book_ids = ?unavailable,
                "Issue rejected, books not available"
            );
            return Err(AppError::Unavailable {
                book_ids: unavailable,
            });
        }

        let issue = match existing {
            Some(mut issue) => {
                let held: Vec<Book> = books.values().cloned().collect();
                issue.retitle(&held);
                issue.updated_at = now;
                tx.update_issue(&issue).await?;
                tracing::info!(
                    issue_id = issue.id,
                    student_id,
                    added = ?to_take,
                    "Books added to today's issue"
                );
                issue
            }
            None => {
                let picked: Vec<Book> = book_ids
                    .iter()
                    .filter_map(|id| books.get(id).cloned())
                    .collect();
                let new = NewIssue::new(student_id, &picked, now, self.loan_period);
                let issue = tx.insert_issue(&new).await?;
                tracing::info!(
                    issue_id = issue.id,
                    student_id,
                    book_ids = ?issue.book_ids,
                    due_date = %issue.due_date,
                    "Issue created"
                );
                issue
            }
        };

        for id in &to_take {
            tx.take_copy(*id).await?;
        }

        tx.commit().await?;

        Ok(IssueView::new(issue, Some(student), now))
    }

    /// Take one book back. Returning the last book closes the issue and
    /// records whether it came back late.
    pub async fn return_book(
        &self,
        issue_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<IssueView> {
        let mut tx = self.store.begin().await?;

        let mut issue = tx
            .lock_issue(issue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Issue {} not found", issue_id)))?;

        if !issue.is_open() {
            return Err(AppError::AlreadyReturned(format!(
                "Issue {} was already fully returned",
                issue_id
            )));
        }
        if !issue.holds(book_id) {
            return Err(AppError::NotFound(format!(
                "Book {} is not out on issue {}",
                book_id, issue_id
            )));
        }

        let books = tx.lock_books(&issue.book_ids).await?;

        issue.detach(book_id);
        issue.retitle(&books);
        issue.updated_at = now;
        if issue.book_ids.is_empty() {
            issue.close(now);
        }

        tx.update_issue(&issue).await?;
        tx.put_back_copy(book_id).await?;
        tx.commit().await?;

        if issue.is_open() {
            tracing::info!(issue_id, book_id, remaining = ?issue.book_ids, "Book returned");
        } else {
            tracing::info!(
                issue_id,
                book_id,
                returned_late = issue.is_overdue,
                "Issue closed"
            );
        }

        let student = self.store.students_get(issue.student_id).await?;
        Ok(IssueView::new(issue, student, now))
    }

    /// Get a single issue
    pub async fn get_issue(&self, issue_id: i32, now: DateTime<Utc>) -> AppResult<IssueView> {
        let issue = self
            .store
            .issues_get(issue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Issue {} not found", issue_id)))?;
        let student = self.store.students_get(issue.student_id).await?;
        Ok(IssueView::new(issue, student, now))
    }

    /// Every issue of a student, newest first
    pub async fn list_by_student(
        &self,
        student_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<IssueView>> {
        let student = self
            .store
            .students_get(student_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))?;

        let issues = self.store.issues_by_student(student_id).await?;
        Ok(issues
            .into_iter()
            .map(|issue| IssueView::new(issue, Some(student.clone()), now))
            .collect())
    }

    /// Open issues past their due date, with their students
    pub async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<IssueView>> {
        let overdue: Vec<_> = self
            .store
            .issues_open()
            .await?
            .into_iter()
            .filter(|issue| issue.status(now) == IssueStatus::Overdue)
            .collect();

        self.with_students(overdue, now).await
    }

    /// Issues filtered by student, held book and overdue state, newest first
    pub async fn list_issues(
        &self,
        query: &IssueQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<IssueView>> {
        let issues = self.store.issues_list(query, now).await?;
        self.with_students(issues, now).await
    }

    async fn with_students(
        &self,
        issues: Vec<Issue>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<IssueView>> {
        let mut students: HashMap<i32, Option<Student>> = HashMap::new();
        let mut views = Vec::with_capacity(issues.len());
        for issue in issues {
            if !students.contains_key(&issue.student_id) {
                let student = self.store.students_get(issue.student_id).await?;
                if student.is_none() {
                    tracing::warn!(
                        issue_id = issue.id,
                        student_id = issue.student_id,
                        "Issue references a missing student"
                    );
                }
                students.insert(issue.student_id, student);
            }
            let student = students.get(&issue.student_id).cloned().flatten();
            views.push(IssueView::new(issue, student, now));
        }

        Ok(views)
    }
}
