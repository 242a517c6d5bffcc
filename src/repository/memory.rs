//! In-process store backed by `BTreeMap`s.
//!
//! Mirrors the PostgreSQL repository: uniqueness of ISBN, roll number,
//! phone and email; the copies range check; transactions that apply on
//! commit and vanish on drop. Transactions are serialized behind one
//! mutex, which also gives the row-lock behavior of `FOR UPDATE`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        page_bounds, Book, BookQuery, CreateBook, CreateStudent, Issue, IssueQuery, NewIssue,
        Student, StudentQuery, UpdateBook, UpdateStudent,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    books: BTreeMap<i32, Book>,
    students: BTreeMap<i32, Student>,
    issues: BTreeMap<i32, Issue>,
    last_book_id: i32,
    last_student_id: i32,
    last_issue_id: i32,
}

impl MemoryState {
    fn check_isbn(&self, isbn: &str, except: Option<i32>) -> AppResult<()> {
        if self
            .books
            .values()
            .any(|b| b.isbn == isbn && Some(b.id) != except)
        {
            return Err(AppError::Conflict(format!(
                "Book with ISBN {} already exists",
                isbn
            )));
        }
        Ok(())
    }

    fn check_student_keys(
        &self,
        roll_number: &str,
        phone: &str,
        email: &str,
        except: Option<i32>,
    ) -> AppResult<()> {
        let taken = self.students.values().any(|s| {
            Some(s.id) != except
                && (s.roll_number == roll_number || s.phone == phone || s.email == email)
        });
        if taken {
            return Err(AppError::Conflict(
                "Student with this roll number, phone or email already exists".to_string(),
            ));
        }
        Ok(())
    }

    fn update_book(&mut self, id: i32, data: &UpdateBook) -> AppResult<Option<Book>> {
        if let Some(ref isbn) = data.isbn {
            self.check_isbn(isbn, Some(id))?;
        }

        let Some(book) = self.books.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(copies) = data.copies {
            let available = book.available_copies + copies - book.copies;
            if available < 0 {
                return Err(AppError::Conflict(format!(
                    "Book {} has more copies issued than {}",
                    id, copies
                )));
            }
            book.available_copies = available;
            book.copies = copies;
        }
        if let Some(ref title) = data.title {
            book.title = title.clone();
        }
        if let Some(ref author) = data.author {
            book.author = author.clone();
        }
        if let Some(ref isbn) = data.isbn {
            book.isbn = isbn.clone();
        }
        if let Some(ref category) = data.category {
            book.category = category.clone();
        }
        if data.description.is_some() {
            book.description = data.description.clone();
        }
        book.updated_at = Utc::now();

        Ok(Some(book.clone()))
    }
}

fn paginate<T: Clone>(rows: Vec<&T>, page: Option<i64>, limit: Option<i64>) -> Vec<T> {
    let (offset, limit) = page_bounds(page, limit);
    rows.into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Store kept entirely in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn books_create(&self, data: &CreateBook) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        state.check_isbn(&data.isbn, None)?;

        let now = Utc::now();
        state.last_book_id += 1;
        let book = Book {
            id: state.last_book_id,
            title: data.title.clone(),
            author: data.author.clone(),
            isbn: data.isbn.clone(),
            copies: data.copies,
            available_copies: data.copies,
            category: data.category.clone(),
            description: data.description.clone(),
            created_at: now,
            updated_at: now,
        };
        state.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn books_list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        let rows = state.books.values().filter(|b| b.matches(query)).collect();
        Ok(paginate(rows, query.page, query.limit))
    }

    async fn books_get(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn books_count(&self) -> AppResult<i64> {
        Ok(self.state.lock().await.books.len() as i64)
    }

    async fn students_create(&self, data: &CreateStudent) -> AppResult<Student> {
        let mut state = self.state.lock().await;
        state.check_student_keys(&data.roll_number, &data.phone, &data.email, None)?;

        let now = Utc::now();
        state.last_student_id += 1;
        let student = Student {
            id: state.last_student_id,
            name: data.name.clone(),
            roll_number: data.roll_number.clone(),
            department: data.department.clone(),
            semester: data.semester,
            phone: data.phone.clone(),
            email: data.email.clone(),
            created_at: now,
            updated_at: now,
        };
        state.students.insert(student.id, student.clone());
        Ok(student)
    }

    async fn students_list(&self, query: &StudentQuery) -> AppResult<Vec<Student>> {
        let state = self.state.lock().await;
        let rows = state.students.values().filter(|s| s.matches(query)).collect();
        Ok(paginate(rows, query.page, query.limit))
    }

    async fn students_get(&self, id: i32) -> AppResult<Option<Student>> {
        Ok(self.state.lock().await.students.get(&id).cloned())
    }

    async fn students_update(&self, id: i32, data: &UpdateStudent) -> AppResult<Option<Student>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.students.get(&id).cloned() else {
            return Ok(None);
        };

        let mut student = current;
        if let Some(ref name) = data.name {
            student.name = name.clone();
        }
        if let Some(ref roll_number) = data.roll_number {
            student.roll_number = roll_number.clone();
        }
        if let Some(ref department) = data.department {
            student.department = department.clone();
        }
        if let Some(semester) = data.semester {
            student.semester = semester;
        }
        if let Some(ref phone) = data.phone {
            student.phone = phone.clone();
        }
        if let Some(ref email) = data.email {
            student.email = email.clone();
        }
        state.check_student_keys(&student.roll_number, &student.phone, &student.email, Some(id))?;

        student.updated_at = Utc::now();
        state.students.insert(id, student.clone());
        Ok(Some(student))
    }

    async fn students_delete(&self, id: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.issues.values().any(|i| i.student_id == id) {
            return Err(AppError::Conflict(format!(
                "Student {} is referenced by issues",
                id
            )));
        }
        Ok(state.students.remove(&id).is_some())
    }

    async fn students_count(&self) -> AppResult<i64> {
        Ok(self.state.lock().await.students.len() as i64)
    }

    async fn issues_get(&self, id: i32) -> AppResult<Option<Issue>> {
        Ok(self.state.lock().await.issues.get(&id).cloned())
    }

    async fn issues_open(&self) -> AppResult<Vec<Issue>> {
        let state = self.state.lock().await;
        let mut issues: Vec<Issue> = state
            .issues
            .values()
            .filter(|i| i.is_open())
            .cloned()
            .collect();
        issues.sort_by_key(|i| (i.due_date, i.id));
        Ok(issues)
    }

    async fn issues_by_student(&self, student_id: i32) -> AppResult<Vec<Issue>> {
        let state = self.state.lock().await;
        let mut issues: Vec<Issue> = state
            .issues
            .values()
            .filter(|i| i.student_id == student_id)
            .cloned()
            .collect();
        issues.sort_by(|a, b| (b.issue_date, b.id).cmp(&(a.issue_date, a.id)));
        Ok(issues)
    }

    async fn issues_list(&self, query: &IssueQuery, now: DateTime<Utc>) -> AppResult<Vec<Issue>> {
        let state = self.state.lock().await;
        let mut rows: Vec<&Issue> = state
            .issues
            .values()
            .filter(|i| query.matches(i, now))
            .collect();
        rows.sort_by(|a, b| (b.issue_date, b.id).cmp(&(a.issue_date, a.id)));
        Ok(paginate(rows, query.page, query.limit))
    }

    async fn issues_open_count_for_student(&self, student_id: i32) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .issues
            .values()
            .filter(|i| i.is_open() && i.student_id == student_id)
            .count() as i64)
    }

    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

/// Transaction over a private copy of the state, written back on commit
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_student(&mut self, id: i32) -> AppResult<Option<Student>> {
        Ok(self.work.students.get(&id).cloned())
    }

    async fn lock_books(&mut self, ids: &[i32]) -> AppResult<Vec<Book>> {
        // BTreeMap iteration is already in id order
        Ok(self
            .work
            .books
            .values()
            .filter(|b| ids.contains(&b.id))
            .cloned()
            .collect())
    }

    async fn lock_open_issue_on(
        &mut self,
        student_id: i32,
        day: NaiveDate,
    ) -> AppResult<Option<Issue>> {
        Ok(self
            .work
            .issues
            .values()
            .find(|i| i.student_id == student_id && i.is_open() && i.issued_on(day))
            .cloned())
    }

    async fn lock_issue(&mut self, id: i32) -> AppResult<Option<Issue>> {
        Ok(self.work.issues.get(&id).cloned())
    }

    async fn insert_issue(&mut self, new: &NewIssue) -> AppResult<Issue> {
        if !self.work.students.contains_key(&new.student_id) {
            return Err(AppError::Conflict(format!(
                "Student {} does not exist",
                new.student_id
            )));
        }

        self.work.last_issue_id += 1;
        let issue = Issue {
            id: self.work.last_issue_id,
            student_id: new.student_id,
            book_ids: new.book_ids.clone(),
            books_titles: new.books_titles.clone(),
            issue_date: new.issue_date,
            due_date: new.due_date,
            returned_date: None,
            is_overdue: false,
            created_at: new.issue_date,
            updated_at: new.issue_date,
        };
        self.work.issues.insert(issue.id, issue.clone());
        Ok(issue)
    }

    async fn update_issue(&mut self, issue: &Issue) -> AppResult<()> {
        match self.work.issues.get_mut(&issue.id) {
            Some(row) => {
                *row = issue.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Issue {} not found", issue.id))),
        }
    }

    async fn take_copy(&mut self, book_id: i32) -> AppResult<()> {
        match self.work.books.get_mut(&book_id) {
            Some(book) if book.available_copies > 0 => {
                book.available_copies -= 1;
                book.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(AppError::Conflict(format!(
                "Book {} ran out of copies during the issue",
                book_id
            ))),
        }
    }

    async fn put_back_copy(&mut self, book_id: i32) -> AppResult<()> {
        if let Some(book) = self.work.books.get_mut(&book_id) {
            book.available_copies = (book.available_copies + 1).min(book.copies);
            book.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn open_issues_holding(&mut self, book_id: i32) -> AppResult<i64> {
        Ok(self
            .work
            .issues
            .values()
            .filter(|i| i.is_open() && i.holds(book_id))
            .count() as i64)
    }

    async fn update_book(&mut self, id: i32, data: &UpdateBook) -> AppResult<Option<Book>> {
        self.work.update_book(id, data)
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<()> {
        self.work.books.remove(&id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
