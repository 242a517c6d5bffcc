//! Catalog service: books and students

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        Book, BookQuery, CreateBook, CreateStudent, Student, StudentQuery, UpdateBook,
        UpdateStudent,
    },
    repository::Store,
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // ---- Books ----

    pub async fn search_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        self.store.books_list(query).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.store
            .books_get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    pub async fn create_book(&self, data: &CreateBook) -> AppResult<Book> {
        data.validate()?;
        let book = self.store.books_create(data).await?;
        tracing::info!(book_id = book.id, isbn = %book.isbn, "Book created");
        Ok(book)
    }

    /// Update a book. Lowering `copies` below the number of copies out on
    /// issues is refused. The book row stays locked while the change is
    /// checked and applied, so a concurrent issue cannot slip in between.
    pub async fn update_book(&self, id: i32, data: &UpdateBook) -> AppResult<Book> {
        data.validate()?;

        let mut tx = self.store.begin().await?;
        let current = tx
            .lock_books(&[id])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))?;

        if let Some(copies) = data.copies {
            if copies < current.issued_copies() {
                return Err(AppError::Validation(format!(
                    "Book {} has {} copies out on issue, cannot lower copies to {}",
                    id,
                    current.issued_copies(),
                    copies
                )));
            }
        }

        let book = tx
            .update_book(id, data)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))?;
        tx.commit().await?;

        tracing::info!(book_id = id, "Book updated");
        Ok(book)
    }

    /// Delete a book that no open issue holds
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        if tx.lock_books(&[id]).await?.is_empty() {
            return Err(AppError::NotFound(format!("Book {} not found", id)));
        }
        if tx.open_issues_holding(id).await? > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} is out on an open issue",
                id
            )));
        }
        tx.delete_book(id).await?;
        tx.commit().await?;

        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    // ---- Students ----

    pub async fn search_students(&self, query: &StudentQuery) -> AppResult<Vec<Student>> {
        self.store.students_list(query).await
    }

    pub async fn get_student(&self, id: i32) -> AppResult<Student> {
        self.store
            .students_get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))
    }

    pub async fn create_student(&self, data: &CreateStudent) -> AppResult<Student> {
        data.validate()?;
        let student = self.store.students_create(data).await?;
        tracing::info!(student_id = student.id, roll_number = %student.roll_number, "Student created");
        Ok(student)
    }

    pub async fn update_student(&self, id: i32, data: &UpdateStudent) -> AppResult<Student> {
        data.validate()?;
        self.store
            .students_update(id, data)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))
    }

    /// Delete a student without open issues
    pub async fn delete_student(&self, id: i32) -> AppResult<()> {
        if self.store.issues_open_count_for_student(id).await? > 0 {
            return Err(AppError::Conflict(format!(
                "Student {} still has books out",
                id
            )));
        }
        if !self.store.students_delete(id).await? {
            return Err(AppError::NotFound(format!("Student {} not found", id)));
        }
        tracing::info!(student_id = id, "Student deleted");
        Ok(())
    }

    // ---- Sample data ----

    /// Insert a few students and books when the catalog is empty
    pub async fn seed_sample_data(&self) -> AppResult<()> {
        if self.store.students_count().await? == 0 {
            for student in sample_students() {
                self.store.students_create(&student).await?;
            }
            tracing::info!("Added sample students");
        } else {
            tracing::info!("Students already present, skipping sample students");
        }

        if self.store.books_count().await? == 0 {
            for book in sample_books() {
                self.store.books_create(&book).await?;
            }
            tracing::info!("Added sample books");
        } else {
            tracing::info!("Books already present, skipping sample books");
        }

        Ok(())
    }
}

fn sample_students() -> Vec<CreateStudent> {
    vec![
        CreateStudent {
            name: "John Doe".to_string(),
            roll_number: "CS2023001".to_string(),
            department: "Computer Science".to_string(),
            semester: 3,
            phone: "1234567890".to_string(),
            email: "john.doe@example.com".to_string(),
        },
        CreateStudent {
            name: "Jane Smith".to_string(),
            roll_number: "CS2023002".to_string(),
            department: "Computer Science".to_string(),
            semester: 3,
            phone: "0987654321".to_string(),
            email: "jane.smith@example.com".to_string(),
        },
    ]
}

fn sample_books() -> Vec<CreateBook> {
    let book = |title: &str, author: &str, isbn: &str, copies, category: &str, desc: &str| {
        CreateBook {
            title: title.to_string(),
            author: author.to_string(),
            isbn: isbn.to_string(),
            copies,
            category: category.to_string(),
            description: Some(desc.to_string()),
        }
    };

    vec![
        book(
            "The Great Gatsby",
            "F. Scott Fitzgerald",
            "978-0743273565",
            5,
            "Fiction",
            "A story of the fabulously wealthy Jay Gatsby and his love for the beautiful Daisy Buchanan.",
        ),
        book(
            "To Kill a Mockingbird",
            "Harper Lee",
            "978-0446310789",
            3,
            "Fiction",
            "The story of racial injustice and the loss of innocence in the American South.",
        ),
        book(
            "1984",
            "George Orwell",
            "978-0451524935",
            4,
            "Science Fiction",
            "A dystopian social science fiction novel and cautionary tale.",
        ),
    ]
}
