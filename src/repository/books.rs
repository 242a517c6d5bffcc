//! Books repository for database operations

use chrono::Utc;
use sqlx::PgConnection;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{page_bounds, Book, BookQuery, CreateBook, UpdateBook},
};

impl Repository {
    /// Get book by ID
    pub async fn books_get_by_id(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    /// Search books by title / author substring and exact category
    pub async fn books_search(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let (offset, limit) = page_bounds(query.page, query.limit);

        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE ($1::varchar IS NULL OR title ILIKE '%' || $1 || '%')
              AND ($2::varchar IS NULL OR author ILIKE '%' || $2 || '%')
              AND ($3::varchar IS NULL OR category = $3)
            ORDER BY id
            OFFSET $4 LIMIT $5
            "#,
        )
        .bind(&query.title)
        .bind(&query.author)
        .bind(&query.category)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    /// Create a book with every copy available
    pub async fn books_insert(&self, data: &CreateBook) -> AppResult<Book> {
        let now = Utc::now();

        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, copies, available_copies, category,
                               description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(&data.title)
        .bind(&data.author)
        .bind(&data.isbn)
        .bind(data.copies)
        .bind(&data.category)
        .bind(&data.description)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_write(e, &format!("Book with ISBN {}", data.isbn)))
    }

    /// Count books in the catalog
    pub async fn books_count_all(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Update a book inside a transaction. Right-hand sides see the old row,
/// so the copies delta is applied to `available_copies` in the same
/// statement.
pub(super) async fn update_book(
    conn: &mut PgConnection,
    id: i32,
    data: &UpdateBook,
) -> AppResult<Option<Book>> {
    sqlx::query_as::<_, Book>(
        r#"
        UPDATE books SET
            title = COALESCE($2, title),
            author = COALESCE($3, author),
            isbn = COALESCE($4, isbn),
            available_copies = available_copies + COALESCE($5, copies) - copies,
            copies = COALESCE($5, copies),
            category = COALESCE($6, category),
            description = COALESCE($7, description),
            updated_at = $8
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&data.title)
    .bind(&data.author)
    .bind(&data.isbn)
    .bind(data.copies)
    .bind(&data.category)
    .bind(&data.description)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::from_write(e, &format!("Book {}", id)))
}

/// Delete a book inside a transaction
pub(super) async fn delete_book(conn: &mut PgConnection, id: i32) -> AppResult<()> {
    sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await
        .map_err(|e| AppError::from_write(e, &format!("Book {}", id)))?;
    Ok(())
}
