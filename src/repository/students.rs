//! Students repository for database operations

use chrono::Utc;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{page_bounds, CreateStudent, Student, StudentQuery, UpdateStudent},
};

impl Repository {
    /// Get student by ID
    pub async fn students_get_by_id(&self, id: i32) -> AppResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    /// Search students by department, semester and free text
    pub async fn students_search(&self, query: &StudentQuery) -> AppResult<Vec<Student>> {
        let (offset, limit) = page_bounds(query.page, query.limit);

        let students = sqlx::query_as::<_, Student>(
            r#"
            SELECT * FROM students
            WHERE ($1::varchar IS NULL OR department = $1)
              AND ($2::integer IS NULL OR semester = $2)
              AND ($3::varchar IS NULL
                   OR name ILIKE '%' || $3 || '%'
                   OR roll_number ILIKE '%' || $3 || '%'
                   OR phone ILIKE '%' || $3 || '%')
            ORDER BY id
            OFFSET $4 LIMIT $5
            "#,
        )
        .bind(&query.department)
        .bind(query.semester)
        .bind(&query.search)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(students)
    }

    /// Create a student
    pub async fn students_insert(&self, data: &CreateStudent) -> AppResult<Student> {
        let now = Utc::now();

        sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students (name, roll_number, department, semester, phone, email,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.roll_number)
        .bind(&data.department)
        .bind(data.semester)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_write(e, "Student with this roll number, phone or email")
        })
    }

    /// Update a student profile
    pub async fn students_update_student(
        &self,
        id: i32,
        data: &UpdateStudent,
    ) -> AppResult<Option<Student>> {
        sqlx::query_as::<_, Student>(
            r#"
            UPDATE students SET
                name = COALESCE($2, name),
                roll_number = COALESCE($3, roll_number),
                department = COALESCE($4, department),
                semester = COALESCE($5, semester),
                phone = COALESCE($6, phone),
                email = COALESCE($7, email),
                updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.roll_number)
        .bind(&data.department)
        .bind(data.semester)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_write(e, "Student with this roll number, phone or email")
        })
    }

    /// Delete a student
    pub async fn students_delete_student(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_write(e, &format!("Student {}", id)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Count registered students
    pub async fn students_count_all(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
