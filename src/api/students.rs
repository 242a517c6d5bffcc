//! Student endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::student::{CreateStudent, Student, StudentQuery, UpdateStudent},
};

/// List students
#[utoipa::path(
    get,
    path = "/students",
    tag = "students",
    params(StudentQuery),
    responses(
        (status = 200, description = "List of students", body = Vec<Student>)
    )
)]
pub async fn list_students(
    State(state): State<crate::AppState>,
    Query(query): Query<StudentQuery>,
) -> AppResult<Json<Vec<Student>>> {
    let students = state.services.catalog.search_students(&query).await?;
    Ok(Json(students))
}

/// Get student by ID
#[utoipa::path(
    get,
    path = "/students/{id}",
    tag = "students",
    params(
        ("id" = i32, Path, description = "Student ID")
    ),
    responses(
        (status = 200, description = "Student details", body = Student),
        (status = 404, description = "Student not found")
    )
)]
pub async fn get_student(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Student>> {
    let student = state.services.catalog.get_student(id).await?;
    Ok(Json(student))
}

/// Register a student
#[utoipa::path(
    post,
    path = "/students",
    tag = "students",
    request_body = CreateStudent,
    responses(
        (status = 201, description = "Student created", body = Student),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Roll number, phone or email already in use")
    )
)]
pub async fn create_student(
    State(state): State<crate::AppState>,
    Json(data): Json<CreateStudent>,
) -> AppResult<(StatusCode, Json<Student>)> {
    let created = state.services.catalog.create_student(&data).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a student profile
#[utoipa::path(
    put,
    path = "/students/{id}",
    tag = "students",
    params(
        ("id" = i32, Path, description = "Student ID")
    ),
    request_body = UpdateStudent,
    responses(
        (status = 200, description = "Student updated", body = Student),
        (status = 404, description = "Student not found"),
        (status = 409, description = "Roll number, phone or email already in use")
    )
)]
pub async fn update_student(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
    Json(data): Json<UpdateStudent>,
) -> AppResult<Json<Student>> {
    let updated = state.services.catalog.update_student(id, &data).await?;
    Ok(Json(updated))
}

/// Delete a student
#[utoipa::path(
    delete,
    path = "/students/{id}",
    tag = "students",
    params(
        ("id" = i32, Path, description = "Student ID")
    ),
    responses(
        (status = 204, description = "Student deleted"),
        (status = 404, description = "Student not found"),
        (status = 409, description = "Student has issues on record")
    )
)]
pub async fn delete_student(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_student(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
