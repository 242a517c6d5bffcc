//! Issue / return endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    error::AppResult,
    models::issue::{IssueBooksRequest, IssueQuery, IssueView},
};

/// Issue one or more books to a student
#[utoipa::path(
    post,
    path = "/issues/issue",
    tag = "issues",
    request_body = IssueBooksRequest,
    responses(
        (status = 201, description = "Books issued", body = IssueView),
        (status = 400, description = "Neither or both of book_id / book_ids given"),
        (status = 404, description = "Student or book not found"),
        (status = 409, description = "Books not available", body = crate::error::ErrorResponse)
    )
)]
pub async fn issue_books(
    State(state): State<crate::AppState>,
    Json(request): Json<IssueBooksRequest>,
) -> AppResult<(StatusCode, Json<IssueView>)> {
    let book_ids = request.requested_book_ids()?;
    let issue = state
        .services
        .issues
        .issue_books(request.student_id, &book_ids, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// Return one book of an issue
#[utoipa::path(
    put,
    path = "/issues/{id}/return/{book_id}",
    tag = "issues",
    params(
        ("id" = i32, Path, description = "Issue ID"),
        ("book_id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = IssueView),
        (status = 404, description = "Issue not found or book not on the issue"),
        (status = 409, description = "Issue already fully returned")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    Path((issue_id, book_id)): Path<(i32, i32)>,
) -> AppResult<Json<IssueView>> {
    let issue = state
        .services
        .issues
        .return_book(issue_id, book_id, Utc::now())
        .await?;
    Ok(Json(issue))
}

/// Get an issue
#[utoipa::path(
    get,
    path = "/issues/{id}",
    tag = "issues",
    params(
        ("id" = i32, Path, description = "Issue ID")
    ),
    responses(
        (status = 200, description = "Issue details", body = IssueView),
        (status = 404, description = "Issue not found")
    )
)]
pub async fn get_issue(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<IssueView>> {
    let issue = state.services.issues.get_issue(id, Utc::now()).await?;
    Ok(Json(issue))
}

/// Issues of a student, newest first
#[utoipa::path(
    get,
    path = "/issues/student/{student_id}",
    tag = "issues",
    params(
        ("student_id" = i32, Path, description = "Student ID")
    ),
    responses(
        (status = 200, description = "Student's issues", body = Vec<IssueView>),
        (status = 404, description = "Student not found")
    )
)]
pub async fn get_student_issues(
    State(state): State<crate::AppState>,
    Path(student_id): Path<i32>,
) -> AppResult<Json<Vec<IssueView>>> {
    let issues = state
        .services
        .issues
        .list_by_student(student_id, Utc::now())
        .await?;
    Ok(Json(issues))
}

/// Open issues past their due date
#[utoipa::path(
    get,
    path = "/issues/overdue",
    tag = "issues",
    responses(
        (status = 200, description = "Overdue issues", body = Vec<IssueView>)
    )
)]
pub async fn get_overdue_issues(
    State(state): State<crate::AppState>,
) -> AppResult<Json<Vec<IssueView>>> {
    let issues = state.services.issues.list_overdue(Utc::now()).await?;
    Ok(Json(issues))
}

/// List issues with optional filters
#[utoipa::path(
    get,
    path = "/issues/list",
    tag = "issues",
    params(IssueQuery),
    responses(
        (status = 200, description = "Matching issues, newest first", body = Vec<IssueView>)
    )
)]
pub async fn list_issues(
    State(state): State<crate::AppState>,
    Query(query): Query<IssueQuery>,
) -> AppResult<Json<Vec<IssueView>>> {
    let issues = state.services.issues.list_issues(&query, Utc::now()).await?;
    Ok(Json(issues))
}
