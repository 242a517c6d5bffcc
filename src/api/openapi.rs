//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, issues, reminders, students};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "1.0.0",
        description = "Library Management System REST API: catalog, students and book issues"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Students
        students::list_students,
        students::get_student,
        students::create_student,
        students::update_student,
        students::delete_student,
        // Issues
        issues::issue_books,
        issues::return_book,
        issues::get_issue,
        issues::get_student_issues,
        issues::get_overdue_issues,
        issues::list_issues,
        // Reminders
        reminders::run_now,
        reminders::notify_overdue,
    ),
    components(
        schemas(
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::student::Student,
            crate::models::student::CreateStudent,
            crate::models::student::UpdateStudent,
            crate::models::issue::Issue,
            crate::models::issue::IssueStatus,
            crate::models::issue::IssueView,
            crate::models::issue::IssueBooksRequest,
            crate::services::reminders::ReminderReport,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book catalog"),
        (name = "students", description = "Student records"),
        (name = "issues", description = "Issuing and returning books"),
        (name = "reminders", description = "Due-date reminders and overdue notices")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
