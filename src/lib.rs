//! Library Management System
//!
//! REST JSON API for a small library: the book catalog, student records,
//! and the issue ledger tracking which student holds which books, plus a
//! daily e-mail reminder for loans coming due.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Books
        .route(
            "/books",
            get(api::books::list_books).post(api::books::create_book),
        )
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        // Students
        .route(
            "/students",
            get(api::students::list_students).post(api::students::create_student),
        )
        .route(
            "/students/:id",
            get(api::students::get_student)
                .put(api::students::update_student)
                .delete(api::students::delete_student),
        )
        // Issues
        .route("/issues/issue", post(api::issues::issue_books))
        .route("/issues/list", get(api::issues::list_issues))
        .route("/issues/overdue", get(api::issues::get_overdue_issues))
        .route(
            "/issues/overdue/notify",
            post(api::reminders::notify_overdue),
        )
        .route(
            "/issues/student/:student_id",
            get(api::issues::get_student_issues),
        )
        .route("/issues/:id", get(api::issues::get_issue))
        .route(
            "/issues/:id/return/:book_id",
            put(api::issues::return_book),
        )
        // Reminders
        .route("/reminders/run", post(api::reminders::run_now))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
