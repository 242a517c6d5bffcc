//! In-process router tests over the in-memory store

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_server::{
    config::AppConfig,
    create_router,
    repository::MemoryStore,
    services::{email::Notifier, Services},
    AppResult, AppState,
};

/// Notifier that records recipients instead of sending mail
#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> AppResult<()> {
        self.sent.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

fn app_with(config: AppConfig) -> (Router, Arc<Outbox>) {
    app_over(Arc::new(MemoryStore::new()), config)
}

fn app_over(store: Arc<MemoryStore>, config: AppConfig) -> (Router, Arc<Outbox>) {
    let outbox = Arc::new(Outbox::default());
    let services = Services::new(store, outbox.clone(), &config.loans);
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    (create_router(state), outbox)
}

fn app() -> Router {
    app_with(AppConfig::default()).0
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_book(app: &Router, isbn: &str, copies: i32) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/books",
        Some(json!({
            "title": format!("Book {}", isbn),
            "author": "Author",
            "isbn": isbn,
            "copies": copies,
            "category": "Fiction"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn create_student(app: &Router, roll: &str) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/students",
        Some(json!({
            "name": format!("Student {}", roll),
            "roll_number": roll,
            "department": "Computer Science",
            "semester": 3,
            "phone": format!("555-{}", roll),
            "email": format!("{}@example.com", roll.to_lowercase())
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, Method::GET, "/api/v1/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_book_crud() {
    let app = app();
    let id = create_book(&app, "978-1", 2).await;

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/books/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_copies"], 2);

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/books/{}", id),
        Some(json!({ "copies": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["copies"], 4);
    assert_eq!(body["available_copies"], 4);

    let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/books/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/books/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchData");
}

#[tokio::test]
async fn test_invalid_and_duplicate_books_rejected() {
    let app = app();
    create_book(&app, "978-dup", 1).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(json!({
            "title": "",
            "author": "Author",
            "isbn": "978-x",
            "copies": 1,
            "category": "Fiction"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(json!({
            "title": "Other",
            "author": "Author",
            "isbn": "978-dup",
            "copies": 1,
            "category": "Fiction"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_books_filters_by_category() {
    let app = app();
    create_book(&app, "978-a", 1).await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(json!({
            "title": "Cosmos",
            "author": "Carl Sagan",
            "isbn": "978-b",
            "copies": 1,
            "category": "Science"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app, Method::GET, "/api/v1/books?category=Science", None).await;
    assert_eq!(status, StatusCode::OK);
    let books = body.as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["title"], "Cosmos");
}

#[tokio::test]
async fn test_issue_and_return_flow() {
    let app = app();
    let student = create_student(&app, "CS1").await;
    let book = create_book(&app, "978-2", 1).await;

    let (status, issue) = call(
        &app,
        Method::POST,
        "/api/v1/issues/issue",
        Some(json!({ "student_id": student, "book_id": book })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(issue["book_ids"], json!([book]));
    assert_eq!(issue["status"], "open");
    assert_eq!(issue["days_remaining"], 15);
    let issue_id = issue["id"].as_i64().unwrap();

    let (_, shelf) = call(&app, Method::GET, &format!("/api/v1/books/{}", book), None).await;
    assert_eq!(shelf["available_copies"], 0);

    // last copy is gone
    let other = create_student(&app, "CS2").await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/issues/issue",
        Some(json!({ "student_id": other, "book_ids": [book] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["book_ids"], json!([book]));

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/issues/{}/return/{}", issue_id, book),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");
    assert!(body["returned_date"].is_string());
    assert_eq!(body["student"]["id"], student);

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/issues/{}/return/{}", issue_id, book),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyReturned");

    let (_, shelf) = call(&app, Method::GET, &format!("/api/v1/books/{}", book), None).await;
    assert_eq!(shelf["available_copies"], 1);
}

#[tokio::test]
async fn test_issue_request_needs_exactly_one_book_field() {
    let app = app();
    let student = create_student(&app, "CS3").await;
    let book = create_book(&app, "978-3", 1).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/issues/issue",
        Some(json!({ "student_id": student, "book_id": book, "book_ids": [book] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/issues/issue",
        Some(json!({ "student_id": student })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_issue_lookups() {
    let app = app();
    let student = create_student(&app, "CS4").await;
    let first = create_book(&app, "978-4", 3).await;
    let second = create_book(&app, "978-5", 3).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/issues/issue",
        Some(json!({ "student_id": student, "book_ids": [first, second] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/issues/student/{}", student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["books_titles"], "Book 978-4, Book 978-5");

    let (status, body) = call(&app, Method::GET, "/api/v1/issues/overdue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, _) = call(&app, Method::GET, "/api/v1/issues/student/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, "/api/v1/issues/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_student_with_issues_cannot_be_deleted() {
    let app = app();
    let student = create_student(&app, "CS5").await;
    let book = create_book(&app, "978-6", 1).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/issues/issue",
        Some(json!({ "student_id": student, "book_id": book })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/students/{}", student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_manual_reminder_run() {
    let mut config = AppConfig::default();
    config.reminders.window_days = 15;
    let (app, outbox) = app_with(config);

    let student = create_student(&app, "CS6").await;
    let book = create_book(&app, "978-7", 1).await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/issues/issue",
        Some(json!({ "student_id": student, "book_id": book })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, report) = call(&app, Method::POST, "/api/v1/reminders/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report, json!({ "checked": 1, "sent": 1, "failed": 0 }));
    assert_eq!(*outbox.sent.lock().unwrap(), vec!["cs6@example.com".to_string()]);
}

#[tokio::test]
async fn test_sample_data_seeding_is_idempotent() {
    let services = Services::new(
        Arc::new(MemoryStore::new()),
        Arc::new(Outbox::default()),
        &AppConfig::default().loans,
    );

    tokio_test::assert_ok!(services.catalog.seed_sample_data().await);
    tokio_test::assert_ok!(services.catalog.seed_sample_data().await);

    let students = services
        .catalog
        .search_students(&Default::default())
        .await
        .unwrap();
    assert_eq!(students.len(), 2);
}

#[tokio::test]
async fn test_huge_page_is_empty() {
    let app = app();
    create_book(&app, "978-8", 1).await;

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/v1/books?page=9223372036854775807&limit=100",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_list_issues_with_filters() {
    let app = app();
    let first = create_student(&app, "CS7").await;
    let second = create_student(&app, "CS8").await;
    let shared = create_book(&app, "978-9", 2).await;
    let other = create_book(&app, "978-10", 1).await;

    for (student, books) in [(first, json!([shared])), (second, json!([shared, other]))] {
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/issues/issue",
            Some(json!({ "student_id": student, "book_ids": books })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(&app, Method::GET, "/api/v1/issues/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let uri = format!("/api/v1/issues/list?book_id={}", other);
    let (_, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["student"]["id"], second);

    let uri = format!("/api/v1/issues/list?student_id={}&is_overdue=false", first);
    let (_, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["book_ids"], json!([shared]));

    let (_, body) = call(&app, Method::GET, "/api/v1/issues/list?is_overdue=true", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_overdue_notices_reach_late_students() {
    let store = Arc::new(MemoryStore::new());
    let config = AppConfig::default();
    let services = Services::new(store.clone(), Arc::new(Outbox::default()), &config.loans);
    services.catalog.seed_sample_data().await.unwrap();

    let long_ago = Utc::now() - Duration::days(20);
    services.issues.issue_books(1, &[1], long_ago).await.unwrap();
    services.issues.issue_books(2, &[2], Utc::now()).await.unwrap();

    let (app, outbox) = app_over(store, config);
    let (status, report) = call(&app, Method::POST, "/api/v1/issues/overdue/notify", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report, json!({ "checked": 2, "sent": 1, "failed": 0 }));
    assert_eq!(*outbox.sent.lock().unwrap(), vec!["john.doe@example.com".to_string()]);
}
