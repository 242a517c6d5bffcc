//! API integration tests against a running server and database

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8000/api/v1";

/// Suffix keeping ISBNs, roll numbers and emails unique across runs
fn unique() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "{}{}",
        Utc::now().timestamp_micros(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

async fn create_book(client: &Client, copies: i32) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .json(&json!({
            "title": "Integration Test Book",
            "author": "Test Author",
            "isbn": format!("978-{}", unique()),
            "copies": copies,
            "category": "Testing"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No book ID")
}

async fn create_student(client: &Client) -> i64 {
    let tag = unique();
    let response = client
        .post(format!("{}/students", BASE_URL))
        .json(&json!({
            "name": "Test Student",
            "roll_number": format!("T{}", tag),
            "department": "Testing",
            "semester": 1,
            "phone": tag,
            "email": format!("student{}@example.com", tag)
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No student ID")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_reaches_database() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_create_and_delete_book() {
    let client = Client::new();
    let book_id = create_book(&client, 2).await;

    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 204);
}

#[tokio::test]
#[ignore]
async fn test_issue_and_return() {
    let client = Client::new();
    let student_id = create_student(&client).await;
    let book_id = create_book(&client, 1).await;

    let response = client
        .post(format!("{}/issues/issue", BASE_URL))
        .json(&json!({ "student_id": student_id, "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    let issue_id = body["id"].as_i64().expect("No issue ID");

    // Only copy is out
    let other_id = create_student(&client).await;
    let response = client
        .post(format!("{}/issues/issue", BASE_URL))
        .json(&json!({ "student_id": other_id, "book_ids": [book_id] }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);

    let response = client
        .put(format!("{}/issues/{}/return/{}", BASE_URL, issue_id, book_id))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "closed");
}

#[tokio::test]
#[ignore]
async fn test_concurrent_issues_of_last_copy() {
    let client = Client::new();
    let book_id = create_book(&client, 1).await;
    let first = create_student(&client).await;
    let second = create_student(&client).await;

    let issue = |student_id: i64| {
        let client = client.clone();
        async move {
            client
                .post(format!("{}/issues/issue", BASE_URL))
                .json(&json!({ "student_id": student_id, "book_id": book_id }))
                .send()
                .await
                .expect("Failed to send request")
                .status()
        }
    };

    let (a, b) = tokio::join!(issue(first), issue(second));
    let created = [a, b].iter().filter(|s| s.as_u16() == 201).count();
    assert_eq!(created, 1);
}

#[tokio::test]
#[ignore]
async fn test_overdue_list() {
    let client = Client::new();

    let response = client
        .get(format!("{}/issues/overdue", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.is_array());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_first_issues_merge() {
    let client = Client::new();
    let student_id = create_student(&client).await;
    let first = create_book(&client, 1).await;
    let second = create_book(&client, 1).await;

    let issue = |book_id: i64| {
        let client = client.clone();
        async move {
            let response = client
                .post(format!("{}/issues/issue", BASE_URL))
                .json(&json!({ "student_id": student_id, "book_id": book_id }))
                .send()
                .await
                .expect("Failed to send request");
            assert_eq!(response.status(), 201);
            let body: Value = response.json().await.expect("Failed to parse response");
            body["id"].as_i64().expect("No issue ID")
        }
    };

    let (a, b) = tokio::join!(issue(first), issue(second));
    assert_eq!(a, b);

    let response = client
        .get(format!("{}/issues/list?student_id={}", BASE_URL, student_id))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body.as_array().map(|a| a.len()), Some(1));
}
