//! Due-date reminders and overdue notices
//!
//! Both sweeps are stateless: the caller supplies the store, the notifier
//! and the current time. They only read from the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{issue::whole_days, Issue, IssueStatus, Student},
    repository::Store,
};

use super::email::Notifier;

pub const REMINDER_SUBJECT: &str = "Library Book Return Reminder";
pub const OVERDUE_SUBJECT: &str = "Library Book Overdue Notice";

/// Outcome of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReminderReport {
    /// Open issues inspected
    pub checked: usize,
    /// Messages delivered to the notifier
    pub sent: usize,
    /// Messages that could not be sent
    pub failed: usize,
}

/// Reminder text for one issue
pub fn reminder_body(student: &Student, issue: &Issue, days_left: i64) -> String {
    format!(
        "Dear {name},\n\n\
         This is a reminder that the book(s) '{titles}' are due in {days} day(s) \
         (due date: {due}).\n\n\
         Please return the book(s) on time to avoid any late fees.\n\
         Thank you!",
        name = student.name,
        titles = issue.books_titles,
        days = days_left,
        due = issue.due_date.date_naive(),
    )
}

/// Overdue notice text for one issue
pub fn overdue_body(student: &Student, issue: &Issue, days_late: i64) -> String {
    format!(
        "Dear {name},\n\n\
         The book(s) '{titles}' were due on {due} and are now {days} day(s) overdue.\n\n\
         Please return them as soon as possible.\n\
         Thank you!",
        name = student.name,
        titles = issue.books_titles,
        due = issue.due_date.date_naive(),
        days = days_late,
    )
}

/// Send a reminder for every open issue due within `window_days` whole days.
/// A failed send is logged and counted; the sweep carries on.
pub async fn run_reminders(
    store: &dyn Store,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
    window_days: i64,
) -> AppResult<ReminderReport> {
    tracing::info!("Starting reminder check");

    let issues = store.issues_open().await?;
    let mut report = ReminderReport {
        checked: issues.len(),
        ..Default::default()
    };

    for issue in issues {
        let days_left = issue.days_until_due(now);
        if !(0..=window_days).contains(&days_left) {
            continue;
        }

        notify(store, notifier, &issue, REMINDER_SUBJECT, &mut report, |student| {
            reminder_body(student, &issue, days_left)
        })
        .await;
    }

    tracing::info!(
        checked = report.checked,
        sent = report.sent,
        failed = report.failed,
        "Reminder check completed"
    );
    Ok(report)
}

/// Send an overdue notice for every open issue past its due date
pub async fn run_overdue_notices(
    store: &dyn Store,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> AppResult<ReminderReport> {
    tracing::info!("Starting overdue notices");

    let issues = store.issues_open().await?;
    let mut report = ReminderReport {
        checked: issues.len(),
        ..Default::default()
    };

    for issue in issues {
        if issue.status(now) != IssueStatus::Overdue {
            continue;
        }
        let days_late = whole_days(now - issue.due_date);

        notify(store, notifier, &issue, OVERDUE_SUBJECT, &mut report, |student| {
            overdue_body(student, &issue, days_late)
        })
        .await;
    }

    tracing::info!(
        checked = report.checked,
        sent = report.sent,
        failed = report.failed,
        "Overdue notices completed"
    );
    Ok(report)
}

/// Mail the student of `issue`, counting the outcome in `report`
async fn notify(
    store: &dyn Store,
    notifier: &dyn Notifier,
    issue: &Issue,
    subject: &str,
    report: &mut ReminderReport,
    body: impl FnOnce(&Student) -> String,
) {
    let student = match store.students_get(issue.student_id).await {
        Ok(Some(student)) => student,
        Ok(None) => {
            tracing::warn!(
                issue_id = issue.id,
                student_id = issue.student_id,
                "Skipping message, student not found"
            );
            report.failed += 1;
            return;
        }
        Err(e) => {
            tracing::error!(issue_id = issue.id, error = %e, "Failed to load student");
            report.failed += 1;
            return;
        }
    };

    let body = body(&student);
    match notifier.send(&student.email, subject, &body).await {
        Ok(()) => {
            tracing::info!(issue_id = issue.id, to = %student.email, subject, "Sent message");
            report.sent += 1;
        }
        Err(e) => {
            tracing::error!(
                issue_id = issue.id,
                to = %student.email,
                subject,
                error = %e,
                "Failed to send message"
            );
            report.failed += 1;
        }
    }
}
