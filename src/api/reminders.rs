//! Manual triggers for the reminder and overdue sweeps

use axum::{extract::State, Json};
use chrono::Utc;

use crate::{
    error::AppResult,
    services::reminders::{run_overdue_notices, run_reminders, ReminderReport},
};

/// Run the reminder sweep now
#[utoipa::path(
    post,
    path = "/reminders/run",
    tag = "reminders",
    responses(
        (status = 200, description = "Sweep finished", body = ReminderReport)
    )
)]
pub async fn run_now(State(state): State<crate::AppState>) -> AppResult<Json<ReminderReport>> {
    let report = run_reminders(
        state.services.store.as_ref(),
        state.services.notifier.as_ref(),
        Utc::now(),
        state.config.reminders.window_days,
    )
    .await?;
    Ok(Json(report))
}

/// Email every student with an overdue issue
#[utoipa::path(
    post,
    path = "/issues/overdue/notify",
    tag = "reminders",
    responses(
        (status = 200, description = "Notices sent", body = ReminderReport)
    )
)]
pub async fn notify_overdue(
    State(state): State<crate::AppState>,
) -> AppResult<Json<ReminderReport>> {
    let report = run_overdue_notices(
        state.services.store.as_ref(),
        state.services.notifier.as_ref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(report))
}
