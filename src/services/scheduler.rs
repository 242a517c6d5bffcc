//! Daily trigger for the reminder sweep

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use tokio::task::JoinHandle;

use super::{email::Notifier, reminders::run_reminders};
use crate::{config::RemindersConfig, repository::Store};

/// Next occurrence of `time` (UTC) strictly after `now`
pub fn next_run_after(now: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(time));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Spawn the background task running the sweep once a day at
/// `config.time`.
pub fn spawn_reminder_task(
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    config: RemindersConfig,
) -> JoinHandle<()> {
    tracing::info!(
        time = %config.time,
        window_days = config.window_days,
        "Scheduler started, reminders run daily"
    );

    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, config.time);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next_run = %next, "Waiting for next reminder run");
            tokio::time::sleep(wait).await;

            if let Err(e) =
                run_reminders(store.as_ref(), notifier.as_ref(), Utc::now(), config.window_days)
                    .await
            {
                tracing::error!(error = %e, "Reminder check failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 7, 30, 0).unwrap();
        assert_eq!(
            next_run_after(now, nine()),
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, nine()),
            Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap()
        );

        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, nine()),
            Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
        );
    }
}
