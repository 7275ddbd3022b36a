use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::mail::{reminder_mail, Notifier};
use crate::models::Task;
use crate::store::CredentialStore;
use crate::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub users: usize,
    pub reminders: usize,
    pub failures: usize,
}

/// Periodically mails reminders for unfinished tasks due within `window`.
///
/// Nothing records that a reminder went out, so a task inside the window is reminded
/// again on every pass. Deadlines already in the past also fall inside the window.
pub struct DeadlineScheduler {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    interval: StdDuration,
    window: Duration,
}

pub fn is_due(task: &Task, now: DateTime<Utc>, window: Duration) -> bool {
    !task.complete && task.deadline - now < window
}

impl DeadlineScheduler {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        interval: StdDuration,
        window: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            interval,
            window,
        }
    }

    /// One pass over every user. Send failures are counted and do not stop the pass.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<ScanReport, Error> {
        let users = self.store.find_all().await?;
        let mut report = ScanReport {
            users: users.len(),
            ..ScanReport::default()
        };

        for user in &users {
            for task in user.tasks.iter().filter(|task| is_due(task, now, self.window)) {
                report.reminders += 1;
                let mail = reminder_mail(&user.email, task, self.window);
                if let Err(err) = self.notifier.send(&mail).await {
                    report.failures += 1;
                    log::warn!(
                        "Failed to send reminder for task {} to {}: {:?}",
                        task.id,
                        user.email,
                        err
                    );
                }
            }
        }
        Ok(report)
    }

    /// Runs passes until `shutdown` fires or its sender is dropped.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            log::info!(
                "Deadline scheduler started, scanning every {}s",
                self.interval.as_secs()
            );
            loop {
                tokio::select! {
                    result = self.scan(Utc::now()) => match result {
                        Ok(report) => log::info!(
                            "Reminder pass: {} users, {} reminders, {} failed",
                            report.users,
                            report.reminders,
                            report.failures
                        ),
                        Err(err) => log::error!("Reminder pass could not load users: {:?}", err),
                    },
                    _ = shutdown.recv() => {
                        log::warn!("Reminder pass interrupted by shutdown");
                        break;
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = shutdown.recv() => break,
                }
            }
            log::info!("Deadline scheduler stopped");
        })
    }
}
