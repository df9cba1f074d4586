//! Externally triggered periodic jobs.
//!
//! Nothing in the process schedules these; an outside timer calls
//! `POST /internal/jobs/{trial-warnings|task-reminders}`. Each run is a stateless pass over the
//! database, so running one twice sends duplicate emails.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::{
    config::TrialConfig,
    db::handlers::{Organizations, Tasks, Users},
    email::{EmailKind, EmailService, Recipient, ReminderItem},
    errors::{Error, Result},
    types::UserId,
};

/// Outcome of one job pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    /// Organizations (trial warnings) or users (task reminders) that were due a message
    pub processed: u32,
    pub sent: u32,
    pub failed: u32,
}

impl JobReport {
    fn record(&mut self, delivered: bool) {
        if delivered {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
    }
}

fn cron_error(job: &str) -> impl FnOnce(crate::db::errors::DbError) -> Error + '_ {
    move |e| Error::Cron {
        job: job.to_string(),
        source: anyhow::Error::new(e),
    }
}

/// Whole days left on a trial, rounded down.
pub fn days_remaining(trial_ends_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (trial_ends_at - now).num_days()
}

/// Warn the admins of every trialing organization whose remaining days are one of the
/// configured warning days.
#[tracing::instrument(skip_all, fields(%now))]
pub async fn run_trial_warnings(pool: &PgPool, email: &EmailService, trial: &TrialConfig, now: DateTime<Utc>) -> Result<JobReport> {
    const JOB: &str = "trial-warnings";
    let mut conn = pool.acquire().await.map_err(|e| cron_error(JOB)(e.into()))?;
    let organizations = Organizations::new(&mut conn).list_trialing().await.map_err(cron_error(JOB))?;

    let mut report = JobReport::default();
    for org in organizations {
        let Some(ends) = org.trial_ends_at else {
            continue;
        };
        let days = days_remaining(ends, now);
        if days < 1 || !trial.warning_days.contains(&(days as u32)) {
            continue;
        }

        report.processed += 1;
        let admins = Users::new(&mut conn).list_active_admins(org.id).await.map_err(cron_error(JOB))?;
        for admin in admins.into_iter().filter(|a| !a.email.is_empty()) {
            let kind = EmailKind::TrialWarning {
                organization: org.name.clone(),
                days_remaining: days,
            };
            let to = Recipient {
                email: admin.email,
                name: admin.name,
            };
            report.record(email.send_and_record(&kind, &to).await);
        }
    }

    tracing::info!(processed = report.processed, sent = report.sent, failed = report.failed, "Trial warnings done");
    Ok(report)
}

/// Send each user one digest of their incomplete tasks due on or before `today`.
#[tracing::instrument(skip_all, fields(%today))]
pub async fn run_task_reminders(pool: &PgPool, email: &EmailService, today: NaiveDate) -> Result<JobReport> {
    const JOB: &str = "task-reminders";
    let mut conn = pool.acquire().await.map_err(|e| cron_error(JOB)(e.into()))?;
    let due = Tasks::list_due_reminders(&mut conn, today).await.map_err(cron_error(JOB))?;

    let mut digests: BTreeMap<UserId, (Recipient, Vec<ReminderItem>)> = BTreeMap::new();
    for row in due {
        let (_, items) = digests.entry(row.user_id).or_insert_with(|| {
            (
                Recipient {
                    email: row.user_email.clone(),
                    name: row.user_name.clone(),
                },
                Vec::new(),
            )
        });
        items.push(ReminderItem {
            title: row.title,
            due_date: row.due_date,
        });
    }

    let mut report = JobReport::default();
    for (recipient, tasks) in digests.into_values() {
        report.processed += 1;
        let kind = EmailKind::TaskReminder { tasks };
        report.record(email.send_and_record(&kind, &recipient).await);
    }

    tracing::info!(processed = report.processed, sent = report.sent, failed = report.failed, "Task reminders done");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailTransportConfig;
    use crate::db::handlers::Repository;
    use crate::db::models::tasks::TaskCreateDBRequest;
    use crate::test_utils::{create_test_config, provision_test_tenant};
    use crate::types::TaskPriority;
    use chrono::Duration;

    fn email_service(dir: &std::path::Path) -> EmailService {
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: dir.to_string_lossy().to_string(),
        };
        EmailService::new(&config).unwrap()
    }

    fn sent_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn remaining_days_round_down() {
        let now = Utc::now();
        assert_eq!(days_remaining(now + Duration::days(7) + Duration::hours(3), now), 7);
        assert_eq!(days_remaining(now + Duration::hours(23), now), 0);
        assert_eq!(days_remaining(now - Duration::hours(1), now), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_trial_warnings_target_configured_days(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let email = email_service(dir.path());
        let trial = TrialConfig::default();
        let now = Utc::now();

        let due = provision_test_tenant(&pool, "ext|trial-7").await;
        let not_due = provision_test_tenant(&pool, "ext|trial-5").await;
        for (org, ends) in [
            (due.org_id, now + Duration::days(7) + Duration::hours(2)),
            (not_due.org_id, now + Duration::days(5) + Duration::hours(2)),
        ] {
            sqlx::query("UPDATE organizations SET trial_ends_at = $2 WHERE id = $1")
                .bind(org)
                .bind(ends)
                .execute(&pool)
                .await
                .unwrap();
        }

        let report = run_trial_warnings(&pool, &email, &trial, now).await.unwrap();
        assert_eq!(
            report,
            JobReport {
                processed: 1,
                sent: 1,
                failed: 0
            }
        );
        assert_eq!(sent_count(dir.path()), 1);

        // Stateless: a rerun sends again
        let again = run_trial_warnings(&pool, &email, &trial, now).await.unwrap();
        assert_eq!(again.sent, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_task_reminders_send_one_digest_per_user(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let email = email_service(dir.path());
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();

        let tenant = provision_test_tenant(&pool, "ext|reminders").await;
        let mut conn = pool.acquire().await.unwrap();
        for (title, due) in [("One", today), ("Two", today - Duration::days(1)), ("Later", today + Duration::days(3))] {
            Tasks::new(&mut conn, tenant.org_id)
                .create(&TaskCreateDBRequest {
                    created_by: Some(tenant.user_id),
                    title: title.to_string(),
                    description: None,
                    contact_id: None,
                    deal_id: None,
                    assigned_to: None,
                    due_date: Some(due),
                    priority: TaskPriority::High,
                })
                .await
                .unwrap();
        }

        let report = run_task_reminders(&pool, &email, today).await.unwrap();
        assert_eq!(
            report,
            JobReport {
                processed: 1,
                sent: 1,
                failed: 0
            }
        );
        assert_eq!(sent_count(dir.path()), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_nothing_due_sends_nothing(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let email = email_service(dir.path());
        provision_test_tenant(&pool, "ext|quiet").await;

        let report = run_task_reminders(&pool, &email, Utc::now().date_naive()).await.unwrap();
        assert_eq!(report, JobReport::default());
        assert_eq!(sent_count(dir.path()), 0);
    }
}
