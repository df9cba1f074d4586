//! Routes an external scheduler calls to run the periodic jobs.

use crate::{
    AppState,
    auth::identity::bearer_token,
    errors::{Error, ErrorBody, Result},
    jobs::{JobReport, run_task_reminders, run_trial_warnings},
};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;

/// A caller presenting the configured cron secret as its bearer token.
#[derive(Debug, Clone, Copy)]
pub struct CronCaller;

impl FromRequestParts<AppState> for CronCaller {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(secret) = state.config.jobs.cron_secret.as_deref() else {
            return Err(Error::Unauthenticated {
                message: Some("Job routes are disabled".to_string()),
            });
        };
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if bearer_token(header)? != secret {
            return Err(Error::Unauthenticated {
                message: Some("Invalid cron secret".to_string()),
            });
        }
        Ok(CronCaller)
    }
}

#[utoipa::path(
    post,
    path = "/internal/jobs/trial-warnings",
    tag = "jobs",
    summary = "Send trial warning emails",
    responses(
        (status = 200, description = "Job report", body = JobReport),
        (status = 401, description = "Missing or wrong cron secret", body = ErrorBody),
        (status = 500, description = "Job failed", body = ErrorBody),
    ),
    security(("CronSecret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn trial_warnings(State(state): State<AppState>, _caller: CronCaller) -> Result<Json<JobReport>> {
    let report = run_trial_warnings(&state.db, &state.email, &state.config.trial, Utc::now()).await?;
    tracing::info!(?report, "Trial warnings run finished");
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/internal/jobs/task-reminders",
    tag = "jobs",
    summary = "Send task reminder digests",
    responses(
        (status = 200, description = "Job report", body = JobReport),
        (status = 401, description = "Missing or wrong cron secret", body = ErrorBody),
        (status = 500, description = "Job failed", body = ErrorBody),
    ),
    security(("CronSecret" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn task_reminders(State(state): State<AppState>, _caller: CronCaller) -> Result<Json<JobReport>> {
    let report = run_task_reminders(&state.db, &state.email, Utc::now().date_naive()).await?;
    tracing::info!(?report, "Task reminders run finished");
    Ok(Json(report))
}
