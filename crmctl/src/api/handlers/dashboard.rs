use crate::{
    AppState,
    api::models::{
        activities::ActivityResponse,
        dashboard::{DashboardQuery, DashboardStats, StageSummary},
        tasks::TaskResponse,
    },
    auth::tenant::TenantContext,
    db::{
        handlers::{Activities, Dashboard, Repository, Tasks, activities::ActivityFilter, dashboard::conversion_rate, tasks::TaskFilter},
        models::tasks::TaskSort,
    },
    errors::{Error, ErrorBody, Result},
    types::SortOrder,
};
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;

const RECENT_ACTIVITIES: i64 = 15;
const DUE_TASKS: i64 = 100;

#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "dashboard",
    summary = "Dashboard summary",
    description = "Each figure is read separately. `from` and `to` are inclusive and default to the last 30 days.",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Dashboard figures", body = DashboardStats),
        (status = 400, description = "Invalid range", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardStats>> {
    let today = Utc::now().date_naive();
    let (from, to) = query.range(today)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let mut dashboard = Dashboard::new(&mut conn, tenant.org_id);
    let new_contacts = dashboard.new_contacts(from, to).await?;
    let open = dashboard.open_deals().await?;
    let outcomes = dashboard.deal_outcomes(from, to).await?;
    let stages = dashboard.deals_by_stage().await?;

    let recent_activities = Activities::new(&mut conn, tenant.org_id)
        .list(&ActivityFilter::new(0, RECENT_ACTIVITIES))
        .await?;

    let due_filter = TaskFilter {
        completed: Some(false),
        due_by: Some(today),
        sort: TaskSort::DueDate,
        order: SortOrder::Asc,
        ..TaskFilter::new(0, DUE_TASKS)
    };
    let due_tasks = Tasks::new(&mut conn, tenant.org_id).list(&due_filter).await?;

    Ok(Json(DashboardStats {
        from,
        to,
        new_contacts,
        open_deals: open.count,
        open_deal_value: open.value,
        conversion_rate: conversion_rate(outcomes.won, outcomes.total),
        deals_by_stage: stages.into_iter().map(StageSummary::from).collect(),
        recent_activities: recent_activities.into_iter().map(ActivityResponse::from).collect(),
        due_tasks: due_tasks.into_iter().map(TaskResponse::from).collect(),
    }))
}
