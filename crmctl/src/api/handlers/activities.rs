use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::{
            activities::{ActivityCreate, ActivityResponse, ListActivitiesQuery},
            pagination::PaginatedResponse,
        },
    },
    auth::{subscription::ActiveTenant, tenant::TenantContext},
    db::handlers::{Activities, activities::ActivityFilter},
    errors::{Error, ErrorBody, Result},
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/activities",
    tag = "activities",
    summary = "List activities",
    description = "Newest first.",
    params(ListActivitiesQuery),
    responses(
        (status = 200, description = "Page of activities", body = PaginatedResponse<ActivityResponse>),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_activities(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListActivitiesQuery>,
) -> Result<Json<PaginatedResponse<ActivityResponse>>> {
    let filter = ActivityFilter {
        contact_id: query.contact_id,
        deal_id: query.deal_id,
        activity_type: query.activity_type,
        ..ActivityFilter::new(query.pagination.offset(), query.pagination.limit())
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Activities::new(&mut conn, tenant.org_id);
    let activities = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        activities.into_iter().map(ActivityResponse::from).collect(),
        &query.pagination,
        total,
    )))
}

#[utoipa::path(
    post,
    path = "/activities",
    tag = "activities",
    summary = "Log an activity",
    description = "Only `call`, `email`, `meeting` and `note` can be logged by hand.",
    request_body = ActivityCreate,
    responses(
        (status = 201, description = "Activity logged", body = ActivityResponse),
        (status = 400, description = "Invalid activity or unknown reference", body = ErrorBody),
        (status = 403, description = "Subscription expired", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_activity(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    ApiJson(body): ApiJson<ActivityCreate>,
) -> Result<(StatusCode, Json<ActivityResponse>)> {
    let request = body.into_db(tenant.user_id)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let activity = Activities::new(&mut conn, tenant.org_id).create(&request).await?;

    Ok((StatusCode::CREATED, Json(activity.into())))
}
