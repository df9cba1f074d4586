use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::{
            DeletedResponse,
            fields::trimmed,
            pagination::PaginatedResponse,
            tasks::{ListTasksQuery, TaskCreate, TaskResponse, TaskUpdate},
        },
    },
    auth::{subscription::ActiveTenant, tenant::TenantContext},
    db::handlers::{Repository, Tasks, tasks::TaskFilter},
    errors::{Error, ErrorBody, Result},
    types::TaskId,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    summary = "List tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "Page of tasks", body = PaginatedResponse<TaskResponse>),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_tasks(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<PaginatedResponse<TaskResponse>>> {
    let filter = TaskFilter {
        skip: query.pagination.offset(),
        limit: query.pagination.limit(),
        completed: query.completed,
        priority: query.priority,
        assigned_to: query.assigned_to,
        contact_id: query.contact_id,
        deal_id: query.deal_id,
        due_by: query.due_by,
        search: trimmed(query.search),
        sort: query.sort.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tasks::new(&mut conn, tenant.org_id);
    let tasks = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        tasks.into_iter().map(TaskResponse::from).collect(),
        &query.pagination,
        total,
    )))
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    summary = "Create a task",
    request_body = TaskCreate,
    responses(
        (status = 201, description = "Task created", body = TaskResponse),
        (status = 400, description = "Invalid task or unknown reference", body = ErrorBody),
        (status = 403, description = "Subscription expired", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_task(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    ApiJson(body): ApiJson<TaskCreate>,
) -> Result<(StatusCode, Json<TaskResponse>)> {
    let request = body.into_db(tenant.user_id)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let task = Tasks::new(&mut conn, tenant.org_id).create(&request).await?;

    Ok((StatusCode::CREATED, Json(task.into())))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    summary = "Get a task",
    params(("id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task", body = TaskResponse),
        (status = 404, description = "Task not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_task(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<TaskId>,
) -> Result<Json<TaskResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let task = Tasks::new(&mut conn, tenant.org_id)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Task", id))?;

    Ok(Json(task.into()))
}

#[utoipa::path(
    patch,
    path = "/tasks/{id}",
    tag = "tasks",
    summary = "Update a task",
    params(("id" = String, Path, description = "Task ID")),
    request_body = TaskUpdate,
    responses(
        (status = 200, description = "Updated task", body = TaskResponse),
        (status = 400, description = "Invalid patch", body = ErrorBody),
        (status = 404, description = "Task not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_task(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<TaskId>,
    ApiJson(body): ApiJson<TaskUpdate>,
) -> Result<Json<TaskResponse>> {
    let request = body.into_db()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let task = Tasks::new(&mut conn, tenant.org_id).update(id, &request).await?;

    Ok(Json(task.into()))
}

#[utoipa::path(
    post,
    path = "/tasks/{id}/complete",
    tag = "tasks",
    summary = "Complete a task",
    description = "Completing an already completed task returns it unchanged.",
    params(("id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Completed task", body = TaskResponse),
        (status = 404, description = "Task not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn complete_task(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<TaskId>,
) -> Result<Json<TaskResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let task = Tasks::new(&mut conn, tenant.org_id).complete(id, Some(tenant.user_id)).await?;

    Ok(Json(task.into()))
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "tasks",
    summary = "Delete a task",
    params(("id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task deleted", body = DeletedResponse),
        (status = 404, description = "Task not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_task(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<TaskId>,
) -> Result<Json<DeletedResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Tasks::new(&mut conn, tenant.org_id).delete(id).await? {
        return Err(Error::not_found("Task", id));
    }

    Ok(Json(DeletedResponse::new(id)))
}
