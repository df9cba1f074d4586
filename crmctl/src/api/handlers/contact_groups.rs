use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::{
            DeletedResponse,
            tags::{ContactGroupCreate, ContactGroupResponse, ContactGroupUpdate},
        },
    },
    auth::{subscription::ActiveTenant, tenant::TenantContext},
    db::handlers::ContactGroups,
    errors::{Error, ErrorBody, Result},
    types::GroupId,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/groups",
    tag = "groups",
    summary = "List contact groups",
    responses(
        (status = 200, description = "Groups with their contact counts", body = [ContactGroupResponse]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_groups(State(state): State<AppState>, tenant: TenantContext) -> Result<Json<Vec<ContactGroupResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let groups = ContactGroups::new(&mut conn, tenant.org_id).list().await?;

    Ok(Json(groups.into_iter().map(ContactGroupResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "groups",
    summary = "Create a contact group",
    request_body = ContactGroupCreate,
    responses(
        (status = 201, description = "Group created", body = ContactGroupResponse),
        (status = 400, description = "Invalid group", body = ErrorBody),
        (status = 409, description = "A group with this name exists", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_group(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    ApiJson(body): ApiJson<ContactGroupCreate>,
) -> Result<(StatusCode, Json<ContactGroupResponse>)> {
    let request = body.into_db()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let group = ContactGroups::new(&mut conn, tenant.org_id).create(&request).await?;

    Ok((StatusCode::CREATED, Json(group.into())))
}

#[utoipa::path(
    patch,
    path = "/groups/{id}",
    tag = "groups",
    summary = "Update a contact group",
    params(("id" = String, Path, description = "Group ID")),
    request_body = ContactGroupUpdate,
    responses(
        (status = 200, description = "Updated group", body = ContactGroupResponse),
        (status = 404, description = "Group not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_group(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<GroupId>,
    ApiJson(body): ApiJson<ContactGroupUpdate>,
) -> Result<Json<ContactGroupResponse>> {
    let request = body.into_db()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let group = ContactGroups::new(&mut conn, tenant.org_id).update(id, &request).await?;

    Ok(Json(group.into()))
}

#[utoipa::path(
    delete,
    path = "/groups/{id}",
    tag = "groups",
    summary = "Delete a contact group",
    description = "Member contacts are kept and lose their group.",
    params(("id" = String, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group deleted", body = DeletedResponse),
        (status = 404, description = "Group not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_group(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<GroupId>,
) -> Result<Json<DeletedResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !ContactGroups::new(&mut conn, tenant.org_id).delete(id).await? {
        return Err(Error::not_found("Group", id));
    }

    Ok(Json(DeletedResponse::new(id)))
}
