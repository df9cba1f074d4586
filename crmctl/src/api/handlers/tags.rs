use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::{
            DeletedResponse,
            fields::required,
            tags::{TagCreate, TagResponse},
        },
    },
    auth::{subscription::ActiveTenant, tenant::TenantContext},
    db::handlers::Tags,
    errors::{Error, ErrorBody, Result},
    types::TagId,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/tags",
    tag = "tags",
    summary = "List tags",
    responses(
        (status = 200, description = "Tags with their contact counts", body = [TagResponse]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_tags(State(state): State<AppState>, tenant: TenantContext) -> Result<Json<Vec<TagResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let tags = Tags::new(&mut conn, tenant.org_id).list().await?;

    Ok(Json(tags.into_iter().map(TagResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/tags",
    tag = "tags",
    summary = "Create a tag",
    request_body = TagCreate,
    responses(
        (status = 201, description = "Tag created", body = TagResponse),
        (status = 409, description = "A tag with this name exists", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_tag(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    ApiJson(body): ApiJson<TagCreate>,
) -> Result<(StatusCode, Json<TagResponse>)> {
    let name = required("name", &body.name)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let tag = Tags::new(&mut conn, tenant.org_id).create(&name).await?;

    Ok((StatusCode::CREATED, Json(tag.into())))
}

#[utoipa::path(
    delete,
    path = "/tags/{id}",
    tag = "tags",
    summary = "Delete a tag",
    description = "Removes the tag from every contact. The contacts are kept.",
    params(("id" = String, Path, description = "Tag ID")),
    responses(
        (status = 200, description = "Tag deleted", body = DeletedResponse),
        (status = 404, description = "Tag not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_tag(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<TagId>,
) -> Result<Json<DeletedResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Tags::new(&mut conn, tenant.org_id).delete(id).await? {
        return Err(Error::not_found("Tag", id));
    }

    Ok(Json(DeletedResponse::new(id)))
}
