use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::organizations::{MemberResponse, OrganizationResponse, OrganizationUpdate},
    },
    auth::tenant::{AdminTenant, TenantContext},
    db::handlers::{Organizations, Users},
    errors::{Error, ErrorBody, Result},
};
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/me",
    tag = "organization",
    summary = "Resolve the caller",
    description = "Returns the caller's tenant context. The first call for a new identity provisions an organization.",
    responses(
        (status = 200, description = "Tenant context", body = TenantContext),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_me(tenant: TenantContext) -> Json<TenantContext> {
    Json(tenant)
}

#[utoipa::path(
    get,
    path = "/organization",
    tag = "organization",
    summary = "Get the caller's organization",
    responses(
        (status = 200, description = "Organization", body = OrganizationResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_organization(State(state): State<AppState>, tenant: TenantContext) -> Result<Json<OrganizationResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = Organizations::new(&mut conn)
        .get_by_id(tenant.org_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization", tenant.org_id))?;

    Ok(Json(organization.into()))
}

#[utoipa::path(
    patch,
    path = "/organization",
    tag = "organization",
    summary = "Rename the organization",
    description = "Admin only. Plan and subscription status change through billing.",
    request_body = OrganizationUpdate,
    responses(
        (status = 200, description = "Updated organization", body = OrganizationResponse),
        (status = 400, description = "Invalid name", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_organization(
    State(state): State<AppState>,
    AdminTenant(tenant): AdminTenant,
    ApiJson(body): ApiJson<OrganizationUpdate>,
) -> Result<Json<OrganizationResponse>> {
    let name = body.name()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = Organizations::new(&mut conn).update_name(tenant.org_id, &name).await?;

    Ok(Json(organization.into()))
}

#[utoipa::path(
    get,
    path = "/organization/members",
    tag = "organization",
    summary = "List organization members",
    responses(
        (status = 200, description = "Members", body = [MemberResponse]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_members(State(state): State<AppState>, tenant: TenantContext) -> Result<Json<Vec<MemberResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let members = Users::new(&mut conn).list_members(tenant.org_id).await?;

    Ok(Json(members.into_iter().map(MemberResponse::from).collect()))
}
