use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::{
            DeletedResponse,
            deals::{DealCreate, DealResponse, DealStageUpdate, DealUpdate, ListDealsQuery, StageMoveResponse},
            fields::trimmed,
            pagination::PaginatedResponse,
        },
    },
    auth::{subscription::ActiveTenant, tenant::TenantContext},
    db::handlers::{Deals, Repository, deals::DealFilter},
    errors::{Error, ErrorBody, Result},
    types::DealId,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/deals",
    tag = "deals",
    summary = "List deals",
    description = "Archived deals are left out unless `includeArchived=true`.",
    params(ListDealsQuery),
    responses(
        (status = 200, description = "Page of deals", body = PaginatedResponse<DealResponse>),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_deals(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListDealsQuery>,
) -> Result<Json<PaginatedResponse<DealResponse>>> {
    let filter = DealFilter {
        skip: query.pagination.offset(),
        limit: query.pagination.limit(),
        stage_id: query.stage_id,
        contact_id: query.contact_id,
        search: trimmed(query.search),
        include_archived: query.include_archived.unwrap_or(false),
        sort: query.sort.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Deals::new(&mut conn, tenant.org_id);
    let deals = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        deals.into_iter().map(DealResponse::from).collect(),
        &query.pagination,
        total,
    )))
}

#[utoipa::path(
    post,
    path = "/deals",
    tag = "deals",
    summary = "Create a deal",
    request_body = DealCreate,
    responses(
        (status = 201, description = "Deal created", body = DealResponse),
        (status = 400, description = "Invalid deal or unknown stage/contact", body = ErrorBody),
        (status = 403, description = "Subscription expired", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_deal(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    ApiJson(body): ApiJson<DealCreate>,
) -> Result<(StatusCode, Json<DealResponse>)> {
    let request = body.into_db(tenant.user_id)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deal = Deals::new(&mut conn, tenant.org_id).create(&request).await?;

    Ok((StatusCode::CREATED, Json(deal.into())))
}

#[utoipa::path(
    get,
    path = "/deals/{id}",
    tag = "deals",
    summary = "Get a deal",
    description = "Archived deals are still returned here.",
    params(("id" = String, Path, description = "Deal ID")),
    responses(
        (status = 200, description = "Deal", body = DealResponse),
        (status = 404, description = "Deal not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_deal(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<DealId>,
) -> Result<Json<DealResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deal = Deals::new(&mut conn, tenant.org_id)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Deal", id))?;

    Ok(Json(deal.into()))
}

#[utoipa::path(
    patch,
    path = "/deals/{id}",
    tag = "deals",
    summary = "Update a deal",
    description = "Stage changes go through `PATCH /deals/{id}/stage`.",
    params(("id" = String, Path, description = "Deal ID")),
    request_body = DealUpdate,
    responses(
        (status = 200, description = "Updated deal", body = DealResponse),
        (status = 400, description = "Invalid patch", body = ErrorBody),
        (status = 404, description = "Deal not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_deal(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<DealId>,
    ApiJson(body): ApiJson<DealUpdate>,
) -> Result<Json<DealResponse>> {
    let request = body.into_db()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deal = Deals::new(&mut conn, tenant.org_id).update(id, &request).await?;

    Ok(Json(deal.into()))
}

#[utoipa::path(
    patch,
    path = "/deals/{id}/stage",
    tag = "deals",
    summary = "Move a deal to another stage",
    description = "Moving into a won or lost stage closes the deal and updates the linked contact's status.",
    params(("id" = String, Path, description = "Deal ID")),
    request_body = DealStageUpdate,
    responses(
        (status = 200, description = "Deal moved", body = StageMoveResponse),
        (status = 400, description = "Unknown stage", body = ErrorBody),
        (status = 404, description = "Deal not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn move_deal_stage(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<DealId>,
    ApiJson(body): ApiJson<DealStageUpdate>,
) -> Result<Json<StageMoveResponse>> {
    body.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let transition = Deals::new(&mut conn, tenant.org_id)
        .update_stage(id, body.stage_id, body.position, Some(tenant.user_id))
        .await?;

    Ok(Json(StageMoveResponse {
        deal: transition.deal.into(),
        from_stage_id: transition.from_stage_id,
        contact_status: transition.contact_status,
    }))
}

#[utoipa::path(
    delete,
    path = "/deals/{id}",
    tag = "deals",
    summary = "Archive a deal",
    params(("id" = String, Path, description = "Deal ID")),
    responses(
        (status = 200, description = "Deal archived", body = DeletedResponse),
        (status = 404, description = "Deal not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_deal(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<DealId>,
) -> Result<Json<DeletedResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Deals::new(&mut conn, tenant.org_id).delete(id).await? {
        return Err(Error::not_found("Deal", id));
    }

    Ok(Json(DeletedResponse::new(id)))
}
