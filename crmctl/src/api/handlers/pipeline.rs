use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::pipeline::{PipelineStageResponse, PipelineStageUpdate},
    },
    auth::{
        subscription::require_active_subscription,
        tenant::{AdminTenant, TenantContext},
    },
    db::handlers::PipelineStages,
    errors::{Error, ErrorBody, Result},
    types::StageId,
};
use axum::{
    Json,
    extract::{Path, State},
};

#[utoipa::path(
    get,
    path = "/pipeline/stages",
    tag = "pipeline",
    summary = "List pipeline stages",
    description = "Ordered by position.",
    responses(
        (status = 200, description = "Pipeline stages", body = [PipelineStageResponse]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_stages(State(state): State<AppState>, tenant: TenantContext) -> Result<Json<Vec<PipelineStageResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let stages = PipelineStages::new(&mut conn, tenant.org_id).list().await?;

    Ok(Json(stages.into_iter().map(PipelineStageResponse::from).collect()))
}

#[utoipa::path(
    patch,
    path = "/pipeline/stages/{id}",
    tag = "pipeline",
    summary = "Update a pipeline stage",
    description = "Admin only. Changing the probability does not rewrite deals already in the stage.",
    params(("id" = String, Path, description = "Stage ID")),
    request_body = PipelineStageUpdate,
    responses(
        (status = 200, description = "Updated stage", body = PipelineStageResponse),
        (status = 400, description = "Invalid patch", body = ErrorBody),
        (status = 403, description = "Not an admin, or subscription expired", body = ErrorBody),
        (status = 404, description = "Stage not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_stage(
    State(state): State<AppState>,
    AdminTenant(tenant): AdminTenant,
    Path(id): Path<StageId>,
    ApiJson(body): ApiJson<PipelineStageUpdate>,
) -> Result<Json<PipelineStageResponse>> {
    require_active_subscription(&tenant)?;
    let request = body.into_db()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let stage = PipelineStages::new(&mut conn, tenant.org_id).update(id, &request).await?;

    Ok(Json(stage.into()))
}
