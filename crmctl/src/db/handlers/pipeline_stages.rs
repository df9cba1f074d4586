//! Database repository for the per-organization sales pipeline.

use crate::db::{
    errors::{DbError, Result},
    models::pipeline_stages::{DEFAULT_STAGES, PipelineStageDBResponse, PipelineStageUpdateDBRequest},
};
use crate::types::{OrganizationId, StageId, abbrev_uuid};
use sqlx::{PgConnection, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

pub struct PipelineStages<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> PipelineStages<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    /// Insert the six default stages at positions 1 to 6.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn create_defaults(&mut self) -> Result<Vec<PipelineStageDBResponse>> {
        let mut query = QueryBuilder::new(
            "INSERT INTO pipeline_stages (id, organization_id, name, color, probability, position, is_won, is_lost) ",
        );
        query.push_values(DEFAULT_STAGES.iter().enumerate(), |mut row, (index, stage)| {
            row.push_bind(Uuid::new_v4())
                .push_bind(self.org_id)
                .push_bind(stage.name)
                .push_bind(stage.color)
                .push_bind(stage.probability)
                .push_bind(index as i32 + 1)
                .push_bind(stage.is_won)
                .push_bind(stage.is_lost);
        });
        query.push(" RETURNING *");

        let mut stages = query
            .build_query_as::<PipelineStageDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;
        stages.sort_by_key(|s| s.position);

        Ok(stages)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn list(&mut self) -> Result<Vec<PipelineStageDBResponse>> {
        let stages = sqlx::query_as::<_, PipelineStageDBResponse>(
            "SELECT * FROM pipeline_stages WHERE organization_id = $1 ORDER BY position",
        )
        .bind(self.org_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(stages)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), stage_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: StageId) -> Result<Option<PipelineStageDBResponse>> {
        let stage = sqlx::query_as::<_, PipelineStageDBResponse>(
            "SELECT * FROM pipeline_stages WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(self.org_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(stage)
    }

    /// Rename, recolor or re-weight a stage. Terminal flags and ordering are fixed.
    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), stage_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: StageId, request: &PipelineStageUpdateDBRequest) -> Result<PipelineStageDBResponse> {
        sqlx::query_as::<_, PipelineStageDBResponse>(
            r#"
            UPDATE pipeline_stages SET
                name = COALESCE($3, name),
                color = COALESCE($4, color),
                probability = COALESCE($5, probability)
            WHERE id = $1 AND organization_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .bind(request.name.as_deref())
        .bind(request.color.as_deref())
        .bind(request.probability)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }
}
