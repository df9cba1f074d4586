//! API request/response models for pipeline stages.

use super::fields::{check_color, check_probability, required};
use crate::db::models::pipeline_stages::{PipelineStageDBResponse, PipelineStageUpdateDBRequest};
use crate::errors::Result;
use crate::types::StageId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: StageId,
    pub name: String,
    pub color: String,
    /// Win probability (0-100) copied onto deals that enter the stage
    pub probability: i32,
    pub position: i32,
    pub is_won: bool,
    pub is_lost: bool,
}

impl From<PipelineStageDBResponse> for PipelineStageResponse {
    fn from(db: PipelineStageDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            color: db.color,
            probability: db.probability,
            position: db.position,
            is_won: db.is_won,
            is_lost: db.is_lost,
        }
    }
}

/// Edit a stage's presentation and probability. Positions and won/lost flags are fixed.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineStageUpdate {
    pub name: Option<String>,
    #[schema(example = "#6366f1")]
    pub color: Option<String>,
    pub probability: Option<i32>,
}

impl PipelineStageUpdate {
    pub fn into_db(self) -> Result<PipelineStageUpdateDBRequest> {
        check_color("color", self.color.as_deref())?;
        check_probability(self.probability)?;
        Ok(PipelineStageUpdateDBRequest {
            name: self.name.as_deref().map(|n| required("name", n)).transpose()?,
            color: self.color,
            probability: self.probability,
        })
    }
}
