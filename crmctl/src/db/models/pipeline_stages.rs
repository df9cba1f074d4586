//! Database models for pipeline stages.

use crate::types::{OrganizationId, StageId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for updating a stage's presentation and win probability
#[derive(Debug, Clone, Default)]
pub struct PipelineStageUpdateDBRequest {
    pub name: Option<String>,
    pub color: Option<String>,
    pub probability: Option<i32>,
}

/// Database response for a pipeline stage
#[derive(Debug, Clone, FromRow)]
pub struct PipelineStageDBResponse {
    pub id: StageId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub color: String,
    pub probability: i32,
    pub position: i32,
    pub is_won: bool,
    pub is_lost: bool,
    pub created_at: DateTime<Utc>,
}

impl PipelineStageDBResponse {
    pub fn is_terminal(&self) -> bool {
        self.is_won || self.is_lost
    }
}

/// One entry of the pipeline every new organization starts with.
#[derive(Debug, Clone, Copy)]
pub struct DefaultStage {
    pub name: &'static str,
    pub color: &'static str,
    pub probability: i32,
    pub is_won: bool,
    pub is_lost: bool,
}

/// The canonical pipeline, in position order starting at 1. Only the last two are terminal.
pub const DEFAULT_STAGES: [DefaultStage; 6] = [
    DefaultStage { name: "Lead", color: "#6366f1", probability: 10, is_won: false, is_lost: false },
    DefaultStage { name: "Qualified", color: "#8b5cf6", probability: 25, is_won: false, is_lost: false },
    DefaultStage { name: "Proposal", color: "#f59e0b", probability: 50, is_won: false, is_lost: false },
    DefaultStage { name: "Negotiation", color: "#f97316", probability: 75, is_won: false, is_lost: false },
    DefaultStage { name: "Won", color: "#10b981", probability: 100, is_won: true, is_lost: false },
    DefaultStage { name: "Lost", color: "#ef4444", probability: 0, is_won: false, is_lost: true },
];
