//! Database models for deals.

use crate::types::{ContactId, DealId, OrganizationId, StageId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Database request for creating a new deal
#[derive(Debug, Clone)]
pub struct DealCreateDBRequest {
    pub created_by: Option<UserId>,
    pub title: String,
    pub contact_id: Option<ContactId>,
    pub stage_id: StageId,
    pub value: Decimal,
    pub expected_close: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Database request for a partial deal update. Stage moves go through the stage transition.
#[derive(Debug, Clone, Default)]
pub struct DealUpdateDBRequest {
    pub title: Option<String>,
    pub contact_id: Option<Option<ContactId>>,
    pub value: Option<Decimal>,
    pub expected_close: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
}

impl DealUpdateDBRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.contact_id.is_none()
            && self.value.is_none()
            && self.expected_close.is_none()
            && self.notes.is_none()
    }
}

/// Database response for a deal, with the names of its stage and contact
#[derive(Debug, Clone, FromRow)]
pub struct DealDBResponse {
    pub id: DealId,
    pub organization_id: OrganizationId,
    pub title: String,
    pub contact_id: Option<ContactId>,
    pub contact_name: Option<String>,
    pub stage_id: StageId,
    pub stage_name: String,
    pub value: Decimal,
    pub probability: i32,
    pub expected_close: Option<NaiveDate>,
    pub actual_close: Option<NaiveDate>,
    pub position: i32,
    pub notes: Option<String>,
    pub is_archived: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a stage transition changed, for the caller to report
#[derive(Debug, Clone)]
pub struct StageTransition {
    pub deal: DealDBResponse,
    pub from_stage_id: StageId,
    /// Status written onto the linked contact, if the move was terminal and the contact exists
    pub contact_status: Option<crate::types::ContactStatus>,
}

/// Sortable deal columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum DealSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    Value,
    ExpectedClose,
    Position,
}

impl DealSort {
    pub fn column(&self) -> &'static str {
        match self {
            DealSort::CreatedAt => "d.created_at",
            DealSort::UpdatedAt => "d.updated_at",
            DealSort::Title => "d.title",
            DealSort::Value => "d.value",
            DealSort::ExpectedClose => "d.expected_close",
            DealSort::Position => "d.position",
        }
    }
}
