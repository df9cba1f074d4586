//! API request/response models for deals and stage moves.

use super::{
    fields::{required, trimmed, trimmed_patch},
    pagination::Pagination,
};
use crate::db::models::deals::{DealCreateDBRequest, DealDBResponse, DealSort, DealUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::{ContactId, ContactStatus, DealId, SortOrder, StageId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, rust::double_option, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing deals
#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListDealsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub stage_id: Option<StageId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    /// Case-insensitive substring match on the title
    pub search: Option<String>,
    /// Include archived deals (default false)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub include_archived: Option<bool>,
    pub sort: Option<DealSort>,
    pub order: Option<SortOrder>,
}

fn check_value(value: Option<Decimal>) -> Result<()> {
    match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => Err(Error::invalid_field("value", "must not be negative")),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DealCreate {
    #[schema(example = "Annual licence")]
    pub title: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    #[schema(value_type = String, format = "uuid")]
    pub stage_id: StageId,
    /// Defaults to 0
    #[schema(value_type = Option<f64>)]
    pub value: Option<Decimal>,
    pub expected_close: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl DealCreate {
    pub fn into_db(self, created_by: UserId) -> Result<DealCreateDBRequest> {
        check_value(self.value)?;
        Ok(DealCreateDBRequest {
            created_by: Some(created_by),
            title: required("title", &self.title)?,
            contact_id: self.contact_id,
            stage_id: self.stage_id,
            value: self.value.unwrap_or_default(),
            expected_close: self.expected_close,
            notes: trimmed(self.notes),
        })
    }
}

/// Partial deal update. Stage moves use `PATCH /deals/{id}/stage`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DealUpdate {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<Option<ContactId>>,
    #[schema(value_type = Option<f64>)]
    pub value: Option<Decimal>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<NaiveDate>)]
    pub expected_close: Option<Option<NaiveDate>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
}

impl DealUpdate {
    pub fn into_db(self) -> Result<DealUpdateDBRequest> {
        check_value(self.value)?;
        Ok(DealUpdateDBRequest {
            title: self.title.as_deref().map(|t| required("title", t)).transpose()?,
            contact_id: self.contact_id,
            value: self.value,
            expected_close: self.expected_close,
            notes: trimmed_patch(self.notes),
        })
    }
}

/// Move a deal to another pipeline stage
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DealStageUpdate {
    #[schema(value_type = String, format = "uuid")]
    pub stage_id: StageId,
    /// Position within the target stage; the end of the stage when absent
    pub position: Option<i32>,
}

impl DealStageUpdate {
    pub fn validate(&self) -> Result<()> {
        match self.position {
            Some(p) if p < 0 => Err(Error::invalid_field("position", "must not be negative")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DealId,
    pub title: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    pub contact_name: Option<String>,
    #[schema(value_type = String, format = "uuid")]
    pub stage_id: StageId,
    pub stage_name: String,
    #[schema(value_type = f64)]
    pub value: Decimal,
    /// Copied from the stage at the last move
    pub probability: i32,
    pub expected_close: Option<NaiveDate>,
    /// Set when the deal enters a won or lost stage
    pub actual_close: Option<NaiveDate>,
    pub position: i32,
    pub notes: Option<String>,
    pub is_archived: bool,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DealDBResponse> for DealResponse {
    fn from(db: DealDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            contact_id: db.contact_id,
            contact_name: db.contact_name,
            stage_id: db.stage_id,
            stage_name: db.stage_name,
            value: db.value,
            probability: db.probability,
            expected_close: db.expected_close,
            actual_close: db.actual_close,
            position: db.position,
            notes: db.notes,
            is_archived: db.is_archived,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Result of a stage move
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageMoveResponse {
    pub deal: DealResponse,
    #[schema(value_type = String, format = "uuid")]
    pub from_stage_id: StageId,
    /// Status the linked contact was moved to, for won and lost moves
    pub contact_status: Option<ContactStatus>,
}
