//! API request/response models for tags and contact groups.

use super::fields::{check_color, required, trimmed, trimmed_patch};
use crate::db::models::tags::{ContactGroupCreateDBRequest, ContactGroupDBResponse, ContactGroupUpdateDBRequest, TagDBResponse};
use crate::errors::Result;
use crate::types::{GroupId, TagId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::rust::double_option;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TagId,
    pub name: String,
    /// Live contacts carrying the tag
    pub contact_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<TagDBResponse> for TagResponse {
    fn from(db: TagDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            contact_count: db.contact_count,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TagCreate {
    #[schema(example = "vip")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactGroupResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GroupId,
    pub name: String,
    pub color: Option<String>,
    pub contact_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ContactGroupDBResponse> for ContactGroupResponse {
    fn from(db: ContactGroupDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            color: db.color,
            contact_count: db.contact_count,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ContactGroupCreate {
    #[schema(example = "Partners")]
    pub name: String,
    #[schema(example = "#f59e0b")]
    pub color: Option<String>,
}

impl ContactGroupCreate {
    pub fn into_db(self) -> Result<ContactGroupCreateDBRequest> {
        let color = trimmed(self.color);
        check_color("color", color.as_deref())?;
        Ok(ContactGroupCreateDBRequest {
            name: required("name", &self.name)?,
            color,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ContactGroupUpdate {
    pub name: Option<String>,
    /// `null` removes the color
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub color: Option<Option<String>>,
}

impl ContactGroupUpdate {
    pub fn into_db(self) -> Result<ContactGroupUpdateDBRequest> {
        let color = trimmed_patch(self.color);
        if let Some(Some(c)) = &color {
            check_color("color", Some(c))?;
        }
        Ok(ContactGroupUpdateDBRequest {
            name: self.name.as_deref().map(|n| required("name", n)).transpose()?,
            color,
        })
    }
}
