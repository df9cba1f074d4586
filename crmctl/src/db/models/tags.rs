//! Database models for tags and contact groups.

use crate::types::{GroupId, OrganizationId, TagId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database response for a tag
#[derive(Debug, Clone, FromRow)]
pub struct TagDBResponse {
    pub id: TagId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub contact_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Database request for creating a contact group
#[derive(Debug, Clone)]
pub struct ContactGroupCreateDBRequest {
    pub name: String,
    pub color: Option<String>,
}

/// Database request for updating a contact group
#[derive(Debug, Clone, Default)]
pub struct ContactGroupUpdateDBRequest {
    pub name: Option<String>,
    pub color: Option<Option<String>>,
}

/// Database response for a contact group
#[derive(Debug, Clone, FromRow)]
pub struct ContactGroupDBResponse {
    pub id: GroupId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub color: Option<String>,
    pub contact_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
