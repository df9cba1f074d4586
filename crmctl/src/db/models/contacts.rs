//! Database models for contacts.

use crate::types::{ContactId, ContactStatus, GroupId, OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Database request for creating a new contact
#[derive(Debug, Clone)]
pub struct ContactCreateDBRequest {
    pub created_by: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub status: ContactStatus,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub group_id: Option<GroupId>,
    /// Tag names, resolved (or created) within the organization
    pub tags: Vec<String>,
}

/// Database request for a partial contact update.
///
/// Outer `None` leaves a column untouched; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdateDBRequest {
    pub name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub company: Option<Option<String>>,
    pub job_title: Option<Option<String>>,
    pub status: Option<ContactStatus>,
    pub source: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub group_id: Option<Option<GroupId>>,
    /// Replaces the whole tag set when present
    pub tags: Option<Vec<String>>,
}

impl ContactUpdateDBRequest {
    /// True when no column would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.company.is_none()
            && self.job_title.is_none()
            && self.status.is_none()
            && self.source.is_none()
            && self.notes.is_none()
            && self.group_id.is_none()
            && self.tags.is_none()
    }
}

/// Database response for a contact, with its tag names
#[derive(Debug, Clone, FromRow)]
pub struct ContactDBResponse {
    pub id: ContactId,
    pub organization_id: OrganizationId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub status: ContactStatus,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub group_id: Option<GroupId>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// Sortable contact columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ContactSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Company,
    Status,
}

impl ContactSort {
    pub fn column(&self) -> &'static str {
        match self {
            ContactSort::CreatedAt => "c.created_at",
            ContactSort::UpdatedAt => "c.updated_at",
            ContactSort::Name => "c.name",
            ContactSort::Company => "c.company",
            ContactSort::Status => "c.status",
        }
    }
}
