//! Database models for activities. Activities are append-only.

use crate::types::{ActivityId, ActivityType, ContactId, DealId, OrganizationId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for appending an activity
#[derive(Debug, Clone)]
pub struct ActivityCreateDBRequest {
    pub activity_type: ActivityType,
    pub description: String,
    pub contact_id: Option<ContactId>,
    pub deal_id: Option<DealId>,
    pub metadata: serde_json::Value,
    pub created_by: Option<UserId>,
}

impl ActivityCreateDBRequest {
    pub fn new(activity_type: ActivityType, description: impl Into<String>) -> Self {
        Self {
            activity_type,
            description: description.into(),
            contact_id: None,
            deal_id: None,
            metadata: serde_json::Value::Object(Default::default()),
            created_by: None,
        }
    }

    pub fn contact(mut self, contact_id: Option<ContactId>) -> Self {
        self.contact_id = contact_id;
        self
    }

    pub fn deal(mut self, deal_id: DealId) -> Self {
        self.deal_id = Some(deal_id);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn by(mut self, user_id: Option<UserId>) -> Self {
        self.created_by = user_id;
        self
    }
}

/// Database response for an activity, with display names of the linked records
#[derive(Debug, Clone, FromRow)]
pub struct ActivityDBResponse {
    pub id: ActivityId,
    pub organization_id: OrganizationId,
    pub activity_type: ActivityType,
    pub description: String,
    pub contact_id: Option<ContactId>,
    pub contact_name: Option<String>,
    pub deal_id: Option<DealId>,
    pub deal_title: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: Option<UserId>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
