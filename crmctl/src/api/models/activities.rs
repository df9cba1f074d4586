//! API request/response models for the activity timeline.

use super::{fields::required, pagination::Pagination};
use crate::db::models::activities::{ActivityCreateDBRequest, ActivityDBResponse};
use crate::errors::{Error, Result};
use crate::types::{ActivityId, ActivityType, ContactId, DealId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing activities, newest first
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListActivitiesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub deal_id: Option<DealId>,
    #[serde(rename = "type")]
    pub activity_type: Option<ActivityType>,
}

/// Log a call, email, meeting or note. Other activity types are written by the system.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActivityCreate {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[schema(example = "Intro call, interested in the pro plan")]
    pub description: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub deal_id: Option<DealId>,
    /// Free-form JSON object
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

impl ActivityCreate {
    pub fn into_db(self, created_by: UserId) -> Result<ActivityCreateDBRequest> {
        if !self.activity_type.is_manual() {
            return Err(Error::invalid_field("type", "must be one of call, email, meeting, note"));
        }
        let metadata = match self.metadata {
            None | Some(serde_json::Value::Null) => serde_json::Value::Object(Default::default()),
            Some(object @ serde_json::Value::Object(_)) => object,
            Some(_) => return Err(Error::invalid_field("metadata", "must be an object")),
        };

        let mut request = ActivityCreateDBRequest::new(self.activity_type, required("description", &self.description)?)
            .contact(self.contact_id)
            .metadata(metadata)
            .by(Some(created_by));
        request.deal_id = self.deal_id;
        Ok(request)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ActivityId,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub description: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    pub contact_name: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub deal_id: Option<DealId>,
    pub deal_title: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ActivityDBResponse> for ActivityResponse {
    fn from(db: ActivityDBResponse) -> Self {
        Self {
            id: db.id,
            activity_type: db.activity_type,
            description: db.description,
            contact_id: db.contact_id,
            contact_name: db.contact_name,
            deal_id: db.deal_id,
            deal_title: db.deal_title,
            metadata: db.metadata,
            created_by: db.created_by,
            created_by_name: db.created_by_name,
            created_at: db.created_at,
        }
    }
}
