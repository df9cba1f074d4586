//! API request/response models for tasks.

use super::{
    fields::{required, trimmed, trimmed_patch},
    pagination::Pagination,
};
use crate::db::models::tasks::{TaskCreateDBRequest, TaskDBResponse, TaskSort, TaskUpdateDBRequest};
use crate::errors::Result;
use crate::types::{ContactId, DealId, SortOrder, TaskId, TaskPriority, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, rust::double_option, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing tasks
#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListTasksQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub completed: Option<bool>,
    pub priority: Option<TaskPriority>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub deal_id: Option<DealId>,
    /// Only tasks due on or before this date
    pub due_by: Option<NaiveDate>,
    pub search: Option<String>,
    pub sort: Option<TaskSort>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskCreate {
    #[schema(example = "Send proposal")]
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub deal_id: Option<DealId>,
    /// Member of the organization to assign the task to
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    /// Defaults to `medium`
    pub priority: Option<TaskPriority>,
}

impl TaskCreate {
    pub fn into_db(self, created_by: UserId) -> Result<TaskCreateDBRequest> {
        Ok(TaskCreateDBRequest {
            created_by: Some(created_by),
            title: required("title", &self.title)?,
            description: trimmed(self.description),
            contact_id: self.contact_id,
            deal_id: self.deal_id,
            assigned_to: self.assigned_to,
            due_date: self.due_date,
            priority: self.priority.unwrap_or(TaskPriority::Medium),
        })
    }
}

/// Partial task update. Completion is `POST /tasks/{id}/complete`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskUpdate {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<Option<ContactId>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub deal_id: Option<Option<DealId>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<Option<UserId>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<NaiveDate>)]
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<TaskPriority>,
}

impl TaskUpdate {
    pub fn into_db(self) -> Result<TaskUpdateDBRequest> {
        Ok(TaskUpdateDBRequest {
            title: self.title.as_deref().map(|t| required("title", t)).transpose()?,
            description: trimmed_patch(self.description),
            contact_id: self.contact_id,
            deal_id: self.deal_id,
            assigned_to: self.assigned_to,
            due_date: self.due_date,
            priority: self.priority,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub contact_id: Option<ContactId>,
    pub contact_name: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub deal_id: Option<DealId>,
    pub deal_title: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
    pub assigned_to_name: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskDBResponse> for TaskResponse {
    fn from(db: TaskDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            description: db.description,
            contact_id: db.contact_id,
            contact_name: db.contact_name,
            deal_id: db.deal_id,
            deal_title: db.deal_title,
            assigned_to: db.assigned_to,
            assigned_to_name: db.assigned_to_name,
            created_by: db.created_by,
            due_date: db.due_date,
            priority: db.priority,
            is_completed: db.is_completed,
            completed_at: db.completed_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
