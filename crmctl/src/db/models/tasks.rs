//! Database models for tasks.

use crate::types::{ContactId, DealId, OrganizationId, TaskId, TaskPriority, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Database request for creating a new task
#[derive(Debug, Clone)]
pub struct TaskCreateDBRequest {
    pub created_by: Option<UserId>,
    pub title: String,
    pub description: Option<String>,
    pub contact_id: Option<ContactId>,
    pub deal_id: Option<DealId>,
    pub assigned_to: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,
}

/// Database request for a partial task update. Completion is a separate one-way operation.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub contact_id: Option<Option<ContactId>>,
    pub deal_id: Option<Option<DealId>>,
    pub assigned_to: Option<Option<UserId>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<TaskPriority>,
}

impl TaskUpdateDBRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.contact_id.is_none()
            && self.deal_id.is_none()
            && self.assigned_to.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
    }
}

/// Database response for a task
#[derive(Debug, Clone, FromRow)]
pub struct TaskDBResponse {
    pub id: TaskId,
    pub organization_id: OrganizationId,
    pub title: String,
    pub description: Option<String>,
    pub contact_id: Option<ContactId>,
    pub contact_name: Option<String>,
    pub deal_id: Option<DealId>,
    pub deal_title: Option<String>,
    pub assigned_to: Option<UserId>,
    pub assigned_to_name: Option<String>,
    pub created_by: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A due task together with the user who should be reminded of it
#[derive(Debug, Clone, FromRow)]
pub struct DueTaskReminder {
    pub user_id: UserId,
    pub user_email: String,
    pub user_name: String,
    pub title: String,
    pub due_date: Option<NaiveDate>,
}

/// Sortable task columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum TaskSort {
    #[default]
    DueDate,
    Priority,
    CreatedAt,
    Title,
}

impl TaskSort {
    pub fn column(&self) -> &'static str {
        match self {
            TaskSort::DueDate => "t.due_date",
            TaskSort::Priority => "t.priority",
            TaskSort::CreatedAt => "t.created_at",
            TaskSort::Title => "t.title",
        }
    }
}
