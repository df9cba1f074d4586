//! Common type definitions shared by the database and API layers.
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases for readability:
//!
//! - [`OrganizationId`]: tenant identifier, bound into every tenant-scoped query
//! - [`UserId`], [`ContactId`], [`DealId`], [`StageId`], [`TaskId`], [`ActivityId`],
//!   [`TagId`], [`GroupId`]
//!
//! # Enumerations
//!
//! Every closed set of values stored in the database is a PostgreSQL enum type mirrored here
//! with `sqlx::Type`, so an out-of-range value can never be written.
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

pub type OrganizationId = Uuid;
pub type UserId = Uuid;
pub type ContactId = Uuid;
pub type DealId = Uuid;
pub type StageId = Uuid;
pub type TaskId = Uuid;
pub type ActivityId = Uuid;
pub type TagId = Uuid;
pub type GroupId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "plan_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Trial,
    Basic,
    Pro,
    Cancelled,
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanTier::Trial => write!(f, "trial"),
            PlanTier::Basic => write!(f, "basic"),
            PlanTier::Pro => write!(f, "pro"),
            PlanTier::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    /// Map a payment provider's subscription status onto the local lifecycle.
    ///
    /// Anything the provider reports that is not a known failure state counts as active.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Cancelled,
            "unpaid" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contact_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    New,
    Contacted,
    Qualified,
    Customer,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "task_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "activity_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Call,
    Email,
    Meeting,
    Note,
    TaskCompleted,
    StageChange,
    DealCreated,
    DealWon,
    DealLost,
}

impl ActivityType {
    /// Types a user may log by hand. The rest are written by the system as side effects.
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            ActivityType::Call | ActivityType::Email | ActivityType::Meeting | ActivityType::Note
        )
    }
}

/// Direction for list sorting. Columns come from per-entity closed enums, never from input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}
