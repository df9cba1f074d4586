//! Database models for users.

use crate::types::{OrganizationId, PlanTier, Role, SubscriptionStatus, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub organization_id: OrganizationId,
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Database response for a user
#[derive(Debug, Clone, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An active user joined with the subscription state of their organization
#[derive(Debug, Clone, FromRow)]
pub struct UserWithOrganization {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub plan: PlanTier,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
}
