//! Database models for organizations (tenants).

use crate::types::{OrganizationId, PlanTier, SubscriptionStatus};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a new organization at provisioning time
#[derive(Debug, Clone)]
pub struct OrganizationCreateDBRequest {
    pub name: String,
    pub trial_ends_at: DateTime<Utc>,
}

/// Database response for an organization
#[derive(Debug, Clone, FromRow)]
pub struct OrganizationDBResponse {
    pub id: OrganizationId,
    pub name: String,
    pub plan: PlanTier,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
