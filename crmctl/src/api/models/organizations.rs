//! API request/response models for the caller's organization, its members and billing.

use super::fields::required;
use crate::db::models::{organizations::OrganizationDBResponse, users::UserDBResponse};
use crate::errors::Result;
use crate::types::{OrganizationId, PlanTier, Role, SubscriptionStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: OrganizationId,
    pub name: String,
    pub plan: PlanTier,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Whether a billing customer exists, i.e. the billing portal is available
    pub has_billing_account: bool,
    pub created_at: DateTime<Utc>,
}

impl From<OrganizationDBResponse> for OrganizationResponse {
    fn from(db: OrganizationDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            plan: db.plan,
            subscription_status: db.subscription_status,
            trial_ends_at: db.trial_ends_at,
            has_billing_account: db.billing_customer_id.is_some(),
            created_at: db.created_at,
        }
    }
}

/// Admin settings edit. Plan and status only change through billing.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct OrganizationUpdate {
    #[schema(example = "Acme Sales")]
    pub name: String,
}

impl OrganizationUpdate {
    pub fn name(&self) -> Result<String> {
        required("name", &self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for MemberResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            name: db.name,
            role: db.role,
            is_active: db.is_active,
            created_at: db.created_at,
        }
    }
}

/// Start a hosted checkout for a paid plan
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CheckoutCreate {
    pub plan: PlanTier,
}

/// Where to send the browser next
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedirectResponse {
    pub url: String,
}

/// Acknowledgement returned to the billing provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    /// Whether the event changed an organization
    pub applied: bool,
}
