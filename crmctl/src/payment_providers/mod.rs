//! Payment provider abstraction layer
//!
//! This module defines the `BillingProvider` trait, which abstracts hosted checkout, the
//! self-service billing portal and webhook verification across payment providers. Providers never
//! touch the database: they hand back references and events, and [`crate::billing`] applies them.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::BillingConfig,
    errors::Error,
    types::{OrganizationId, PlanTier},
};

pub mod dummy;
pub mod stripe;

/// Create a billing provider from configuration
///
/// This is the single point where we convert config into provider instances.
pub fn create_provider(config: &BillingConfig) -> Arc<dyn BillingProvider> {
    match config {
        BillingConfig::Stripe(stripe_config) => Arc::new(stripe::StripeProvider::from(stripe_config.clone())),
        BillingConfig::Dummy(_) => Arc::new(dummy::DummyProvider),
    }
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur while talking to a payment provider
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Webhook signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    #[error("Plan {0} cannot be purchased")]
    UnknownPlan(PlanTier),
}

impl From<PaymentError> for Error {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature(_) => Error::Unauthenticated {
                message: Some("Invalid webhook signature".to_string()),
            },
            PaymentError::InvalidData(message) => Error::Validation { message, fields: vec![] },
            PaymentError::UnknownPlan(plan) => Error::invalid_field("plan", format!("{plan} is not a purchasable plan")),
            PaymentError::ProviderApi(message) => Error::Other(anyhow::anyhow!("billing provider: {message}")),
        }
    }
}

/// Everything a provider needs to start a hosted checkout for an organization.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub organization_id: OrganizationId,
    pub plan: PlanTier,
    pub email: String,
    pub name: String,
    /// Billing customer already on file for the organization, if any
    pub customer_ref: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// A started checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Where to send the browser
    pub url: String,
    /// Customer reference created for this checkout; the caller stores it on the organization
    pub new_customer_ref: Option<String>,
}

/// Subscription lifecycle events the core reacts to. Anything else a provider sends is dropped
/// during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingEvent {
    CheckoutCompleted {
        organization_id: OrganizationId,
        plan: PlanTier,
        subscription_ref: String,
        #[serde(default)]
        customer_ref: Option<String>,
    },
    SubscriptionUpdated {
        organization_id: OrganizationId,
        /// Provider status string, e.g. `active`, `past_due`, `canceled`, `unpaid`
        status: String,
        /// Plan the current price maps to, when it maps to one
        #[serde(default)]
        plan: Option<PlanTier>,
    },
    SubscriptionDeleted {
        subscription_ref: String,
    },
    InvoicePaymentFailed {
        subscription_ref: String,
    },
}

impl BillingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BillingEvent::CheckoutCompleted { .. } => "checkout_completed",
            BillingEvent::SubscriptionUpdated { .. } => "subscription_updated",
            BillingEvent::SubscriptionDeleted { .. } => "subscription_deleted",
            BillingEvent::InvoicePaymentFailed { .. } => "invoice_payment_failed",
        }
    }
}

/// Abstract billing provider interface
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a hosted checkout for a subscription to `request.plan`.
    ///
    /// Creates the provider-side customer first when the organization has none.
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Create a billing portal session for customer self-service
    ///
    /// Returns a URL that the user should be redirected to for managing their billing.
    async fn create_portal_session(&self, customer_ref: &str, return_url: &str) -> Result<String>;

    /// Verify and decode a webhook delivery.
    ///
    /// Returns `Ok(None)` for authentic events of kinds the core ignores, and `Err` when the
    /// delivery cannot be authenticated or decoded.
    async fn parse_webhook(&self, headers: &HeaderMap, body: &str) -> Result<Option<BillingEvent>>;
}
