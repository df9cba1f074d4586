//! Dummy payment provider implementation
//!
//! Checkout "completes" instantly by redirecting straight to the success URL, and webhooks are
//! accepted as unsigned JSON events. Useful for testing and development purposes.

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::payment_providers::{BillingEvent, BillingProvider, CheckoutRequest, CheckoutSession, PaymentError, Result};

/// Dummy provider that never leaves the process
pub struct DummyProvider;

const KNOWN_KINDS: [&str; 4] = [
    "checkout_completed",
    "subscription_updated",
    "subscription_deleted",
    "invoice_payment_failed",
];

#[async_trait]
impl BillingProvider for DummyProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let session_id = format!("dummy_session_{}", uuid::Uuid::new_v4());
        let url = request.success_url.replace("{CHECKOUT_SESSION_ID}", &session_id);

        let new_customer_ref = match request.customer_ref {
            Some(_) => None,
            None => Some(format!("dummy_cus_{}", request.organization_id.simple())),
        };

        tracing::info!(
            org_id = %request.organization_id,
            plan = %request.plan,
            "Dummy provider created checkout session {session_id}"
        );

        Ok(CheckoutSession { url, new_customer_ref })
    }

    async fn create_portal_session(&self, _customer_ref: &str, return_url: &str) -> Result<String> {
        Ok(return_url.to_string())
    }

    async fn parse_webhook(&self, _headers: &HeaderMap, body: &str) -> Result<Option<BillingEvent>> {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| PaymentError::InvalidData(format!("Webhook body is not JSON: {e}")))?;

        let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or_default().to_owned();
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            tracing::debug!("Ignoring webhook event kind: {kind}");
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| PaymentError::InvalidData(format!("Malformed {kind} event: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanTier;

    fn checkout(customer_ref: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            organization_id: uuid::Uuid::new_v4(),
            plan: PlanTier::Pro,
            email: "owner@example.com".to_string(),
            name: "owner".to_string(),
            customer_ref: customer_ref.map(str::to_string),
            success_url: "http://localhost/billing?session={CHECKOUT_SESSION_ID}".to_string(),
            cancel_url: "http://localhost/billing".to_string(),
        }
    }

    #[tokio::test]
    async fn checkout_redirects_to_success_url() {
        let session = DummyProvider.create_checkout_session(&checkout(None)).await.unwrap();
        assert!(session.url.starts_with("http://localhost/billing?session=dummy_session_"));
        assert!(session.new_customer_ref.unwrap().starts_with("dummy_cus_"));

        let again = DummyProvider.create_checkout_session(&checkout(Some("dummy_cus_1"))).await.unwrap();
        assert_eq!(again.new_customer_ref, None);
    }

    #[tokio::test]
    async fn webhook_decodes_known_kinds_and_ignores_others() {
        let headers = HeaderMap::new();

        let event = DummyProvider
            .parse_webhook(&headers, r#"{"kind": "invoice_payment_failed", "subscription_ref": "sub_1"}"#)
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(BillingEvent::InvoicePaymentFailed {
                subscription_ref: "sub_1".to_string()
            })
        );

        let ignored = DummyProvider
            .parse_webhook(&headers, r#"{"kind": "customer_created", "id": "cus_1"}"#)
            .await
            .unwrap();
        assert_eq!(ignored, None);

        let malformed = DummyProvider.parse_webhook(&headers, r#"{"kind": "subscription_deleted"}"#).await;
        assert!(matches!(malformed, Err(PaymentError::InvalidData(_))));
    }
}
