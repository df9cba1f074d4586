//! Stripe payment provider implementation
//!
//! Talks to the Stripe REST API directly: form-encoded requests, bearer API key, JSON responses.
//! Webhooks are authenticated with the `Stripe-Signature` scheme (HMAC-SHA256 over
//! `"{timestamp}.{body}"`).

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use url::Url;

use crate::{
    config::{StripeConfig, StripePrices},
    payment_providers::{BillingEvent, BillingProvider, CheckoutRequest, CheckoutSession, PaymentError, Result},
    types::{OrganizationId, PlanTier},
};

type HmacSha256 = Hmac<Sha256>;

/// Deliveries signed further than this from now are rejected
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe payment provider
pub struct StripeProvider {
    client: reqwest::Client,
    api_base: Url,
    api_key: String,
    webhook_secret: String,
    prices: StripePrices,
}

impl From<StripeConfig> for StripeProvider {
    fn from(config: StripeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base,
            api_key: config.api_key,
            webhook_secret: config.webhook_secret,
            prices: config.prices,
        }
    }
}

impl StripeProvider {
    /// POST a form to the Stripe API and return the decoded JSON object.
    async fn post_form(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self
            .api_base
            .join(path)
            .map_err(|e| PaymentError::ProviderApi(format!("Invalid Stripe URL: {e}")))?;
        let body = serde_urlencoded::to_string(params).map_err(|e| PaymentError::InvalidData(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Stripe request to {path} failed: {e:?}");
                PaymentError::ProviderApi(e.to_string())
            })?;

        let status = response.status();
        let json: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::ProviderApi(format!("Unreadable Stripe response: {e}")))?;

        if !status.is_success() {
            let message = json["error"]["message"].as_str().unwrap_or("unknown error").to_string();
            tracing::error!(%status, "Stripe rejected {path}: {message}");
            return Err(PaymentError::ProviderApi(message));
        }

        Ok(json)
    }

    async fn create_customer(&self, request: &CheckoutRequest) -> Result<String> {
        let customer = self
            .post_form(
                "v1/customers",
                &[
                    ("email", request.email.clone()),
                    ("name", request.name.clone()),
                    ("metadata[organization_id]", request.organization_id.to_string()),
                ],
            )
            .await?;

        let id = string_field(&customer, "id").ok_or_else(|| PaymentError::ProviderApi("Customer missing id".to_string()))?;
        tracing::info!(org_id = %request.organization_id, "Created Stripe customer {id}");
        Ok(id)
    }

    fn event_from(&self, event_type: &str, object: &Value) -> Option<BillingEvent> {
        match event_type {
            "checkout.session.completed" => {
                let organization_id = metadata_org(object).or_else(|| uuid_field(object, "client_reference_id"))?;
                let plan = match object["metadata"]["plan"].as_str() {
                    Some("basic") => PlanTier::Basic,
                    Some("pro") => PlanTier::Pro,
                    _ => return None,
                };
                Some(BillingEvent::CheckoutCompleted {
                    organization_id,
                    plan,
                    subscription_ref: string_field(object, "subscription")?,
                    customer_ref: string_field(object, "customer"),
                })
            }
            "customer.subscription.updated" => {
                let price = object["items"]["data"][0]["price"]["id"].as_str();
                Some(BillingEvent::SubscriptionUpdated {
                    organization_id: metadata_org(object)?,
                    status: string_field(object, "status")?,
                    plan: price.and_then(|p| self.prices.plan_for(p)),
                })
            }
            "customer.subscription.deleted" => Some(BillingEvent::SubscriptionDeleted {
                subscription_ref: string_field(object, "id")?,
            }),
            "invoice.payment_failed" => {
                let subscription_ref = string_field(object, "subscription").or_else(|| {
                    object["parent"]["subscription_details"]["subscription"]
                        .as_str()
                        .map(str::to_string)
                })?;
                Some(BillingEvent::InvoicePaymentFailed { subscription_ref })
            }
            _ => None,
        }
    }
}

fn string_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn uuid_field(object: &Value, key: &str) -> Option<OrganizationId> {
    object.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

fn metadata_org(object: &Value) -> Option<OrganizationId> {
    object["metadata"]["organization_id"].as_str().and_then(|s| s.parse().ok())
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`) against `body`.
pub fn verify_signature(header: &str, body: &str, secret: &str, now: i64) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(PaymentError::InvalidSignature("timestamp outside tolerance".to_string()));
    }

    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PaymentError::InvalidSignature("no matching signature".to_string()))
}

#[async_trait]
impl BillingProvider for StripeProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let price = self
            .prices
            .price_for(request.plan)
            .ok_or(PaymentError::UnknownPlan(request.plan))?
            .to_string();

        let (customer, new_customer_ref) = match &request.customer_ref {
            Some(existing) => {
                tracing::info!(org_id = %request.organization_id, "Using existing Stripe customer {existing}");
                (existing.clone(), None)
            }
            None => {
                let created = self.create_customer(request).await?;
                (created.clone(), Some(created))
            }
        };

        let org = request.organization_id.to_string();
        let plan = request.plan.to_string();
        let session = self
            .post_form(
                "v1/checkout/sessions",
                &[
                    ("mode", "subscription".to_string()),
                    ("customer", customer),
                    ("line_items[0][price]", price),
                    ("line_items[0][quantity]", "1".to_string()),
                    ("success_url", request.success_url.clone()),
                    ("cancel_url", request.cancel_url.clone()),
                    ("client_reference_id", org.clone()),
                    ("metadata[organization_id]", org.clone()),
                    ("metadata[plan]", plan.clone()),
                    ("subscription_data[metadata][organization_id]", org),
                    ("subscription_data[metadata][plan]", plan),
                ],
            )
            .await?;

        let url = string_field(&session, "url").ok_or_else(|| {
            tracing::error!("Checkout session missing URL");
            PaymentError::ProviderApi("Checkout session missing URL".to_string())
        })?;

        Ok(CheckoutSession { url, new_customer_ref })
    }

    async fn create_portal_session(&self, customer_ref: &str, return_url: &str) -> Result<String> {
        let session = self
            .post_form(
                "v1/billing_portal/sessions",
                &[("customer", customer_ref.to_string()), ("return_url", return_url.to_string())],
            )
            .await?;

        string_field(&session, "url").ok_or_else(|| PaymentError::ProviderApi("Portal session missing URL".to_string()))
    }

    async fn parse_webhook(&self, headers: &HeaderMap, body: &str) -> Result<Option<BillingEvent>> {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PaymentError::InvalidSignature("missing stripe-signature header".to_string()))?;
        verify_signature(signature, body, &self.webhook_secret, chrono::Utc::now().timestamp())?;

        let event: Value = serde_json::from_str(body).map_err(|e| PaymentError::InvalidData(format!("Webhook body is not JSON: {e}")))?;
        let event_type = event["type"].as_str().unwrap_or_default();
        let parsed = self.event_from(event_type, &event["data"]["object"]);

        if parsed.is_none() {
            tracing::debug!("Ignoring webhook event type: {event_type}");
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header as header_matcher, method, path},
    };

    const SECRET: &str = "whsec_test";

    fn provider(api_base: &str) -> StripeProvider {
        crate::install_crypto_provider();
        StripeProvider::from(StripeConfig {
            api_key: "sk_test_123".to_string(),
            webhook_secret: SECRET.to_string(),
            api_base: api_base.parse().unwrap(),
            prices: StripePrices {
                basic: "price_basic".to_string(),
                pro: "price_pro".to_string(),
            },
        })
    }

    fn sign(body: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{body}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn checkout(customer_ref: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            organization_id: uuid::Uuid::new_v4(),
            plan: PlanTier::Basic,
            email: "owner@example.com".to_string(),
            name: "owner".to_string(),
            customer_ref: customer_ref.map(str::to_string),
            success_url: "https://app.example.com/settings/billing?ok=1".to_string(),
            cancel_url: "https://app.example.com/settings/billing".to_string(),
        }
    }

    #[test]
    fn signature_accepts_valid_and_rejects_tampering() {
        let body = r#"{"type":"invoice.payment_failed"}"#;
        let now = 1_700_000_000;
        let header = sign(body, now);

        assert!(verify_signature(&header, body, SECRET, now).is_ok());
        assert!(verify_signature(&header, body, SECRET, now + SIGNATURE_TOLERANCE_SECS).is_ok());
        assert!(verify_signature(&header, r#"{"type":"x"}"#, SECRET, now).is_err());
        assert!(verify_signature(&header, body, "whsec_other", now).is_err());
        assert!(verify_signature(&header, body, SECRET, now + SIGNATURE_TOLERANCE_SECS + 1).is_err());
        assert!(verify_signature("v1=deadbeef", body, SECRET, now).is_err());
    }

    #[test]
    fn signature_rejects_extreme_timestamps() {
        let now = 1_700_000_000;
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={t},v1=00");
            assert!(matches!(
                verify_signature(&header, "{}", SECRET, now),
                Err(PaymentError::InvalidSignature(_))
            ));
        }
    }

    #[test]
    fn signature_accepts_any_of_several_v1_values() {
        let body = "{}";
        let now = 1_700_000_000;
        let valid = sign(body, now);
        let (_, good) = valid.split_once(",v1=").unwrap();
        let header = format!("t={now},v1=00ff,v1={good}");
        assert!(verify_signature(&header, body, SECRET, now).is_ok());
    }

    #[tokio::test]
    async fn first_checkout_creates_customer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .and(header_matcher("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("email=owner%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cus_new"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("customer=cus_new"))
            .and(body_string_contains("line_items%5B0%5D%5Bprice%5D=price_basic"))
            .and(body_string_contains("mode=subscription"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "cs_1", "url": "https://checkout.stripe.com/c/cs_1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = provider(&format!("{}/", server.uri()))
            .create_checkout_session(&checkout(None))
            .await
            .unwrap();

        assert_eq!(session.url, "https://checkout.stripe.com/c/cs_1");
        assert_eq!(session.new_customer_ref.as_deref(), Some("cus_new"));
    }

    #[tokio::test]
    async fn existing_customer_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cus_unexpected"})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("customer=cus_existing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "https://checkout.stripe.com/c/cs_2"})))
            .mount(&server)
            .await;

        let session = provider(&format!("{}/", server.uri()))
            .create_checkout_session(&checkout(Some("cus_existing")))
            .await
            .unwrap();
        assert_eq!(session.new_customer_ref, None);
    }

    #[tokio::test]
    async fn api_errors_surface_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/billing_portal/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "No such customer"}})))
            .mount(&server)
            .await;

        let err = provider(&format!("{}/", server.uri()))
            .create_portal_session("cus_missing", "https://app.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ProviderApi(ref m) if m == "No such customer"));
    }

    #[tokio::test]
    async fn trial_plan_cannot_be_bought() {
        let request = CheckoutRequest {
            plan: PlanTier::Trial,
            ..checkout(None)
        };
        let err = provider("http://127.0.0.1:9/").create_checkout_session(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::UnknownPlan(PlanTier::Trial)));
    }

    #[tokio::test]
    async fn webhook_events_are_mapped() {
        let provider = provider("http://127.0.0.1:9/");
        let org = uuid::Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        let parse = |body: Value| {
            let body = body.to_string();
            let mut headers = HeaderMap::new();
            headers.insert("stripe-signature", sign(&body, now).parse().unwrap());
            (headers, body)
        };

        let (headers, body) = parse(json!({
            "type": "checkout.session.completed",
            "data": {"object": {
                "subscription": "sub_1", "customer": "cus_1",
                "metadata": {"organization_id": org.to_string(), "plan": "pro"}
            }}
        }));
        assert_eq!(
            provider.parse_webhook(&headers, &body).await.unwrap(),
            Some(BillingEvent::CheckoutCompleted {
                organization_id: org,
                plan: PlanTier::Pro,
                subscription_ref: "sub_1".to_string(),
                customer_ref: Some("cus_1".to_string()),
            })
        );

        let (headers, body) = parse(json!({
            "type": "customer.subscription.updated",
            "data": {"object": {
                "id": "sub_1", "status": "past_due",
                "metadata": {"organization_id": org.to_string()},
                "items": {"data": [{"price": {"id": "price_basic"}}]}
            }}
        }));
        assert_eq!(
            provider.parse_webhook(&headers, &body).await.unwrap(),
            Some(BillingEvent::SubscriptionUpdated {
                organization_id: org,
                status: "past_due".to_string(),
                plan: Some(PlanTier::Basic),
            })
        );

        let (headers, body) = parse(json!({
            "type": "invoice.payment_failed",
            "data": {"object": {"parent": {"subscription_details": {"subscription": "sub_9"}}}}
        }));
        assert_eq!(
            provider.parse_webhook(&headers, &body).await.unwrap(),
            Some(BillingEvent::InvoicePaymentFailed {
                subscription_ref: "sub_9".to_string()
            })
        );

        let (headers, body) = parse(json!({"type": "customer.created", "data": {"object": {"id": "cus_1"}}}));
        assert_eq!(provider.parse_webhook(&headers, &body).await.unwrap(), None);

        let unsigned = provider.parse_webhook(&HeaderMap::new(), "{}").await;
        assert!(matches!(unsigned, Err(PaymentError::InvalidSignature(_))));
    }
}
