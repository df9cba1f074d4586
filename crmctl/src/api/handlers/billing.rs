//! Checkout, billing portal and the provider webhook.
//!
//! Checkout and portal are open to admins of expired organizations too, so they can pay.

use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::organizations::{CheckoutCreate, RedirectResponse, WebhookAck},
    },
    auth::tenant::AdminTenant,
    billing::apply_event,
    db::handlers::Organizations,
    errors::{Error, ErrorBody, Result},
    payment_providers::{BillingProvider, CheckoutRequest},
};
use axum::{Json, extract::State, http::HeaderMap};
use std::sync::Arc;

fn provider(state: &AppState) -> Result<Arc<dyn BillingProvider>> {
    state.billing.clone().ok_or_else(|| Error::Internal {
        operation: "billing: no payment provider configured".to_string(),
    })
}

fn billing_page(state: &AppState) -> String {
    format!("{}/settings/billing", state.config.dashboard_url.trim_end_matches('/'))
}

#[utoipa::path(
    post,
    path = "/billing/checkout",
    tag = "billing",
    summary = "Start a checkout",
    description = "Admin only. Creates the billing customer on first use.",
    request_body = CheckoutCreate,
    responses(
        (status = 200, description = "Hosted checkout URL", body = RedirectResponse),
        (status = 400, description = "Plan cannot be purchased", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(plan = %body.plan))]
pub async fn create_checkout(
    State(state): State<AppState>,
    AdminTenant(tenant): AdminTenant,
    ApiJson(body): ApiJson<CheckoutCreate>,
) -> Result<Json<RedirectResponse>> {
    let provider = provider(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut organizations = Organizations::new(&mut conn);
    let organization = organizations
        .get_by_id(tenant.org_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization", tenant.org_id))?;

    let page = billing_page(&state);
    let request = CheckoutRequest {
        organization_id: organization.id,
        plan: body.plan,
        email: tenant.user_email.clone(),
        name: organization.name.clone(),
        customer_ref: organization.billing_customer_id.clone(),
        success_url: format!("{page}?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: page,
    };
    let session = provider.create_checkout_session(&request).await?;

    if let Some(customer_ref) = &session.new_customer_ref {
        organizations.set_billing_customer(organization.id, customer_ref).await?;
    }

    Ok(Json(RedirectResponse { url: session.url }))
}

#[utoipa::path(
    post,
    path = "/billing/portal",
    tag = "billing",
    summary = "Open the billing portal",
    description = "Admin only. Requires a completed checkout.",
    responses(
        (status = 200, description = "Billing portal URL", body = RedirectResponse),
        (status = 400, description = "No billing account yet", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_portal(State(state): State<AppState>, AdminTenant(tenant): AdminTenant) -> Result<Json<RedirectResponse>> {
    let provider = provider(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let organization = Organizations::new(&mut conn)
        .get_by_id(tenant.org_id)
        .await?
        .ok_or_else(|| Error::not_found("Organization", tenant.org_id))?;
    let customer_ref = organization.billing_customer_id.ok_or_else(|| Error::Validation {
        message: "Organization has no billing account yet".to_string(),
        fields: vec![],
    })?;

    let url = provider.create_portal_session(&customer_ref, &billing_page(&state)).await?;
    Ok(Json(RedirectResponse { url }))
}

#[utoipa::path(
    post,
    path = "/webhooks/billing",
    tag = "billing",
    summary = "Billing provider webhook",
    description = "Signed by the provider. Unknown event kinds are acknowledged and ignored.",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event received", body = WebhookAck),
        (status = 401, description = "Invalid signature", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn billing_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Json<WebhookAck>> {
    let provider = provider(&state)?;

    let Some(event) = provider.parse_webhook(&headers, &body).await? else {
        tracing::debug!("Ignoring billing event of unhandled kind");
        return Ok(Json(WebhookAck {
            received: true,
            applied: false,
        }));
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let applied = apply_event(&mut Organizations::new(&mut conn), &event).await?;

    Ok(Json(WebhookAck { received: true, applied }))
}
