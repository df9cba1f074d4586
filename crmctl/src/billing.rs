//! Applying verified billing events to organizations.
//!
//! | event                    | effect                                                        |
//! |--------------------------|---------------------------------------------------------------|
//! | `checkout_completed`     | plan from the checkout, status `active`, trial cleared        |
//! | `subscription_updated`   | status mapped from the provider, plan if the price is known   |
//! | `subscription_deleted`   | plan `cancelled`, status `cancelled`                          |
//! | `invoice_payment_failed` | status `past_due`                                             |
//!
//! Events for organizations or subscriptions we do not know are logged and ignored.

use crate::{
    db::{errors::Result, handlers::Organizations},
    payment_providers::BillingEvent,
    types::SubscriptionStatus,
};

/// Apply one event. Returns whether an organization was changed.
#[tracing::instrument(skip(organizations), fields(kind = event.kind()), err)]
pub async fn apply_event(organizations: &mut Organizations<'_>, event: &BillingEvent) -> Result<bool> {
    let applied = match event {
        BillingEvent::CheckoutCompleted {
            organization_id,
            plan,
            subscription_ref,
            customer_ref,
        } => {
            organizations
                .complete_checkout(*organization_id, *plan, subscription_ref, customer_ref.as_deref())
                .await?
        }
        BillingEvent::SubscriptionUpdated {
            organization_id,
            status,
            plan,
        } => {
            organizations
                .update_subscription(*organization_id, SubscriptionStatus::from_provider(status), *plan)
                .await?
        }
        BillingEvent::SubscriptionDeleted { subscription_ref } => organizations.cancel_subscription(subscription_ref).await?,
        BillingEvent::InvoicePaymentFailed { subscription_ref } => organizations.mark_past_due(subscription_ref).await?,
    };

    if !applied {
        tracing::warn!("Billing event matched no organization");
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::provision_test_tenant;
    use crate::types::PlanTier;
    use sqlx::PgPool;

    async fn checkout(pool: &PgPool, external_id: &str) -> crate::auth::tenant::TenantContext {
        let tenant = provision_test_tenant(pool, external_id).await;
        let mut conn = pool.acquire().await.unwrap();
        let applied = apply_event(
            &mut Organizations::new(&mut conn),
            &BillingEvent::CheckoutCompleted {
                organization_id: tenant.org_id,
                plan: PlanTier::Basic,
                subscription_ref: format!("sub_{external_id}"),
                customer_ref: Some(format!("cus_{external_id}")),
            },
        )
        .await
        .unwrap();
        assert!(applied);
        tenant
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_checkout_activates_plan(pool: PgPool) {
        let tenant = checkout(&pool, "billing-checkout").await;
        let mut conn = pool.acquire().await.unwrap();

        let org = Organizations::new(&mut conn).get_by_id(tenant.org_id).await.unwrap().unwrap();
        assert_eq!(org.plan, PlanTier::Basic);
        assert_eq!(org.subscription_status, SubscriptionStatus::Active);
        assert_eq!(org.trial_ends_at, None);
        assert_eq!(org.billing_customer_id.as_deref(), Some("cus_billing-checkout"));
        assert_eq!(org.billing_subscription_id.as_deref(), Some("sub_billing-checkout"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_subscription_updates_map_status_and_plan(pool: PgPool) {
        let tenant = checkout(&pool, "billing-update").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut orgs = Organizations::new(&mut conn);

        for (provider_status, expected) in [
            ("past_due", SubscriptionStatus::PastDue),
            ("unpaid", SubscriptionStatus::Expired),
            ("canceled", SubscriptionStatus::Cancelled),
            ("active", SubscriptionStatus::Active),
        ] {
            apply_event(
                &mut orgs,
                &BillingEvent::SubscriptionUpdated {
                    organization_id: tenant.org_id,
                    status: provider_status.to_string(),
                    plan: None,
                },
            )
            .await
            .unwrap();
            let org = orgs.get_by_id(tenant.org_id).await.unwrap().unwrap();
            assert_eq!(org.subscription_status, expected, "{provider_status}");
            assert_eq!(org.plan, PlanTier::Basic);
        }

        apply_event(
            &mut orgs,
            &BillingEvent::SubscriptionUpdated {
                organization_id: tenant.org_id,
                status: "active".to_string(),
                plan: Some(PlanTier::Pro),
            },
        )
        .await
        .unwrap();
        assert_eq!(orgs.get_by_id(tenant.org_id).await.unwrap().unwrap().plan, PlanTier::Pro);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deletion_and_failed_invoice(pool: PgPool) {
        let tenant = checkout(&pool, "billing-end").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut orgs = Organizations::new(&mut conn);

        let failed = BillingEvent::InvoicePaymentFailed {
            subscription_ref: "sub_billing-end".to_string(),
        };
        assert!(apply_event(&mut orgs, &failed).await.unwrap());
        assert_eq!(
            orgs.get_by_id(tenant.org_id).await.unwrap().unwrap().subscription_status,
            SubscriptionStatus::PastDue
        );

        let deleted = BillingEvent::SubscriptionDeleted {
            subscription_ref: "sub_billing-end".to_string(),
        };
        assert!(apply_event(&mut orgs, &deleted).await.unwrap());
        let org = orgs.get_by_id(tenant.org_id).await.unwrap().unwrap();
        assert_eq!(org.plan, PlanTier::Cancelled);
        assert_eq!(org.subscription_status, SubscriptionStatus::Cancelled);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_subscription_is_ignored(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let applied = apply_event(
            &mut Organizations::new(&mut conn),
            &BillingEvent::SubscriptionDeleted {
                subscription_ref: "sub_nobody".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(!applied);
    }
}
