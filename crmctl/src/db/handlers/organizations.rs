//! Database repository for organizations.
//!
//! Organizations are the tenant root, so this repository is addressed by organization id (or by
//! the payment provider's subscription reference) rather than being bound to one tenant.

use crate::db::{
    errors::{DbError, Result},
    models::organizations::{OrganizationCreateDBRequest, OrganizationDBResponse},
};
use crate::types::{OrganizationId, PlanTier, SubscriptionStatus, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Organizations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Organizations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a new organization on the trial plan.
    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub async fn create(&mut self, request: &OrganizationCreateDBRequest) -> Result<OrganizationDBResponse> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(
            r#"
            INSERT INTO organizations (id, name, plan, subscription_status, trial_ends_at)
            VALUES ($1, $2, 'trial', 'trialing', $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(request.trial_ends_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(org)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: OrganizationId) -> Result<Option<OrganizationDBResponse>> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(org)
    }

    #[instrument(skip(self, name), fields(org_id = %abbrev_uuid(&id)), err)]
    pub async fn update_name(&mut self, id: OrganizationId, name: &str) -> Result<OrganizationDBResponse> {
        sqlx::query_as::<_, OrganizationDBResponse>(
            "UPDATE organizations SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Remember the payment provider's customer reference for later checkouts and portal sessions.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&id)), err)]
    pub async fn set_billing_customer(&mut self, id: OrganizationId, customer_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE organizations SET billing_customer_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(customer_id)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// A checkout finished: the organization is now on `plan`, active, and no longer on trial.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&id)), err)]
    pub async fn complete_checkout(
        &mut self,
        id: OrganizationId,
        plan: PlanTier,
        subscription_ref: &str,
        customer_ref: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE organizations SET
                plan = $2,
                subscription_status = 'active',
                billing_subscription_id = $3,
                billing_customer_id = COALESCE($4, billing_customer_id),
                trial_ends_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(plan)
        .bind(subscription_ref)
        .bind(customer_ref)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a provider-reported status, and the plan when the price maps to one we know.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&id)), err)]
    pub async fn update_subscription(
        &mut self,
        id: OrganizationId,
        status: SubscriptionStatus,
        plan: Option<PlanTier>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE organizations SET
                subscription_status = $2,
                plan = COALESCE($3, plan),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(plan)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    pub async fn cancel_subscription(&mut self, subscription_ref: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE organizations SET
                plan = 'cancelled',
                subscription_status = 'cancelled',
                updated_at = NOW()
            WHERE billing_subscription_id = $1
            "#,
        )
        .bind(subscription_ref)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    pub async fn mark_past_due(&mut self, subscription_ref: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE organizations SET subscription_status = 'past_due', updated_at = NOW() WHERE billing_subscription_id = $1",
        )
        .bind(subscription_ref)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Organizations still on a trial that has an end date.
    #[instrument(skip(self), err)]
    pub async fn list_trialing(&mut self) -> Result<Vec<OrganizationDBResponse>> {
        let orgs = sqlx::query_as::<_, OrganizationDBResponse>(
            "SELECT * FROM organizations WHERE subscription_status = 'trialing' AND trial_ends_at IS NOT NULL ORDER BY trial_ends_at",
        )
        .fetch_all(&mut *self.db)
        .await?;

        Ok(orgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sqlx::PgPool;

    async fn create_org(pool: &PgPool) -> OrganizationDBResponse {
        let mut conn = pool.acquire().await.unwrap();
        Organizations::new(&mut conn)
            .create(&OrganizationCreateDBRequest {
                name: "Acme".to_string(),
                trial_ends_at: Utc::now() + Duration::days(30),
            })
            .await
            .unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_starts_on_trial(pool: PgPool) {
        let org = create_org(&pool).await;
        assert_eq!(org.plan, PlanTier::Trial);
        assert_eq!(org.subscription_status, SubscriptionStatus::Trialing);
        assert!(org.trial_ends_at.is_some());
        assert!(org.billing_customer_id.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_checkout_then_cancel(pool: PgPool) {
        let org = create_org(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Organizations::new(&mut conn);

        assert!(repo.complete_checkout(org.id, PlanTier::Pro, "sub_1", Some("cus_1")).await.unwrap());
        let after = repo.get_by_id(org.id).await.unwrap().unwrap();
        assert_eq!(after.plan, PlanTier::Pro);
        assert_eq!(after.subscription_status, SubscriptionStatus::Active);
        assert_eq!(after.billing_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(after.billing_customer_id.as_deref(), Some("cus_1"));
        assert!(after.trial_ends_at.is_none());

        assert!(repo.mark_past_due("sub_1").await.unwrap());
        let after = repo.get_by_id(org.id).await.unwrap().unwrap();
        assert_eq!(after.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(after.plan, PlanTier::Pro);

        assert!(repo.cancel_subscription("sub_1").await.unwrap());
        let after = repo.get_by_id(org.id).await.unwrap().unwrap();
        assert_eq!(after.plan, PlanTier::Cancelled);
        assert_eq!(after.subscription_status, SubscriptionStatus::Cancelled);

        assert!(!repo.cancel_subscription("sub_unknown").await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_subscription_keeps_plan_when_price_unknown(pool: PgPool) {
        let org = create_org(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Organizations::new(&mut conn);

        repo.complete_checkout(org.id, PlanTier::Basic, "sub_2", None).await.unwrap();
        repo.update_subscription(org.id, SubscriptionStatus::Active, None).await.unwrap();
        assert_eq!(repo.get_by_id(org.id).await.unwrap().unwrap().plan, PlanTier::Basic);

        repo.update_subscription(org.id, SubscriptionStatus::Active, Some(PlanTier::Pro))
            .await
            .unwrap();
        assert_eq!(repo.get_by_id(org.id).await.unwrap().unwrap().plan, PlanTier::Pro);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_name_of_missing_org(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let err = Organizations::new(&mut conn)
            .update_name(Uuid::new_v4(), "Nope")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }
}
