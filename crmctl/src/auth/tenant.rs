//! Identity resolution: from a verified external identity to the tenant a request acts for.
//!
//! The first time an identity is seen, a new organization is provisioned for it: the
//! organization itself on a trial, the identity's user as its admin, and the default pipeline.
//! All three rows are written in one transaction, so a partially provisioned tenant is never
//! visible. Two concurrent first logins for the same identity are serialized by the unique
//! `users.external_id` constraint: the loser rolls back and reads the winner's tenant.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;
use utoipa::ToSchema;

use super::{
    identity::{VerifiedIdentity, bearer_token},
    subscription::is_expired,
};
use crate::{
    AppState,
    config::TrialConfig,
    db::{
        errors::DbError,
        handlers::{Organizations, PipelineStages, Users},
        models::{organizations::OrganizationCreateDBRequest, users::UserCreateDBRequest, users::UserWithOrganization},
    },
    email::{EmailKind, Recipient},
    errors::{Error, Result},
    types::{OrganizationId, PlanTier, Role, SubscriptionStatus, UserId},
};

/// The tenant a request acts for.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub org_id: OrganizationId,
    pub role: Role,
    pub user_name: String,
    pub user_email: String,
    pub plan: PlanTier,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
}

impl TenantContext {
    fn from_row(row: UserWithOrganization, now: DateTime<Utc>) -> Self {
        Self {
            is_expired: is_expired(row.subscription_status, row.trial_ends_at, now),
            user_id: row.user_id,
            org_id: row.organization_id,
            role: row.role,
            user_name: row.name,
            user_email: row.email,
            plan: row.plan,
            subscription_status: row.subscription_status,
            trial_ends_at: row.trial_ends_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<()> {
        if !self.is_admin() {
            return Err(Error::Forbidden {
                message: "Only organization admins can do this".to_string(),
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            user_id: uuid::Uuid::new_v4(),
            org_id: uuid::Uuid::new_v4(),
            role: Role::Admin,
            user_name: "test".to_string(),
            user_email: "test@example.com".to_string(),
            plan: PlanTier::Trial,
            subscription_status: SubscriptionStatus::Trialing,
            trial_ends_at: None,
            is_expired: false,
        }
    }
}

/// Outcome of resolving an identity.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub context: TenantContext,
    /// True when this call created the organization
    pub provisioned: bool,
    pub organization_name: String,
}

/// Display name derived from the email local part.
pub fn display_name(email: Option<&str>) -> String {
    email
        .and_then(|e| e.split('@').next())
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .unwrap_or("User")
        .to_string()
}

/// Resolve an identity to its tenant, provisioning a new one on first contact.
#[instrument(skip_all, fields(subject = %identity.subject), err)]
pub async fn resolve_tenant(pool: &PgPool, identity: &VerifiedIdentity, trial: &TrialConfig) -> Result<Resolution> {
    let now = Utc::now();

    if let Some(existing) = lookup(pool, &identity.subject, now).await? {
        return Ok(existing);
    }

    if let Some(provisioned) = provision(pool, identity, trial, now).await? {
        metrics::counter!("crmctl_orgs_provisioned_total").increment(1);
        tracing::info!(org_id = %provisioned.context.org_id, "Provisioned new organization");
        return Ok(provisioned);
    }

    // Lost a provisioning race: another request mapped this identity first
    tracing::debug!("Concurrent provisioning detected, reading existing tenant");
    lookup(pool, &identity.subject, now).await?.ok_or_else(|| Error::Internal {
        operation: "resolve tenant after concurrent provisioning".to_string(),
    })
}

async fn lookup(pool: &PgPool, subject: &str, now: DateTime<Utc>) -> Result<Option<Resolution>> {
    let mut conn = pool.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let row = Users::new(&mut conn).find_with_organization(subject).await?;
    Ok(row.map(|row| Resolution {
        context: TenantContext::from_row(row, now),
        provisioned: false,
        organization_name: String::new(),
    }))
}

/// Create organization, admin user and default pipeline atomically.
/// Returns `None` if the identity was mapped concurrently.
async fn provision(
    pool: &PgPool,
    identity: &VerifiedIdentity,
    trial: &TrialConfig,
    now: DateTime<Utc>,
) -> Result<Option<Resolution>> {
    let email = identity.email.clone().unwrap_or_default();
    let name = display_name(identity.email.as_deref());
    let trial_ends_at = now + Duration::days(i64::from(trial.length_days));

    let mut tx = pool.begin().await.map_err(|e| Error::Database(e.into()))?;

    let org = Organizations::new(&mut tx)
        .create(&OrganizationCreateDBRequest {
            name: format!("{name}'s Organization"),
            trial_ends_at,
        })
        .await?;

    // The first user of an organization is always its admin
    let user = Users::new(&mut tx)
        .create_if_absent(&UserCreateDBRequest {
            organization_id: org.id,
            external_id: identity.subject.clone(),
            email,
            name,
            role: Role::Admin,
        })
        .await?;

    let Some(user) = user else {
        tx.rollback().await.map_err(|e| Error::Database(DbError::from(e)))?;
        return Ok(None);
    };

    PipelineStages::new(&mut tx, org.id).create_defaults().await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Some(Resolution {
        context: TenantContext {
            user_id: user.id,
            org_id: org.id,
            role: user.role,
            user_name: user.name,
            user_email: user.email,
            plan: org.plan,
            subscription_status: org.subscription_status,
            trial_ends_at: org.trial_ends_at,
            is_expired: false,
        },
        provisioned: true,
        organization_name: org.name,
    }))
}

impl FromRequestParts<AppState> for TenantContext {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(tenant) = parts.extensions.get::<TenantContext>() {
            return Ok(tenant.clone());
        }

        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let token = bearer_token(header)?;
        let identity = state.identity.verify(token).await?;
        let resolution = resolve_tenant(&state.db, &identity, &state.config.trial).await?;

        if resolution.provisioned && !resolution.context.user_email.is_empty() {
            state.email.send_in_background(
                EmailKind::Welcome {
                    organization: resolution.organization_name.clone(),
                    trial_days: state.config.trial.length_days,
                },
                Recipient {
                    email: resolution.context.user_email.clone(),
                    name: resolution.context.user_name.clone(),
                },
            );
        }

        parts.extensions.insert(resolution.context.clone());
        Ok(resolution.context)
    }
}

/// A resolved tenant whose user is an organization admin.
#[derive(Debug, Clone)]
pub struct AdminTenant(pub TenantContext);

impl FromRequestParts<AppState> for AdminTenant {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let tenant = TenantContext::from_request_parts(parts, state).await?;
        tenant.require_admin()?;
        Ok(AdminTenant(tenant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::PipelineStages;

    fn identity(subject: &str, email: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: subject.to_string(),
            email: email.map(str::to_string),
            permissions: vec![],
        }
    }

    async fn count(pool: &PgPool, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
    }

    #[test]
    fn test_display_name_from_email_local_part() {
        assert_eq!(display_name(Some("ada.lovelace@example.com")), "ada.lovelace");
        assert_eq!(display_name(Some("@example.com")), "User");
        assert_eq!(display_name(None), "User");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_first_contact_provisions_admin_on_trial(pool: PgPool) {
        let trial = TrialConfig::default();
        let resolution = resolve_tenant(&pool, &identity("ext|abc", Some("a@b.com")), &trial).await.unwrap();

        assert!(resolution.provisioned);
        let ctx = resolution.context;
        assert_eq!(ctx.role, Role::Admin);
        assert_eq!(ctx.plan, PlanTier::Trial);
        assert_eq!(ctx.subscription_status, SubscriptionStatus::Trialing);
        assert!(!ctx.is_expired);
        assert_eq!(ctx.user_name, "a");
        assert_eq!(resolution.organization_name, "a's Organization");

        let ends = ctx.trial_ends_at.unwrap();
        let expected = Utc::now() + Duration::days(30);
        assert!((expected - ends).num_seconds().abs() < 60);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(PipelineStages::new(&mut conn, ctx.org_id).list().await.unwrap().len(), 6);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sequential_resolution_is_idempotent(pool: PgPool) {
        let trial = TrialConfig::default();
        let who = identity("ext|again", Some("again@b.com"));

        let first = resolve_tenant(&pool, &who, &trial).await.unwrap();
        let second = resolve_tenant(&pool, &who, &trial).await.unwrap();

        assert!(first.provisioned);
        assert!(!second.provisioned);
        assert_eq!(first.context.org_id, second.context.org_id);
        assert_eq!(first.context.user_id, second.context.user_id);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM organizations").await, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_first_logins_provision_once(pool: PgPool) {
        let trial = TrialConfig::default();
        let who = identity("ext|race", Some("race@b.com"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (pool, who, trial) = (pool.clone(), who.clone(), trial.clone());
                tokio::spawn(async move { resolve_tenant(&pool, &who, &trial).await })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let org_ids: std::collections::HashSet<_> = results.iter().map(|r| r.as_ref().unwrap().context.org_id).collect();
        assert_eq!(org_ids.len(), 1);
        assert_eq!(results.iter().filter(|r| r.as_ref().unwrap().provisioned).count(), 1);

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM organizations").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM pipeline_stages").await, 6);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_expired_trial_is_flagged_on_lookup(pool: PgPool) {
        let trial = TrialConfig::default();
        let who = identity("ext|late", Some("late@b.com"));
        let ctx = resolve_tenant(&pool, &who, &trial).await.unwrap().context;

        sqlx::query("UPDATE organizations SET trial_ends_at = NOW() - INTERVAL '1 day' WHERE id = $1")
            .bind(ctx.org_id)
            .execute(&pool)
            .await
            .unwrap();

        let again = resolve_tenant(&pool, &who, &trial).await.unwrap().context;
        assert!(again.is_expired);
        assert_eq!(again.subscription_status, SubscriptionStatus::Trialing);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_email_still_provisions(pool: PgPool) {
        let ctx = resolve_tenant(&pool, &identity("ext|noemail", None), &TrialConfig::default())
            .await
            .unwrap()
            .context;
        assert_eq!(ctx.user_name, "User");
        assert_eq!(ctx.user_email, "");
    }
}
