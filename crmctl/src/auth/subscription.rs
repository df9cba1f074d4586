//! Subscription gate: decides whether a tenant may write.
//!
//! Reads are never gated. Every mutating operation on contacts, deals, tasks, activities and
//! CSV import checks [`require_active_subscription`] after the tenant is resolved and before
//! anything is written; handlers get this for free by extracting [`ActiveTenant`].

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};

use super::tenant::TenantContext;
use crate::{
    AppState,
    errors::{Error, Result},
    types::SubscriptionStatus,
};

/// A tenant is expired when its subscription is `expired`, or it is still trialing and the
/// trial end is strictly in the past. A trial with no end date never expires on its own.
pub fn is_expired(status: SubscriptionStatus, trial_ends_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match status {
        SubscriptionStatus::Expired => true,
        SubscriptionStatus::Trialing => trial_ends_at.is_some_and(|ends| now > ends),
        SubscriptionStatus::Active | SubscriptionStatus::PastDue | SubscriptionStatus::Cancelled => false,
    }
}

pub fn require_active_subscription(tenant: &TenantContext) -> Result<()> {
    if tenant.is_expired {
        tracing::info!(org_id = %tenant.org_id, "Write refused: subscription expired");
        return Err(Error::SubscriptionExpired);
    }
    Ok(())
}

/// A resolved tenant that has passed the subscription gate.
#[derive(Debug, Clone)]
pub struct ActiveTenant(pub TenantContext);

impl FromRequestParts<AppState> for ActiveTenant {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let tenant = TenantContext::from_request_parts(parts, state).await?;
        require_active_subscription(&tenant)?;
        Ok(ActiveTenant(tenant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn trial_expires_strictly_after_its_end() {
        let end = ts("2025-06-01T12:00:00Z");
        let trialing = SubscriptionStatus::Trialing;

        assert!(!is_expired(trialing, Some(end), end - Duration::seconds(1)));
        assert!(!is_expired(trialing, Some(end), end));
        assert!(is_expired(trialing, Some(end), end + Duration::nanoseconds(1)));
        assert!(is_expired(trialing, Some(end), end + Duration::days(3)));
    }

    #[test]
    fn expired_status_is_always_expired() {
        let now = ts("2025-06-01T12:00:00Z");
        assert!(is_expired(SubscriptionStatus::Expired, None, now));
        assert!(is_expired(SubscriptionStatus::Expired, Some(now + Duration::days(10)), now));
    }

    #[test]
    fn paying_and_lapsed_states_are_not_expired() {
        let now = ts("2025-06-01T12:00:00Z");
        let long_ago = Some(now - Duration::days(365));
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Cancelled,
        ] {
            assert!(!is_expired(status, long_ago, now), "{status:?}");
        }
    }

    #[test]
    fn trial_without_end_date_does_not_expire() {
        assert!(!is_expired(SubscriptionStatus::Trialing, None, Utc::now()));
    }

    #[test]
    fn guard_signals_subscription_expired() {
        let mut tenant = TenantContext::for_tests();
        assert!(require_active_subscription(&tenant).is_ok());

        tenant.is_expired = true;
        assert!(matches!(
            require_active_subscription(&tenant),
            Err(Error::SubscriptionExpired)
        ));
    }
}
