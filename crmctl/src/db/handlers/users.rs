//! Database repository for users.

use crate::db::{
    errors::Result,
    models::users::{UserCreateDBRequest, UserDBResponse, UserWithOrganization},
};
use crate::types::{OrganizationId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a user unless one already exists for the same external identity.
    ///
    /// Returns `None` when the identity is already mapped, which is how a concurrent first login
    /// loses the provisioning race.
    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&request.organization_id)), err)]
    pub async fn create_if_absent(&mut self, request: &UserCreateDBRequest) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, organization_id, external_id, email, name, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.organization_id)
        .bind(&request.external_id)
        .bind(&request.email)
        .bind(&request.name)
        .bind(request.role)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(user)
    }

    /// Look up an active user by external identity, together with their organization's
    /// subscription state.
    #[instrument(skip(self, external_id), err)]
    pub async fn find_with_organization(&mut self, external_id: &str) -> Result<Option<UserWithOrganization>> {
        let row = sqlx::query_as::<_, UserWithOrganization>(
            r#"
            SELECT
                u.id AS user_id,
                u.organization_id,
                u.role,
                u.name,
                u.email,
                o.plan,
                o.subscription_status,
                o.trial_ends_at
            FROM users u
            JOIN organizations o ON o.id = u.organization_id
            WHERE u.external_id = $1 AND u.is_active
            "#,
        )
        .bind(external_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// A user of the given organization. Users of other organizations are not visible.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id), user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_in_organization(&mut self, org_id: OrganizationId, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(org_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id)), err)]
    pub async fn list_members(&mut self, org_id: OrganizationId) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(
            "SELECT * FROM users WHERE organization_id = $1 ORDER BY role, created_at",
        )
        .bind(org_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id)), err)]
    pub async fn list_active_admins(&mut self, org_id: OrganizationId) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(
            "SELECT * FROM users WHERE organization_id = $1 AND role = 'admin' AND is_active ORDER BY created_at",
        )
        .bind(org_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }
}
