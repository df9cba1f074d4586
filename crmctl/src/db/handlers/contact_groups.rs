//! Database repository for contact groups.

use crate::db::{
    errors::{DbError, Result},
    models::tags::{ContactGroupCreateDBRequest, ContactGroupDBResponse, ContactGroupUpdateDBRequest},
};
use crate::types::{GroupId, OrganizationId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const GROUP_COLUMNS: &str = r#"
    g.id, g.organization_id, g.name, g.color, g.created_at, g.updated_at,
    (SELECT COUNT(*) FROM contacts c WHERE c.group_id = g.id AND NOT c.is_deleted) AS contact_count
"#;

pub struct ContactGroups<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> ContactGroups<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn list(&mut self) -> Result<Vec<ContactGroupDBResponse>> {
        let groups = sqlx::query_as::<_, ContactGroupDBResponse>(&format!(
            "SELECT {GROUP_COLUMNS} FROM contact_groups g WHERE g.organization_id = $1 ORDER BY g.name"
        ))
        .bind(self.org_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(groups)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), group_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: GroupId) -> Result<Option<ContactGroupDBResponse>> {
        let group = sqlx::query_as::<_, ContactGroupDBResponse>(&format!(
            "SELECT {GROUP_COLUMNS} FROM contact_groups g WHERE g.id = $1 AND g.organization_id = $2"
        ))
        .bind(id)
        .bind(self.org_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(group)
    }

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), name = %request.name), err)]
    pub async fn create(&mut self, request: &ContactGroupCreateDBRequest) -> Result<ContactGroupDBResponse> {
        let group = sqlx::query_as::<_, ContactGroupDBResponse>(
            r#"
            INSERT INTO contact_groups (id, organization_id, name, color)
            VALUES ($1, $2, $3, $4)
            RETURNING id, organization_id, name, color, created_at, updated_at, 0::BIGINT AS contact_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.org_id)
        .bind(&request.name)
        .bind(request.color.as_deref())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(group)
    }

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), group_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: GroupId, request: &ContactGroupUpdateDBRequest) -> Result<ContactGroupDBResponse> {
        let updated = sqlx::query(
            r#"
            UPDATE contact_groups SET
                name = COALESCE($3, name),
                color = CASE WHEN $4 THEN $5 ELSE color END,
                updated_at = NOW()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .bind(request.name.as_deref())
        .bind(request.color.is_some())
        .bind(request.color.clone().flatten())
        .execute(&mut *self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    /// Delete a group. Member contacts lose their group reference.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), group_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: GroupId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contact_groups WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(self.org_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
