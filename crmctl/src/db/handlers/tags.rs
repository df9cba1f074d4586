//! Database repository for contact tags.

use crate::db::{errors::Result, models::tags::TagDBResponse};
use crate::types::{OrganizationId, TagId, abbrev_uuid};
use sqlx::{PgConnection, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

const TAG_COLUMNS: &str = r#"
    t.id, t.organization_id, t.name, t.created_at,
    (SELECT COUNT(*) FROM contact_tags ct
        JOIN contacts c ON c.id = ct.contact_id
        WHERE ct.tag_id = t.id AND NOT c.is_deleted) AS contact_count
"#;

pub struct Tags<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> Tags<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn list(&mut self) -> Result<Vec<TagDBResponse>> {
        let tags = sqlx::query_as::<_, TagDBResponse>(&format!(
            "SELECT {TAG_COLUMNS} FROM tags t WHERE t.organization_id = $1 ORDER BY t.name"
        ))
        .bind(self.org_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(tags)
    }

    /// Create a tag. A name already used in this organization is a unique violation.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn create(&mut self, name: &str) -> Result<TagDBResponse> {
        let tag = sqlx::query_as::<_, TagDBResponse>(
            r#"
            INSERT INTO tags (id, organization_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, organization_id, name, created_at, 0::BIGINT AS contact_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.org_id)
        .bind(name)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(tag)
    }

    /// Remove a tag and its links. Contacts themselves are untouched.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), tag_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: TagId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(self.org_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Resolve tag names to ids, creating the ones that do not exist yet.
    ///
    /// Names are trimmed; blanks and duplicates are dropped.
    #[instrument(skip(self, names), fields(org_id = %abbrev_uuid(&self.org_id), count = names.len()), err)]
    pub async fn resolve(&mut self, names: &[String]) -> Result<Vec<TagId>> {
        let mut cleaned: Vec<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
        cleaned.sort_unstable();
        cleaned.dedup();
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::new("INSERT INTO tags (id, organization_id, name) ");
        query.push_values(cleaned.iter(), |mut row, name| {
            row.push_bind(Uuid::new_v4()).push_bind(self.org_id).push_bind(*name);
        });
        // The no-op update makes RETURNING include rows that already existed
        query.push(" ON CONFLICT (organization_id, name) DO UPDATE SET name = EXCLUDED.name RETURNING id");

        let ids = query.build_query_scalar::<TagId>().fetch_all(&mut *self.db).await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use crate::test_utils::provision_test_tenant;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_resolve_reuses_existing_tags(pool: PgPool) {
        let tenant = provision_test_tenant(&pool, "ext|tags-resolve").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tags::new(&mut conn, tenant.org_id);

        let existing = repo.create("vip").await.unwrap();
        let ids = repo
            .resolve(&["vip".to_string(), " lead ".to_string(), "vip".to_string(), "".to_string()])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&existing.id));

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["lead", "vip"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_name_is_unique_violation(pool: PgPool) {
        let tenant = provision_test_tenant(&pool, "ext|tags-dup").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tags::new(&mut conn, tenant.org_id);

        repo.create("vip").await.unwrap();
        let err = repo.create("vip").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(err.constraint(), Some("tags_name_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_same_name_in_two_organizations(pool: PgPool) {
        let a = provision_test_tenant(&pool, "ext|tags-a").await;
        let b = provision_test_tenant(&pool, "ext|tags-b").await;
        let mut conn = pool.acquire().await.unwrap();

        let tag_a = Tags::new(&mut conn, a.org_id).create("vip").await.unwrap();
        let tag_b = Tags::new(&mut conn, b.org_id).create("vip").await.unwrap();
        assert_ne!(tag_a.id, tag_b.id);

        assert!(!Tags::new(&mut conn, b.org_id).delete(tag_a.id).await.unwrap());
        assert!(Tags::new(&mut conn, a.org_id).delete(tag_a.id).await.unwrap());
    }
}
