//! Database repository for contacts.
//!
//! Deleting a contact is soft: the row stays, flagged `is_deleted`, and every read in this module
//! skips it.

use crate::db::{
    errors::{DbError, Result},
    handlers::{
        Tags,
        repository::{Referenced, Repository, contains_pattern, ensure_reference},
    },
    models::contacts::{ContactCreateDBRequest, ContactDBResponse, ContactSort, ContactUpdateDBRequest},
};
use crate::types::{ContactId, ContactStatus, GroupId, OrganizationId, SortOrder, TagId, abbrev_uuid};
use sqlx::{Connection, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

const CONTACT_COLUMNS: &str = r#"
    c.id, c.organization_id, c.name, c.email, c.phone, c.company, c.job_title, c.status,
    c.source, c.notes, c.group_id, c.created_by, c.created_at, c.updated_at,
    ARRAY(
        SELECT t.name FROM contact_tags ct JOIN tags t ON t.id = ct.tag_id
        WHERE ct.contact_id = c.id ORDER BY t.name
    ) AS tags
"#;

/// Filter for listing contacts
#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<ContactStatus>,
    pub source: Option<String>,
    pub group_id: Option<GroupId>,
    /// Only contacts carrying a tag with exactly this name
    pub tag: Option<String>,
    /// Case-insensitive substring over name, email, company and phone
    pub search: Option<String>,
    pub sort: ContactSort,
    pub order: SortOrder,
}

impl ContactFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    fn push_predicate(&self, query: &mut QueryBuilder<'_, Postgres>, org_id: OrganizationId) {
        query.push(" WHERE c.organization_id = ");
        query.push_bind(org_id);
        query.push(" AND NOT c.is_deleted");

        if let Some(status) = self.status {
            query.push(" AND c.status = ");
            query.push_bind(status);
        }
        if let Some(source) = &self.source {
            query.push(" AND c.source = ");
            query.push_bind(source.clone());
        }
        if let Some(group_id) = self.group_id {
            query.push(" AND c.group_id = ");
            query.push_bind(group_id);
        }
        if let Some(tag) = &self.tag {
            query.push(
                " AND EXISTS (SELECT 1 FROM contact_tags ct JOIN tags t ON t.id = ct.tag_id WHERE ct.contact_id = c.id AND t.name = ",
            );
            query.push_bind(tag.clone());
            query.push(")");
        }
        if let Some(search) = &self.search {
            let pattern = contains_pattern(search);
            query.push(" AND (LOWER(c.name) LIKE ");
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\' OR LOWER(c.email) LIKE ");
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\' OR LOWER(c.company) LIKE ");
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\' OR c.phone LIKE ");
            query.push_bind(pattern);
            query.push(" ESCAPE '\\')");
        }
    }
}

pub struct Contacts<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> Contacts<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    /// Set the status of a live contact. Returns false if it is missing or deleted.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), contact_id = %abbrev_uuid(&id)), err)]
    pub async fn set_status(&mut self, id: ContactId, status: ContactStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contacts SET status = $3, updated_at = NOW()
            WHERE id = $1 AND organization_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .bind(status)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_tags(db: &mut PgConnection, contact_id: ContactId, tag_ids: &[TagId]) -> Result<()> {
        sqlx::query("DELETE FROM contact_tags WHERE contact_id = $1")
            .bind(contact_id)
            .execute(&mut *db)
            .await?;

        if tag_ids.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::new("INSERT INTO contact_tags (contact_id, tag_id) ");
        query.push_values(tag_ids.iter(), |mut row, tag_id| {
            row.push_bind(contact_id).push_bind(*tag_id);
        });
        query.build().execute(&mut *db).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Contacts<'c> {
    type CreateRequest = ContactCreateDBRequest;
    type UpdateRequest = ContactUpdateDBRequest;
    type Response = ContactDBResponse;
    type Id = ContactId;
    type Filter = ContactFilter;

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let org_id = self.org_id;
        let mut tx = self.db.begin().await?;

        ensure_reference(&mut tx, Referenced::Group, request.group_id, org_id, "groupId").await?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO contacts (
                id, organization_id, name, email, phone, company, job_title,
                status, source, notes, group_id, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(request.name.as_deref())
        .bind(request.email.as_deref())
        .bind(request.phone.as_deref())
        .bind(request.company.as_deref())
        .bind(request.job_title.as_deref())
        .bind(request.status)
        .bind(request.source.as_deref())
        .bind(request.notes.as_deref())
        .bind(request.group_id)
        .bind(request.created_by)
        .execute(&mut *tx)
        .await?;

        if !request.tags.is_empty() {
            let tag_ids = Tags::new(&mut tx, org_id).resolve(&request.tags).await?;
            Self::replace_tags(&mut tx, id, &tag_ids).await?;
        }

        let contact = sqlx::query_as::<_, ContactDBResponse>(&format!("SELECT {CONTACT_COLUMNS} FROM contacts c WHERE c.id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(contact)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), contact_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let contact = sqlx::query_as::<_, ContactDBResponse>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts c WHERE c.id = $1 AND c.organization_id = $2 AND NOT c.is_deleted"
        ))
        .bind(id)
        .bind(self.org_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(contact)
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id), limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(format!("SELECT {CONTACT_COLUMNS} FROM contacts c"));
        filter.push_predicate(&mut query, self.org_id);

        query.push(format!(
            " ORDER BY {} {} NULLS LAST, c.id",
            filter.sort.column(),
            filter.order.as_sql()
        ));
        query.push(" LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let contacts = query
            .build_query_as::<ContactDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(contacts)
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM contacts c");
        filter.push_predicate(&mut query, self.org_id);

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), contact_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let org_id = self.org_id;
        let current = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        if request.is_empty() {
            return Ok(current);
        }

        let name_after = request.name.as_ref().map_or(current.name.is_some(), Option::is_some);
        let email_after = request.email.as_ref().map_or(current.email.is_some(), Option::is_some);
        if !name_after && !email_after {
            return Err(DbError::InvalidValue {
                field: "name",
                message: "a contact needs a name or an email",
            });
        }

        let mut tx = self.db.begin().await?;

        if let Some(group_id) = request.group_id {
            ensure_reference(&mut tx, Referenced::Group, group_id, org_id, "groupId").await?;
        }

        // For each nullable column: $n says whether to touch it, $n+1 is the new value
        sqlx::query(
            r#"
            UPDATE contacts SET
                name = CASE WHEN $3 THEN $4 ELSE name END,
                email = CASE WHEN $5 THEN $6 ELSE email END,
                phone = CASE WHEN $7 THEN $8 ELSE phone END,
                company = CASE WHEN $9 THEN $10 ELSE company END,
                job_title = CASE WHEN $11 THEN $12 ELSE job_title END,
                status = COALESCE($13, status),
                source = CASE WHEN $14 THEN $15 ELSE source END,
                notes = CASE WHEN $16 THEN $17 ELSE notes END,
                group_id = CASE WHEN $18 THEN $19 ELSE group_id END,
                updated_at = NOW()
            WHERE id = $1 AND organization_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(request.name.is_some())
        .bind(request.name.clone().flatten())
        .bind(request.email.is_some())
        .bind(request.email.clone().flatten())
        .bind(request.phone.is_some())
        .bind(request.phone.clone().flatten())
        .bind(request.company.is_some())
        .bind(request.company.clone().flatten())
        .bind(request.job_title.is_some())
        .bind(request.job_title.clone().flatten())
        .bind(request.status)
        .bind(request.source.is_some())
        .bind(request.source.clone().flatten())
        .bind(request.notes.is_some())
        .bind(request.notes.clone().flatten())
        .bind(request.group_id.is_some())
        .bind(request.group_id.flatten())
        .execute(&mut *tx)
        .await?;

        if let Some(tags) = &request.tags {
            let tag_ids = Tags::new(&mut tx, org_id).resolve(tags).await?;
            Self::replace_tags(&mut tx, id, &tag_ids).await?;
        }

        tx.commit().await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), contact_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contacts SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND organization_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
