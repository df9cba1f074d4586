//! Database repository for the activity timeline.

use crate::db::{
    errors::Result,
    handlers::repository::{Referenced, ensure_reference},
    models::activities::{ActivityCreateDBRequest, ActivityDBResponse},
};
use crate::types::{ActivityId, ActivityType, ContactId, DealId, OrganizationId, abbrev_uuid};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

const ACTIVITY_SELECT: &str = r#"
    SELECT a.id, a.organization_id, a.type AS activity_type, a.description,
           a.contact_id, c.name AS contact_name,
           a.deal_id, d.title AS deal_title,
           a.metadata, a.created_by, u.name AS created_by_name, a.created_at
    FROM activities a
    LEFT JOIN contacts c ON c.id = a.contact_id
    LEFT JOIN deals d ON d.id = a.deal_id
    LEFT JOIN users u ON u.id = a.created_by
"#;

/// Filter for listing activities, newest first
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub skip: i64,
    pub limit: i64,
    pub contact_id: Option<ContactId>,
    pub deal_id: Option<DealId>,
    pub activity_type: Option<ActivityType>,
}

impl ActivityFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    fn push_predicate(&self, query: &mut QueryBuilder<'_, Postgres>, org_id: OrganizationId) {
        query.push(" WHERE a.organization_id = ");
        query.push_bind(org_id);

        if let Some(contact_id) = self.contact_id {
            query.push(" AND a.contact_id = ");
            query.push_bind(contact_id);
        }
        if let Some(deal_id) = self.deal_id {
            query.push(" AND a.deal_id = ");
            query.push_bind(deal_id);
        }
        if let Some(activity_type) = self.activity_type {
            query.push(" AND a.type = ");
            query.push_bind(activity_type);
        }
    }
}

/// Activities are append-only: there is no update or delete.
pub struct Activities<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> Activities<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    /// Record a user-entered activity. Linked contact and deal must belong to this organization.
    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), kind = ?request.activity_type), err)]
    pub async fn create(&mut self, request: &ActivityCreateDBRequest) -> Result<ActivityDBResponse> {
        ensure_reference(self.db, Referenced::Contact, request.contact_id, self.org_id, "contactId").await?;
        ensure_reference(self.db, Referenced::Deal, request.deal_id, self.org_id, "dealId").await?;

        let id = self.append(request).await?;
        self.get(id).await
    }

    /// Insert without reference checks, for side effects of other writes that already
    /// validated their links. Returns the new id.
    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), kind = ?request.activity_type), err)]
    pub async fn append(&mut self, request: &ActivityCreateDBRequest) -> Result<ActivityId> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO activities (id, organization_id, contact_id, deal_id, type, description, metadata, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .bind(request.contact_id)
        .bind(request.deal_id)
        .bind(request.activity_type)
        .bind(&request.description)
        .bind(&request.metadata)
        .bind(request.created_by)
        .execute(&mut *self.db)
        .await?;

        Ok(id)
    }

    async fn get(&mut self, id: ActivityId) -> Result<ActivityDBResponse> {
        let activity = sqlx::query_as::<_, ActivityDBResponse>(&format!("{ACTIVITY_SELECT} WHERE a.id = $1 AND a.organization_id = $2"))
            .bind(id)
            .bind(self.org_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(activity)
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id), limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &ActivityFilter) -> Result<Vec<ActivityDBResponse>> {
        let mut query = QueryBuilder::new(ACTIVITY_SELECT);
        filter.push_predicate(&mut query, self.org_id);
        query.push(" ORDER BY a.created_at DESC, a.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let activities = query
            .build_query_as::<ActivityDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(activities)
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn count(&mut self, filter: &ActivityFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM activities a");
        filter.push_predicate(&mut query, self.org_id);

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }
}
