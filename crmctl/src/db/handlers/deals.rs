//! Database repository for deals and their movement through the pipeline.
//!
//! Deleting a deal archives it. Archived deals stay readable by id but are hidden from lists
//! unless asked for.

use crate::db::{
    errors::{DbError, Result},
    handlers::{
        Activities, Contacts, PipelineStages,
        repository::{Referenced, Repository, contains_pattern, ensure_reference},
    },
    models::{
        activities::ActivityCreateDBRequest,
        deals::{DealCreateDBRequest, DealDBResponse, DealSort, DealUpdateDBRequest, StageTransition},
    },
};
use crate::types::{ActivityType, ContactId, ContactStatus, DealId, OrganizationId, SortOrder, StageId, UserId, abbrev_uuid};
use serde_json::json;
use sqlx::{Connection, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

const DEAL_SELECT: &str = r#"
    SELECT d.id, d.organization_id, d.title, d.contact_id, c.name AS contact_name,
           d.stage_id, s.name AS stage_name, d.value, d.probability,
           d.expected_close, d.actual_close, d.position, d.notes, d.is_archived,
           d.created_by, d.created_at, d.updated_at
    FROM deals d
    JOIN pipeline_stages s ON s.id = d.stage_id
    LEFT JOIN contacts c ON c.id = d.contact_id
"#;

/// Filter for listing deals
#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    pub skip: i64,
    pub limit: i64,
    pub stage_id: Option<StageId>,
    pub contact_id: Option<ContactId>,
    /// Case-insensitive substring over the title
    pub search: Option<String>,
    pub include_archived: bool,
    pub sort: DealSort,
    pub order: SortOrder,
}

impl DealFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    fn push_predicate(&self, query: &mut QueryBuilder<'_, Postgres>, org_id: OrganizationId) {
        query.push(" WHERE d.organization_id = ");
        query.push_bind(org_id);

        if !self.include_archived {
            query.push(" AND NOT d.is_archived");
        }
        if let Some(stage_id) = self.stage_id {
            query.push(" AND d.stage_id = ");
            query.push_bind(stage_id);
        }
        if let Some(contact_id) = self.contact_id {
            query.push(" AND d.contact_id = ");
            query.push_bind(contact_id);
        }
        if let Some(search) = &self.search {
            query.push(" AND LOWER(d.title) LIKE ");
            query.push_bind(contains_pattern(search));
            query.push(" ESCAPE '\\'");
        }
    }
}

pub struct Deals<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> Deals<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    async fn next_position(db: &mut PgConnection, org_id: OrganizationId, stage_id: StageId) -> Result<i32> {
        let position = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT COALESCE(MAX(position), 0) + 1 FROM deals
            WHERE organization_id = $1 AND stage_id = $2 AND NOT is_archived
            "#,
        )
        .bind(org_id)
        .bind(stage_id)
        .fetch_one(&mut *db)
        .await?;

        Ok(position)
    }

    async fn fetch(db: &mut PgConnection, org_id: OrganizationId, id: DealId) -> Result<Option<DealDBResponse>> {
        let deal = sqlx::query_as::<_, DealDBResponse>(&format!("{DEAL_SELECT} WHERE d.id = $1 AND d.organization_id = $2"))
            .bind(id)
            .bind(org_id)
            .fetch_optional(&mut *db)
            .await?;

        Ok(deal)
    }

    /// Move a deal to another stage.
    ///
    /// The deal takes the stage's probability. Entering a won or lost stage stamps `actual_close`
    /// with today's date and sets the linked contact's status to `customer` or `lost`; other moves
    /// leave both alone. The move, the cascade and the timeline entry commit together. A linked
    /// contact that no longer exists is skipped with a warning rather than failing the move.
    /// Without a `position` the deal goes to the end of the target stage.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), deal_id = %abbrev_uuid(&id), stage_id = %abbrev_uuid(&stage_id)), err)]
    pub async fn update_stage(
        &mut self,
        id: DealId,
        stage_id: StageId,
        position: Option<i32>,
        moved_by: Option<UserId>,
    ) -> Result<StageTransition> {
        let org_id = self.org_id;
        let mut tx = self.db.begin().await?;

        let deal = Self::fetch(&mut tx, org_id, id).await?.ok_or(DbError::NotFound)?;
        let stage = PipelineStages::new(&mut tx, org_id)
            .get_by_id(stage_id)
            .await?
            .ok_or(DbError::NotFound)?;

        let position = match position {
            Some(position) => position,
            None if deal.stage_id == stage.id => deal.position,
            None => Self::next_position(&mut tx, org_id, stage.id).await?,
        };

        sqlx::query(
            r#"
            UPDATE deals SET
                stage_id = $3,
                position = $4,
                probability = $5,
                actual_close = CASE WHEN $6 THEN CURRENT_DATE ELSE actual_close END,
                updated_at = NOW()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(stage.id)
        .bind(position)
        .bind(stage.probability)
        .bind(stage.is_terminal())
        .execute(&mut *tx)
        .await?;

        let target_status = if stage.is_won {
            Some(ContactStatus::Customer)
        } else if stage.is_lost {
            Some(ContactStatus::Lost)
        } else {
            None
        };

        let mut contact_status = None;
        if let (Some(status), Some(contact_id)) = (target_status, deal.contact_id) {
            if Contacts::new(&mut tx, org_id).set_status(contact_id, status).await? {
                contact_status = Some(status);
            } else {
                tracing::warn!(
                    deal_id = %id,
                    contact_id = %contact_id,
                    "Linked contact is gone; status cascade skipped"
                );
            }
        }

        let (activity_type, description) = if stage.is_won {
            (ActivityType::DealWon, format!("Deal \"{}\" won", deal.title))
        } else if stage.is_lost {
            (ActivityType::DealLost, format!("Deal \"{}\" lost", deal.title))
        } else {
            (
                ActivityType::StageChange,
                format!("Deal \"{}\" moved from {} to {}", deal.title, deal.stage_name, stage.name),
            )
        };
        Activities::new(&mut tx, org_id)
            .append(
                &ActivityCreateDBRequest::new(activity_type, description)
                    .contact(deal.contact_id)
                    .deal(id)
                    .metadata(json!({
                        "fromStageId": deal.stage_id,
                        "fromStage": deal.stage_name,
                        "toStageId": stage.id,
                        "toStage": stage.name,
                    }))
                    .by(moved_by),
            )
            .await?;

        let moved = Self::fetch(&mut tx, org_id, id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;

        Ok(StageTransition {
            deal: moved,
            from_stage_id: deal.stage_id,
            contact_status,
        })
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Deals<'c> {
    type CreateRequest = DealCreateDBRequest;
    type UpdateRequest = DealUpdateDBRequest;
    type Response = DealDBResponse;
    type Id = DealId;
    type Filter = DealFilter;

    /// Create a deal at the end of its stage. Also records a `deal_created` activity.
    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), stage_id = %abbrev_uuid(&request.stage_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let org_id = self.org_id;
        let mut tx = self.db.begin().await?;

        let stage = PipelineStages::new(&mut tx, org_id)
            .get_by_id(request.stage_id)
            .await?
            .ok_or(DbError::InvalidReference { field: "stageId" })?;
        ensure_reference(&mut tx, Referenced::Contact, request.contact_id, org_id, "contactId").await?;

        let id = Uuid::new_v4();
        let position = Self::next_position(&mut tx, org_id, stage.id).await?;
        sqlx::query(
            r#"
            INSERT INTO deals (
                id, organization_id, title, contact_id, stage_id, value, probability,
                expected_close, position, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(&request.title)
        .bind(request.contact_id)
        .bind(stage.id)
        .bind(request.value)
        .bind(stage.probability)
        .bind(request.expected_close)
        .bind(position)
        .bind(request.notes.as_deref())
        .bind(request.created_by)
        .execute(&mut *tx)
        .await?;

        Activities::new(&mut tx, org_id)
            .append(
                &ActivityCreateDBRequest::new(ActivityType::DealCreated, format!("Deal \"{}\" created", request.title))
                    .contact(request.contact_id)
                    .deal(id)
                    .metadata(json!({ "stageId": stage.id, "stage": stage.name, "value": request.value }))
                    .by(request.created_by),
            )
            .await?;

        let deal = Self::fetch(&mut tx, org_id, id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;
        Ok(deal)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), deal_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        Self::fetch(self.db, self.org_id, id).await
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id), limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(DEAL_SELECT);
        filter.push_predicate(&mut query, self.org_id);

        query.push(format!(
            " ORDER BY {} {} NULLS LAST, d.id",
            filter.sort.column(),
            filter.order.as_sql()
        ));
        query.push(" LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let deals = query.build_query_as::<DealDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(deals)
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM deals d");
        filter.push_predicate(&mut query, self.org_id);

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), deal_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let current = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        if request.is_empty() {
            return Ok(current);
        }

        if let Some(contact_id) = request.contact_id {
            ensure_reference(self.db, Referenced::Contact, contact_id, self.org_id, "contactId").await?;
        }

        sqlx::query(
            r#"
            UPDATE deals SET
                title = COALESCE($3, title),
                contact_id = CASE WHEN $4 THEN $5 ELSE contact_id END,
                value = COALESCE($6, value),
                expected_close = CASE WHEN $7 THEN $8 ELSE expected_close END,
                notes = CASE WHEN $9 THEN $10 ELSE notes END,
                updated_at = NOW()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .bind(request.title.as_deref())
        .bind(request.contact_id.is_some())
        .bind(request.contact_id.flatten())
        .bind(request.value)
        .bind(request.expected_close.is_some())
        .bind(request.expected_close.flatten())
        .bind(request.notes.is_some())
        .bind(request.notes.clone().flatten())
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    /// Archive the deal. Returns false if it is missing or already archived.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), deal_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE deals SET is_archived = TRUE, updated_at = NOW()
            WHERE id = $1 AND organization_id = $2 AND NOT is_archived
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tenant::TenantContext;
    use crate::db::handlers::activities::ActivityFilter;
    use crate::db::models::contacts::ContactCreateDBRequest;
    use crate::db::models::pipeline_stages::PipelineStageDBResponse;
    use crate::test_utils::provision_test_tenant;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    struct Fixture {
        tenant: TenantContext,
        stages: Vec<PipelineStageDBResponse>,
        contact_id: ContactId,
    }

    async fn fixture(pool: &PgPool, external_id: &str) -> Fixture {
        let tenant = provision_test_tenant(pool, external_id).await;
        let mut conn = pool.acquire().await.unwrap();
        let stages = PipelineStages::new(&mut conn, tenant.org_id).list().await.unwrap();
        let contact = Contacts::new(&mut conn, tenant.org_id)
            .create(&ContactCreateDBRequest {
                created_by: Some(tenant.user_id),
                name: Some("Buyer".to_string()),
                email: Some("buyer@example.com".to_string()),
                phone: None,
                company: None,
                job_title: None,
                status: ContactStatus::Qualified,
                source: None,
                notes: None,
                group_id: None,
                tags: vec![],
            })
            .await
            .unwrap();

        Fixture {
            tenant,
            stages,
            contact_id: contact.id,
        }
    }

    fn deal(f: &Fixture, title: &str) -> DealCreateDBRequest {
        DealCreateDBRequest {
            created_by: Some(f.tenant.user_id),
            title: title.to_string(),
            contact_id: Some(f.contact_id),
            stage_id: f.stages[0].id,
            value: Decimal::new(1_000_000, 2),
            expected_close: NaiveDate::from_ymd_opt(2025, 12, 31),
            notes: None,
        }
    }

    async fn db_today(pool: &PgPool) -> NaiveDate {
        sqlx::query_scalar("SELECT CURRENT_DATE").fetch_one(pool).await.unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_takes_stage_probability_and_logs_activity(pool: PgPool) {
        let f = fixture(&pool, "ext|deals-create").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Deals::new(&mut conn, f.tenant.org_id);

        let first = repo.create(&deal(&f, "First")).await.unwrap();
        let second = repo.create(&deal(&f, "Second")).await.unwrap();

        assert_eq!(first.probability, f.stages[0].probability);
        assert_eq!(first.stage_name, "Lead");
        assert_eq!(first.contact_name.as_deref(), Some("Buyer"));
        assert_eq!(first.value, Decimal::new(1_000_000, 2));
        assert_eq!((first.position, second.position), (1, 2));

        let filter = ActivityFilter {
            deal_id: Some(first.id),
            ..ActivityFilter::new(0, 10)
        };
        let activities = Activities::new(&mut conn, f.tenant.org_id).list(&filter).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::DealCreated);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_rejects_foreign_stage_and_contact(pool: PgPool) {
        let a = fixture(&pool, "ext|deals-ref-a").await;
        let b = fixture(&pool, "ext|deals-ref-b").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Deals::new(&mut conn, a.tenant.org_id);

        let err = repo
            .create(&DealCreateDBRequest {
                stage_id: b.stages[0].id,
                ..deal(&a, "Bad stage")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidReference { field: "stageId" }));

        let err = repo
            .create(&DealCreateDBRequest {
                contact_id: Some(b.contact_id),
                ..deal(&a, "Bad contact")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidReference { field: "contactId" }));
        assert_eq!(repo.count(&DealFilter::new(0, 25)).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_won_stage_closes_deal_and_marks_customer(pool: PgPool) {
        let f = fixture(&pool, "ext|deals-won").await;
        let mut conn = pool.acquire().await.unwrap();
        let created = Deals::new(&mut conn, f.tenant.org_id).create(&deal(&f, "Big one")).await.unwrap();
        let won = f.stages.iter().find(|s| s.is_won).unwrap();

        let transition = Deals::new(&mut conn, f.tenant.org_id)
            .update_stage(created.id, won.id, None, Some(f.tenant.user_id))
            .await
            .unwrap();

        assert_eq!(transition.from_stage_id, f.stages[0].id);
        assert_eq!(transition.deal.stage_id, won.id);
        assert_eq!(transition.deal.probability, 100);
        assert_eq!(transition.deal.actual_close, Some(db_today(&pool).await));
        assert_eq!(transition.contact_status, Some(ContactStatus::Customer));

        let contact = Contacts::new(&mut conn, f.tenant.org_id).get_by_id(f.contact_id).await.unwrap().unwrap();
        assert_eq!(contact.status, ContactStatus::Customer);

        let filter = ActivityFilter {
            activity_type: Some(ActivityType::DealWon),
            ..ActivityFilter::new(0, 10)
        };
        assert_eq!(Activities::new(&mut conn, f.tenant.org_id).count(&filter).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_lost_stage_marks_contact_lost(pool: PgPool) {
        let f = fixture(&pool, "ext|deals-lost").await;
        let mut conn = pool.acquire().await.unwrap();
        let created = Deals::new(&mut conn, f.tenant.org_id).create(&deal(&f, "Slipped")).await.unwrap();
        let lost = f.stages.iter().find(|s| s.is_lost).unwrap();

        let transition = Deals::new(&mut conn, f.tenant.org_id)
            .update_stage(created.id, lost.id, Some(3), None)
            .await
            .unwrap();

        assert_eq!(transition.deal.position, 3);
        assert_eq!(transition.deal.probability, 0);
        assert!(transition.deal.actual_close.is_some());
        assert_eq!(transition.contact_status, Some(ContactStatus::Lost));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_open_stage_move_leaves_close_date_and_contact(pool: PgPool) {
        let f = fixture(&pool, "ext|deals-open").await;
        let mut conn = pool.acquire().await.unwrap();
        let created = Deals::new(&mut conn, f.tenant.org_id).create(&deal(&f, "Progressing")).await.unwrap();

        let transition = Deals::new(&mut conn, f.tenant.org_id)
            .update_stage(created.id, f.stages[2].id, None, None)
            .await
            .unwrap();

        assert_eq!(transition.deal.probability, 50);
        assert_eq!(transition.deal.actual_close, None);
        assert_eq!(transition.contact_status, None);

        let contact = Contacts::new(&mut conn, f.tenant.org_id).get_by_id(f.contact_id).await.unwrap().unwrap();
        assert_eq!(contact.status, ContactStatus::Qualified);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_won_with_deleted_contact_still_moves(pool: PgPool) {
        let f = fixture(&pool, "ext|deals-orphan").await;
        let mut conn = pool.acquire().await.unwrap();
        let created = Deals::new(&mut conn, f.tenant.org_id).create(&deal(&f, "Orphan")).await.unwrap();
        Contacts::new(&mut conn, f.tenant.org_id).delete(f.contact_id).await.unwrap();
        let won = f.stages.iter().find(|s| s.is_won).unwrap();

        let transition = Deals::new(&mut conn, f.tenant.org_id)
            .update_stage(created.id, won.id, None, None)
            .await
            .unwrap();

        assert_eq!(transition.deal.stage_id, won.id);
        assert_eq!(transition.contact_status, None);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stage_move_is_tenant_scoped(pool: PgPool) {
        let a = fixture(&pool, "ext|deals-move-a").await;
        let b = fixture(&pool, "ext|deals-move-b").await;
        let mut conn = pool.acquire().await.unwrap();
        let created = Deals::new(&mut conn, a.tenant.org_id).create(&deal(&a, "Mine")).await.unwrap();

        let err = Deals::new(&mut conn, b.tenant.org_id)
            .update_stage(created.id, b.stages[1].id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));

        let err = Deals::new(&mut conn, a.tenant.org_id)
            .update_stage(created.id, b.stages[1].id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));

        let unchanged = Deals::new(&mut conn, a.tenant.org_id).get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(unchanged.stage_id, a.stages[0].id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_archives(pool: PgPool) {
        let f = fixture(&pool, "ext|deals-archive").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Deals::new(&mut conn, f.tenant.org_id);
        let created = repo.create(&deal(&f, "Old")).await.unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());

        assert_eq!(repo.count(&DealFilter::new(0, 25)).await.unwrap(), 0);
        let with_archived = DealFilter {
            include_archived: true,
            ..DealFilter::new(0, 25)
        };
        assert_eq!(repo.count(&with_archived).await.unwrap(), 1);
        assert!(repo.get_by_id(created.id).await.unwrap().unwrap().is_archived);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_patches_fields(pool: PgPool) {
        let f = fixture(&pool, "ext|deals-patch").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Deals::new(&mut conn, f.tenant.org_id);
        let created = repo.create(&deal(&f, "Draft")).await.unwrap();

        let updated = repo
            .update(
                created.id,
                &DealUpdateDBRequest {
                    title: Some("Final".to_string()),
                    contact_id: Some(None),
                    expected_close: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.contact_id, None);
        assert_eq!(updated.expected_close, None);
        assert_eq!(updated.value, created.value);
        assert_eq!(updated.stage_id, created.stage_id);
    }
}
