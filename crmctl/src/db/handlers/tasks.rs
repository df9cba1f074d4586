//! Database repository for tasks.

use crate::db::{
    errors::{DbError, Result},
    handlers::{
        Activities,
        repository::{Referenced, Repository, contains_pattern, ensure_reference},
    },
    models::{
        activities::ActivityCreateDBRequest,
        tasks::{DueTaskReminder, TaskCreateDBRequest, TaskDBResponse, TaskSort, TaskUpdateDBRequest},
    },
};
use crate::types::{
    ActivityType, ContactId, DealId, OrganizationId, SortOrder, TaskId, TaskPriority, UserId, abbrev_uuid,
};
use chrono::NaiveDate;
use serde_json::json;
use sqlx::{Connection, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

const TASK_SELECT: &str = r#"
    SELECT t.id, t.organization_id, t.title, t.description,
           t.contact_id, c.name AS contact_name,
           t.deal_id, d.title AS deal_title,
           t.assigned_to, u.name AS assigned_to_name,
           t.created_by, t.due_date, t.priority, t.is_completed, t.completed_at,
           t.created_at, t.updated_at
    FROM tasks t
    LEFT JOIN contacts c ON c.id = t.contact_id
    LEFT JOIN deals d ON d.id = t.deal_id
    LEFT JOIN users u ON u.id = t.assigned_to
"#;

/// Filter for listing tasks
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub skip: i64,
    pub limit: i64,
    pub completed: Option<bool>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<UserId>,
    pub contact_id: Option<ContactId>,
    pub deal_id: Option<DealId>,
    /// Only tasks due on or before this date
    pub due_by: Option<NaiveDate>,
    pub search: Option<String>,
    pub sort: TaskSort,
    pub order: SortOrder,
}

impl TaskFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    fn push_predicate(&self, query: &mut QueryBuilder<'_, Postgres>, org_id: OrganizationId) {
        query.push(" WHERE t.organization_id = ");
        query.push_bind(org_id);

        if let Some(completed) = self.completed {
            query.push(" AND t.is_completed = ");
            query.push_bind(completed);
        }
        if let Some(priority) = self.priority {
            query.push(" AND t.priority = ");
            query.push_bind(priority);
        }
        if let Some(assigned_to) = self.assigned_to {
            query.push(" AND t.assigned_to = ");
            query.push_bind(assigned_to);
        }
        if let Some(contact_id) = self.contact_id {
            query.push(" AND t.contact_id = ");
            query.push_bind(contact_id);
        }
        if let Some(deal_id) = self.deal_id {
            query.push(" AND t.deal_id = ");
            query.push_bind(deal_id);
        }
        if let Some(due_by) = self.due_by {
            query.push(" AND t.due_date <= ");
            query.push_bind(due_by);
        }
        if let Some(search) = &self.search {
            query.push(" AND LOWER(t.title) LIKE ");
            query.push_bind(contains_pattern(search));
            query.push(" ESCAPE '\\'");
        }
    }
}

pub struct Tasks<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> Tasks<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    async fn check_references(
        db: &mut PgConnection,
        org_id: OrganizationId,
        contact_id: Option<ContactId>,
        deal_id: Option<DealId>,
        assigned_to: Option<UserId>,
    ) -> Result<()> {
        ensure_reference(db, Referenced::Contact, contact_id, org_id, "contactId").await?;
        ensure_reference(db, Referenced::Deal, deal_id, org_id, "dealId").await?;
        ensure_reference(db, Referenced::User, assigned_to, org_id, "assignedTo").await
    }

    /// Mark a task done and record a `task_completed` activity.
    ///
    /// Completion is one-way: a task that is already complete is returned unchanged and no
    /// second activity is written.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), task_id = %abbrev_uuid(&id)), err)]
    pub async fn complete(&mut self, id: TaskId, completed_by: Option<UserId>) -> Result<TaskDBResponse> {
        let org_id = self.org_id;
        let mut tx = self.db.begin().await?;

        let completed = sqlx::query_as::<_, (String, Option<ContactId>, Option<DealId>)>(
            r#"
            UPDATE tasks SET is_completed = TRUE, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND organization_id = $2 AND NOT is_completed
            RETURNING title, contact_id, deal_id
            "#,
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((title, contact_id, deal_id)) = completed {
            let mut activity = ActivityCreateDBRequest::new(ActivityType::TaskCompleted, format!("Completed task \"{title}\""))
                .contact(contact_id)
                .metadata(json!({ "taskId": id }))
                .by(completed_by);
            activity.deal_id = deal_id;
            Activities::new(&mut tx, org_id).append(&activity).await?;
        }

        let task = Self::fetch(&mut tx, org_id, id).await?.ok_or(DbError::NotFound)?;
        tx.commit().await?;
        Ok(task)
    }

    /// Incomplete tasks due on or before `today`, across every organization, paired with the
    /// user to remind: the assignee, or the creator when nobody is assigned. Inactive users and
    /// users without an email address are left out. Ordered by user.
    #[instrument(skip(db), err)]
    pub async fn list_due_reminders(db: &mut PgConnection, today: NaiveDate) -> Result<Vec<DueTaskReminder>> {
        let reminders = sqlx::query_as::<_, DueTaskReminder>(
            r#"
            SELECT u.id AS user_id, u.email AS user_email, u.name AS user_name, t.title, t.due_date
            FROM tasks t
            JOIN users u ON u.id = COALESCE(t.assigned_to, t.created_by)
            WHERE NOT t.is_completed
              AND t.due_date <= $1
              AND u.is_active
              AND u.organization_id = t.organization_id
              AND u.email <> ''
            ORDER BY u.id, t.due_date, t.title
            "#,
        )
        .bind(today)
        .fetch_all(&mut *db)
        .await?;

        Ok(reminders)
    }

    async fn fetch(db: &mut PgConnection, org_id: OrganizationId, id: TaskId) -> Result<Option<TaskDBResponse>> {
        let task = sqlx::query_as::<_, TaskDBResponse>(&format!("{TASK_SELECT} WHERE t.id = $1 AND t.organization_id = $2"))
            .bind(id)
            .bind(org_id)
            .fetch_optional(&mut *db)
            .await?;

        Ok(task)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Tasks<'c> {
    type CreateRequest = TaskCreateDBRequest;
    type UpdateRequest = TaskUpdateDBRequest;
    type Response = TaskDBResponse;
    type Id = TaskId;
    type Filter = TaskFilter;

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        Self::check_references(self.db, self.org_id, request.contact_id, request.deal_id, request.assigned_to).await?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, organization_id, title, description, contact_id, deal_id,
                assigned_to, created_by, due_date, priority
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .bind(&request.title)
        .bind(request.description.as_deref())
        .bind(request.contact_id)
        .bind(request.deal_id)
        .bind(request.assigned_to)
        .bind(request.created_by)
        .bind(request.due_date)
        .bind(request.priority)
        .execute(&mut *self.db)
        .await?;

        Self::fetch(self.db, self.org_id, id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), task_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        Self::fetch(self.db, self.org_id, id).await
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id), limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(TASK_SELECT);
        filter.push_predicate(&mut query, self.org_id);

        query.push(format!(
            " ORDER BY {} {} NULLS LAST, t.id",
            filter.sort.column(),
            filter.order.as_sql()
        ));
        query.push(" LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let tasks = query.build_query_as::<TaskDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(tasks)
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM tasks t");
        filter.push_predicate(&mut query, self.org_id);

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&self.org_id), task_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let current = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        if request.is_empty() {
            return Ok(current);
        }

        Self::check_references(
            self.db,
            self.org_id,
            request.contact_id.flatten(),
            request.deal_id.flatten(),
            request.assigned_to.flatten(),
        )
        .await?;

        sqlx::query(
            r#"
            UPDATE tasks SET
                title = COALESCE($3, title),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                contact_id = CASE WHEN $6 THEN $7 ELSE contact_id END,
                deal_id = CASE WHEN $8 THEN $9 ELSE deal_id END,
                assigned_to = CASE WHEN $10 THEN $11 ELSE assigned_to END,
                due_date = CASE WHEN $12 THEN $13 ELSE due_date END,
                priority = COALESCE($14, priority),
                updated_at = NOW()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(self.org_id)
        .bind(request.title.as_deref())
        .bind(request.description.is_some())
        .bind(request.description.clone().flatten())
        .bind(request.contact_id.is_some())
        .bind(request.contact_id.flatten())
        .bind(request.deal_id.is_some())
        .bind(request.deal_id.flatten())
        .bind(request.assigned_to.is_some())
        .bind(request.assigned_to.flatten())
        .bind(request.due_date.is_some())
        .bind(request.due_date.flatten())
        .bind(request.priority)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id), task_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(self.org_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
