//! Read-only aggregates for the dashboard.
//!
//! Each figure is its own query; a dashboard read is not a consistent snapshot.

use crate::db::errors::Result;
use crate::types::{OrganizationId, StageId, abbrev_uuid};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Deals created in a range, split by outcome
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct DealOutcomeCounts {
    pub total: i64,
    pub won: i64,
}

/// Open deals: in a non-terminal stage and not archived
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct OpenDealTotals {
    pub count: i64,
    pub value: Decimal,
}

/// Live deals in one stage
#[derive(Debug, Clone, FromRow)]
pub struct StageTotals {
    pub stage_id: StageId,
    pub name: String,
    pub color: String,
    pub position: i32,
    pub count: i64,
    pub value: Decimal,
}

/// Won deals as a percentage of all deals, to one decimal. Zero when there are no deals.
pub fn conversion_rate(won: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (won as f64 * 1000.0 / total as f64).round() / 10.0
}

pub struct Dashboard<'c> {
    db: &'c mut PgConnection,
    org_id: OrganizationId,
}

impl<'c> Dashboard<'c> {
    pub fn new(db: &'c mut PgConnection, org_id: OrganizationId) -> Self {
        Self { db, org_id }
    }

    /// Live contacts created in `[from, to]`, both days inclusive.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn new_contacts(&mut self, from: NaiveDate, to: NaiveDate) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM contacts
            WHERE organization_id = $1 AND NOT is_deleted
              AND created_at >= $2::date AND created_at < ($3::date + 1)
            "#,
        )
        .bind(self.org_id)
        .bind(from)
        .bind(to)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn open_deals(&mut self) -> Result<OpenDealTotals> {
        let totals = sqlx::query_as::<_, OpenDealTotals>(
            r#"
            SELECT COUNT(*) AS count, COALESCE(SUM(d.value), 0) AS value
            FROM deals d
            JOIN pipeline_stages s ON s.id = d.stage_id
            WHERE d.organization_id = $1 AND NOT d.is_archived AND NOT s.is_won AND NOT s.is_lost
            "#,
        )
        .bind(self.org_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(totals)
    }

    /// Deals created in `[from, to]` and how many of them now sit in a won stage.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn deal_outcomes(&mut self, from: NaiveDate, to: NaiveDate) -> Result<DealOutcomeCounts> {
        let counts = sqlx::query_as::<_, DealOutcomeCounts>(
            r#"
            SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE s.is_won) AS won
            FROM deals d
            JOIN pipeline_stages s ON s.id = d.stage_id
            WHERE d.organization_id = $1
              AND d.created_at >= $2::date AND d.created_at < ($3::date + 1)
            "#,
        )
        .bind(self.org_id)
        .bind(from)
        .bind(to)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(counts)
    }

    /// Every stage in pipeline order, including empty ones.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&self.org_id)), err)]
    pub async fn deals_by_stage(&mut self) -> Result<Vec<StageTotals>> {
        let stages = sqlx::query_as::<_, StageTotals>(
            r#"
            SELECT s.id AS stage_id, s.name, s.color, s.position,
                   COUNT(d.id) AS count, COALESCE(SUM(d.value), 0) AS value
            FROM pipeline_stages s
            LEFT JOIN deals d ON d.stage_id = s.id AND d.organization_id = s.organization_id AND NOT d.is_archived
            WHERE s.organization_id = $1
            GROUP BY s.id, s.name, s.color, s.position
            ORDER BY s.position
            "#,
        )
        .bind(self.org_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(stages)
    }
}
