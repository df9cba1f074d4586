//! API models for the dashboard summary.

use super::{activities::ActivityResponse, tasks::TaskResponse};
use crate::db::handlers::dashboard::StageTotals;
use crate::errors::{Error, Result};
use crate::types::StageId;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Days covered when no range is given
pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Inclusive date range. Defaults to the last 30 days ending today.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DashboardQuery {
    pub fn range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let to = self.to.unwrap_or(today);
        let from = self.from.unwrap_or(to - Duration::days(DEFAULT_RANGE_DAYS));
        if from > to {
            return Err(Error::invalid_field("from", "must not be after `to`"));
        }
        Ok((from, to))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    #[schema(value_type = String, format = "uuid")]
    pub stage_id: StageId,
    pub name: String,
    pub color: String,
    pub position: i32,
    pub count: i64,
    #[schema(value_type = f64)]
    pub value: Decimal,
}

impl From<StageTotals> for StageSummary {
    fn from(totals: StageTotals) -> Self {
        Self {
            stage_id: totals.stage_id,
            name: totals.name,
            color: totals.color,
            position: totals.position,
            count: totals.count,
            value: totals.value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Contacts created in the range
    pub new_contacts: i64,
    /// Deals in a non-terminal stage and not archived
    pub open_deals: i64,
    #[schema(value_type = f64)]
    pub open_deal_value: Decimal,
    /// Percentage of deals created in the range that are won, one decimal
    pub conversion_rate: f64,
    pub deals_by_stage: Vec<StageSummary>,
    pub recent_activities: Vec<ActivityResponse>,
    /// Incomplete tasks due today or earlier
    pub due_tasks: Vec<TaskResponse>,
}
