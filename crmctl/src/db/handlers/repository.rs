//! Base repository trait for tenant-scoped database operations.
//!
//! A repository is a data access layer over one table. Every repository that implements this
//! trait is constructed with the organization it acts for and binds that id into every statement
//! it issues, so a row belonging to another organization behaves exactly like a missing row.

use crate::db::errors::{DbError, Result};
use crate::types::OrganizationId;
use sqlx::PgConnection;
use uuid::Uuid;

/// Base repository trait providing common database operations
///
/// This trait has separate associated types for create requests, update requests, and responses.
#[async_trait::async_trait]
pub trait Repository {
    /// The request type for creating entities
    type CreateRequest;

    /// The request type for updating entities
    type UpdateRequest;

    /// The response/DTO type returned by operations
    type Response;

    /// The identifier type for lookups
    type Id: Send + Sync;

    /// The filter type for list operations
    type Filter: Send + Sync;

    /// Create a new entity
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    /// Get an entity by ID. `None` when absent, removed, or owned by another organization.
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// List entities with filtering and pagination
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Count entities matching the same predicate `list` uses, ignoring pagination
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64>;

    /// Apply a partial update. An empty update returns the current row unchanged.
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;

    /// Delete an entity by ID, with entity-specific semantics (soft delete, archive, or removal)
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;
}

/// Tenant-owned tables that other rows may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Referenced {
    Contact,
    Deal,
    Stage,
    Group,
    User,
}

impl Referenced {
    fn query(&self) -> &'static str {
        match self {
            Referenced::Contact => {
                "SELECT EXISTS(SELECT 1 FROM contacts WHERE id = $1 AND organization_id = $2 AND NOT is_deleted)"
            }
            Referenced::Deal => "SELECT EXISTS(SELECT 1 FROM deals WHERE id = $1 AND organization_id = $2)",
            Referenced::Stage => "SELECT EXISTS(SELECT 1 FROM pipeline_stages WHERE id = $1 AND organization_id = $2)",
            Referenced::Group => "SELECT EXISTS(SELECT 1 FROM contact_groups WHERE id = $1 AND organization_id = $2)",
            Referenced::User => {
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND organization_id = $2 AND is_active)"
            }
        }
    }
}

/// Fail with [`DbError::InvalidReference`] unless `id` names a live row of `table` in `org_id`.
///
/// Foreign keys alone would accept a row owned by another organization.
pub async fn ensure_reference(
    db: &mut PgConnection,
    table: Referenced,
    id: Option<Uuid>,
    org_id: OrganizationId,
    field: &'static str,
) -> Result<()> {
    let Some(id) = id else {
        return Ok(());
    };

    let exists = sqlx::query_scalar::<_, bool>(table.query())
        .bind(id)
        .bind(org_id)
        .fetch_one(&mut *db)
        .await?;

    if exists { Ok(()) } else { Err(DbError::InvalidReference { field }) }
}

/// `LIKE` pattern matching `search` as a case-folded substring. `%`, `_` and `\` match
/// literally; use with `ESCAPE '\'`.
pub fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for ch in search.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::contains_pattern;

    #[test]
    fn search_wildcards_are_escaped() {
        assert_eq!(contains_pattern("Ada"), "%ada%");
        assert_eq!(contains_pattern("50%"), "%50\\%%");
        assert_eq!(contains_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }
}
