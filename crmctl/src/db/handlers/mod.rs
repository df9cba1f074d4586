//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open transaction) and,
//! for tenant-owned tables, the organization id every statement is scoped to.
//!
//! ```ignore
//! use crmctl::db::handlers::{Contacts, Repository};
//!
//! async fn example(pool: &sqlx::PgPool, org_id: uuid::Uuid) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = Contacts::new(&mut tx, org_id);
//!     let contact = repo.get_by_id(uuid::Uuid::new_v4()).await?;
//!     assert!(contact.is_none());
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Available Repositories
//!
//! - [`Organizations`], [`Users`]: tenants and their members
//! - [`PipelineStages`]: the per-organization sales pipeline
//! - [`Contacts`], [`Deals`], [`Tasks`]: implement [`Repository`]
//! - [`Activities`]: append-only timeline
//! - [`Tags`], [`ContactGroups`]: labels for contacts
//! - [`Dashboard`]: read-only aggregates

pub mod activities;
pub mod contact_groups;
pub mod contacts;
pub mod dashboard;
pub mod deals;
pub mod organizations;
pub mod pipeline_stages;
pub mod repository;
pub mod tags;
pub mod tasks;
pub mod users;

pub use activities::Activities;
pub use contact_groups::ContactGroups;
pub use contacts::Contacts;
pub use dashboard::Dashboard;
pub use deals::Deals;
pub use organizations::Organizations;
pub use pipeline_stages::PipelineStages;
pub use repository::Repository;
pub use tags::Tags;
pub use tasks::Tasks;
pub use users::Users;
