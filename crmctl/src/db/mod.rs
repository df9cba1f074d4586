//! Database layer for data persistence and access.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (api::handlers - HTTP request handlers)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - tenant-scoped queries)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Tenant isolation
//!
//! Every table holding customer data carries `organization_id`. Repositories over those tables
//! are constructed with the organization they act for and add `organization_id = $n` to every
//! statement, including the existence checks that precede updates. An id that belongs to another
//! organization is therefore indistinguishable from one that does not exist.
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures
//! - [`errors`]: Database-specific error types

pub mod errors;
pub mod handlers;
pub mod models;
