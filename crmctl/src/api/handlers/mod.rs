//! HTTP request handlers for all API endpoints.
//!
//! Handlers are grouped by resource. Each one resolves the caller with an extractor, converts the
//! body into a database request, and runs it through a tenant-scoped repository.
//!
//! # Handler Modules
//!
//! - [`organizations`]: the caller (`/me`), their organization and its members
//! - [`contacts`]: contact CRUD, CSV import and a contact's timeline
//! - [`pipeline`]: pipeline stages
//! - [`deals`]: deal CRUD and stage moves
//! - [`tasks`]: task CRUD and completion
//! - [`activities`]: the activity timeline
//! - [`tags`], [`contact_groups`]: labels for contacts
//! - [`dashboard`]: summary figures
//! - [`billing`]: checkout, billing portal and the provider webhook
//! - [`jobs`]: periodic jobs run by an external scheduler
//!
//! # Authentication
//!
//! Reads take a [`crate::auth::tenant::TenantContext`]. Writes take
//! [`crate::auth::subscription::ActiveTenant`], which also passes the subscription gate.
//! Admin-only routes take [`crate::auth::tenant::AdminTenant`].
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which renders as a status code and an
//! `{"error": {...}}` body.

pub mod activities;
pub mod billing;
pub mod contact_groups;
pub mod contacts;
pub mod dashboard;
pub mod deals;
pub mod jobs;
pub mod organizations;
pub mod pipeline;
pub mod tags;
pub mod tasks;
