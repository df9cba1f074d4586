//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures
//! - **[`json`]**: JSON body extractor whose rejections use the API error shape
//!
//! # API Structure
//!
//! Tenant routes live under `/api/v1` and need a bearer token:
//!
//! - **Caller** (`/me`, `/organization/*`)
//! - **Contacts** (`/contacts/*`), **Deals** (`/deals/*`), **Tasks** (`/tasks/*`)
//! - **Pipeline** (`/pipeline/stages/*`), **Activities** (`/activities`)
//! - **Tags & groups** (`/tags/*`, `/groups/*`)
//! - **Dashboard** (`/dashboard`), **Billing** (`/billing/*`)
//!
//! Outside `/api/v1`: `/webhooks/billing` (provider-signed), `/internal/jobs/*` (cron secret)
//! and `/healthz`.
//!
//! # OpenAPI Documentation
//!
//! Every endpoint is annotated with `utoipa`. The document and a Scalar UI are served at `/docs`.

pub mod handlers;
pub mod json;
pub mod models;
