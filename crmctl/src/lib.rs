//! # crmctl: multi-tenant CRM backend
//!
//! `crmctl` serves the JSON API behind a small-team CRM: contacts, a sales pipeline of deals,
//! tasks and an activity timeline, each owned by exactly one organization. Callers authenticate
//! with an identity-provider token; subscriptions are billed through a payment provider.
//!
//! ## Request Flow
//!
//! Every tenant request carries a bearer token. The [`auth`] extractors verify it, resolve the
//! identity to a [`auth::tenant::TenantContext`] (provisioning an organization, an admin user and
//! the default pipeline on first contact), and for writes check the subscription gate. Handlers in
//! [`api`] then run tenant-scoped repositories from [`db`]: every statement binds the caller's
//! organization id, so an id belonging to another tenant reads exactly like a missing one.
//!
//! Moving a deal into a won or lost stage closes it and updates the linked contact's status in the
//! same transaction.
//!
//! ## Outside the tenant API
//!
//! - `POST /webhooks/billing`: signed events from the payment provider update plans and
//!   subscription status ([`billing`], [`payment_providers`]).
//! - `POST /internal/jobs/*`: trial warnings and task reminder digests, run when an external
//!   scheduler calls them ([`jobs`]).
//! - `GET /healthz`, `GET /internal/metrics`, OpenAPI at `/docs`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use crmctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = crmctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     crmctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod import;
pub mod jobs;
pub mod limits;
mod openapi;
pub mod payment_providers;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use crate::{
    api::handlers::{
        activities, billing as billing_routes, contact_groups, contacts, dashboard, deals, jobs as job_routes, organizations, pipeline,
        tags, tasks,
    },
    auth::identity::{IdentityVerifier, JwtVerifier},
    config::{CorsOrigin, PoolSettings},
    email::EmailService,
    limits::{InMemoryRateLimiter, RateLimiter},
    openapi::ApiDoc,
    payment_providers::BillingProvider,
};
use axum::{
    Router, http,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{ContactId, DealId, OrganizationId, TaskId, UserId};

/// Application state shared across all request handlers.
///
/// The identity verifier, rate limiter and billing provider sit behind traits so tests and
/// deployments can swap them.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .identity(Arc::new(JwtVerifier::from_config(&config.auth.identity)?))
///     .rate_limiter(Arc::new(InMemoryRateLimiter::from_config(&config.limits.rate_limit)))
///     .email(Arc::new(EmailService::new(&config)?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub identity: Arc<dyn IdentityVerifier>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub email: Arc<EmailService>,
    pub billing: Option<Arc<dyn BillingProvider>>,
}

impl AppState {
    /// Build the state from configuration, constructing every collaborator it names.
    pub fn from_config(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let identity = JwtVerifier::from_config(&config.auth.identity)?;
        let email = EmailService::new(&config)?;
        Ok(AppState::builder()
            .db(pool)
            .identity(Arc::new(identity))
            .rate_limiter(Arc::new(InMemoryRateLimiter::from_config(&config.limits.rate_limit)))
            .email(Arc::new(email))
            .maybe_billing(config.billing.as_ref().map(payment_providers::create_provider))
            .config(config)
            .build())
    }
}

/// Get the crmctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Install the process-wide rustls provider used by the HTTP clients. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));
    if settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
    }
    if settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(Duration::from_secs(settings.max_lifetime_secs));
    }
    options
}

async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    info!("Connecting to database");
    let pool = pool_options(&config.database.pool).connect(&config.database.url).await?;
    migrator().run(&pool).await?;
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION, http::header::RETRY_AFTER]);

    if let Some(max_age) = config.auth.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

fn tenant_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(organizations::get_me))
        .route(
            "/organization",
            get(organizations::get_organization).patch(organizations::update_organization),
        )
        .route("/organization/members", get(organizations::list_members))
        .route("/contacts", get(contacts::list_contacts).post(contacts::create_contact))
        .route("/contacts/import", post(contacts::import_contacts_csv))
        .route(
            "/contacts/{id}",
            get(contacts::get_contact)
                .patch(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route("/contacts/{id}/activities", get(contacts::list_contact_activities))
        .route("/pipeline/stages", get(pipeline::list_stages))
        .route("/pipeline/stages/{id}", patch(pipeline::update_stage))
        .route("/deals", get(deals::list_deals).post(deals::create_deal))
        .route(
            "/deals/{id}",
            get(deals::get_deal).patch(deals::update_deal).delete(deals::delete_deal),
        )
        .route("/deals/{id}/stage", patch(deals::move_deal_stage))
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/{id}",
            get(tasks::get_task).patch(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/tasks/{id}/complete", post(tasks::complete_task))
        .route("/activities", get(activities::list_activities).post(activities::create_activity))
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/tags/{id}", delete(tags::delete_tag))
        .route("/groups", get(contact_groups::list_groups).post(contact_groups::create_group))
        .route(
            "/groups/{id}",
            patch(contact_groups::update_group).delete(contact_groups::delete_group),
        )
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/billing/checkout", post(billing_routes::create_checkout))
        .route("/billing/portal", post(billing_routes::create_portal))
}

/// Build the main application router with all endpoints and middleware.
///
/// - `/api/v1/*`: tenant API, rate limited when `limits.rate_limit.enabled`
/// - `/webhooks/billing`, `/internal/jobs/*`, `/healthz`
/// - `/docs`: OpenAPI document and Scalar UI
/// - `/internal/metrics` when `enable_metrics`
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let mut api = tenant_routes();
    if state.config.limits.rate_limit.enabled {
        let limit_state = limits::RateLimitState::new(state.rate_limiter.clone(), &state.config.limits.rate_limit);
        api = api.layer(from_fn_with_state(limit_state, limits::rate_limit_middleware));
    }

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api)
        .route("/webhooks/billing", post(billing_routes::billing_webhook))
        .route("/internal/jobs/trial-warnings", post(job_routes::trial_warnings))
        .route("/internal/jobs/task-reminders", post(job_routes::task_reminders))
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Connect to the database, run migrations and build the router
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting crmctl with configuration: {:#?}", config);
        let pool = setup_database(&config).await?;
        Self::new_with_pool(config, pool)
    }

    /// Build the application over an existing, already migrated pool
    pub fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        install_crypto_provider();
        let state = AppState::from_config(pool.clone(), config.clone())?;
        let router = build_router(&state)?;
        Ok(Self { router, config, pool })
    }

    /// The fully layered router, for embedding or driving in tests
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        let service = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_test::TestServer::new(service).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("crmctl listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port);

        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;
    use axum::http::StatusCode;

    #[sqlx::test]
    #[test_log::test]
    async fn test_health_and_docs_are_public(pool: PgPool) {
        let server = Application::new_with_pool(create_test_config(), pool).unwrap().into_test_server();

        let health = server.get("/healthz").await;
        health.assert_status_ok();
        health.assert_text("OK");

        server.get("/docs").await.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_metrics_route_follows_config(pool: PgPool) {
        let mut config = create_test_config();
        config.enable_metrics = false;
        let server = Application::new_with_pool(config, pool).unwrap().into_test_server();

        server.get("/internal/metrics").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_tenant_routes_require_a_token(pool: PgPool) {
        let server = Application::new_with_pool(create_test_config(), pool).unwrap().into_test_server();

        let response = server.get("/api/v1/contacts").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        let mut config = create_test_config();
        config.auth.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];
        assert!(create_cors_layer(&config).is_ok());
    }
}
