//! Shared fixtures for database and HTTP tests.

use crate::auth::{
    identity::VerifiedIdentity,
    tenant::{TenantContext, resolve_tenant},
};
use crate::config::{
    AuthConfig, BillingConfig, Config, DatabaseConfig, DummyConfig, EmailConfig, EmailTransportConfig, IdentityConfig, JobsConfig,
    PoolSettings, TrialConfig,
};
use axum_test::TestServer;
use jsonwebtoken::{EncodingKey, Header, encode};
use sqlx::PgPool;
use std::net::SocketAddr;

/// Shared secret the test identity verifier accepts
pub const TEST_HS256_SECRET: &str = "crmctl-test-secret";
/// Bearer secret for `/internal/jobs/*` in tests
pub const TEST_CRON_SECRET: &str = "crmctl-test-cron";

pub fn create_test_config() -> Config {
    // Emails land as files in a per-process temp directory
    let email_dir = std::env::temp_dir().join(format!("crmctl-test-emails-{}", std::process::id()));

    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            // Tests hand the pool in directly
            url: "postgres://unused".to_string(),
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
        },
        auth: AuthConfig {
            identity: IdentityConfig {
                hs256_secret: Some(TEST_HS256_SECRET.to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
        trial: TrialConfig::default(),
        billing: Some(BillingConfig::Dummy(DummyConfig {})),
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: email_dir.to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        jobs: JobsConfig {
            cron_secret: Some(TEST_CRON_SECRET.to_string()),
        },
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

/// The email a test identity carries: the part of the subject after `|`, at example.com.
pub fn test_email(external_id: &str) -> String {
    let local = external_id.rsplit('|').next().unwrap_or(external_id);
    format!("{local}@example.com")
}

/// Resolve (provisioning on first call) the tenant for a test identity.
pub async fn provision_test_tenant(pool: &PgPool, external_id: &str) -> TenantContext {
    let identity = VerifiedIdentity {
        subject: external_id.to_string(),
        email: Some(test_email(external_id)),
        permissions: vec![],
    };
    resolve_tenant(pool, &identity, &TrialConfig::default())
        .await
        .expect("Failed to provision test tenant")
        .context
}

/// Sign a token the test configuration's verifier accepts.
pub fn test_token(external_id: &str) -> String {
    let claims = serde_json::json!({
        "sub": external_id,
        "email": test_email(external_id),
        "exp": (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_HS256_SECRET.as_bytes())).expect("Failed to sign test token")
}

/// `Authorization` header value for a test identity
pub fn bearer(external_id: &str) -> String {
    format!("Bearer {}", test_token(external_id))
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> TestServer {
    let app = crate::Application::new_with_pool(config, pool).expect("Failed to create application");
    let router = app.into_router();
    TestServer::new(router.into_make_service_with_connect_info::<SocketAddr>()).expect("Failed to create test server")
}
