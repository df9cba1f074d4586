//! Bearer token verification against the external identity provider.
//!
//! Tokens are JWTs. Production deployments verify RS256 signatures with keys published at the
//! provider's JWKS endpoint; development and tests can use an HS256 shared secret instead.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use moka::future::Cache;
use tokio::sync::Mutex;
use serde_json::Value;
use url::Url;

use crate::{config::IdentityConfig, errors::Error};

/// What the identity provider vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Opaque subject identifier (`sub`)
    pub subject: String,
    pub email: Option<String>,
    pub permissions: Vec<String>,
}

#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify a bearer token. Any failure is `Unauthenticated`.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, Error>;
}

pub struct JwtVerifier {
    keys: KeySource,
    validation: Validation,
    email_claim: String,
}

enum KeySource {
    Shared(DecodingKey),
    Jwks(JwksCache),
}

/// Unknown `kid`s trigger at most one JWKS fetch per this interval
const MIN_JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

struct JwksCache {
    url: Url,
    client: reqwest::Client,
    keys: Cache<String, Arc<DecodingKey>>,
    /// When keys were last fetched; also serialises concurrent refreshes
    last_refresh: Mutex<Option<Instant>>,
    min_refresh_interval: Duration,
}

impl JwksCache {
    async fn key(&self, kid: &str) -> Result<Arc<DecodingKey>, Error> {
        if let Some(key) = self.keys.get(kid).await {
            return Ok(key);
        }

        // Unknown kid: the provider may have rotated keys since the last fetch
        {
            let mut last_refresh = self.last_refresh.lock().await;
            // Another request may have refreshed while this one waited for the lock
            if let Some(key) = self.keys.get(kid).await {
                return Ok(key);
            }
            let recently = last_refresh.is_some_and(|at| at.elapsed() < self.min_refresh_interval);
            if !recently {
                self.refresh().await?;
                *last_refresh = Some(Instant::now());
            }
        }
        self.keys.get(kid).await.ok_or_else(|| unauthenticated("Unknown signing key"))
    }

    async fn refresh(&self) -> Result<(), Error> {
        tracing::debug!(url = %self.url, "Fetching JWKS");
        let jwks: JwkSet = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Internal {
                operation: format!("fetch JWKS: {e}"),
            })?
            .json()
            .await
            .map_err(|e| Error::Internal {
                operation: format!("parse JWKS: {e}"),
            })?;

        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => self.keys.insert(kid, Arc::new(key)).await,
                Err(e) => tracing::warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }
        Ok(())
    }
}

fn unauthenticated(message: &str) -> Error {
    Error::Unauthenticated {
        message: Some(message.to_string()),
    }
}

impl JwtVerifier {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, Error> {
        let (keys, algorithm) = match (&config.jwks_url, &config.hs256_secret) {
            (Some(url), _) => {
                // reqwest is built without a default rustls provider
                crate::install_crypto_provider();
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|e| Error::Internal {
                        operation: format!("build JWKS client: {e}"),
                    })?;
                let cache = JwksCache {
                    url: url.clone(),
                    client,
                    keys: Cache::builder().max_capacity(64).time_to_live(config.jwks_cache_ttl).build(),
                    last_refresh: Mutex::new(None),
                    min_refresh_interval: MIN_JWKS_REFRESH_INTERVAL,
                };
                (KeySource::Jwks(cache), Algorithm::RS256)
            }
            (None, Some(secret)) => (KeySource::Shared(DecodingKey::from_secret(secret.as_bytes())), Algorithm::HS256),
            (None, None) => {
                return Err(Error::Internal {
                    operation: "configure identity verifier: neither jwks_url nor hs256_secret is set".to_string(),
                });
            }
        };

        let mut validation = Validation::new(algorithm);
        match &config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            keys,
            validation,
            email_claim: config.email_claim.clone(),
        })
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, Error> {
        let claims = match &self.keys {
            KeySource::Shared(key) => decode::<Value>(token, key, &self.validation),
            KeySource::Jwks(cache) => {
                let header = decode_header(token).map_err(|_| unauthenticated("Malformed token"))?;
                let kid = header.kid.ok_or_else(|| unauthenticated("Token has no key id"))?;
                let key = cache.key(&kid).await.map_err(|e| {
                    tracing::warn!(error = %e, "Could not resolve token signing key");
                    unauthenticated("Invalid token")
                })?;
                decode::<Value>(token, &key, &self.validation)
            }
        }
        .map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            unauthenticated("Invalid or expired token")
        })?
        .claims;

        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| unauthenticated("Token has no subject"))?
            .to_string();

        let email = claims
            .get(&self.email_claim)
            .or_else(|| claims.get("email"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let permissions = claims
            .get("permissions")
            .and_then(Value::as_array)
            .map(|perms| perms.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        Ok(VerifiedIdentity {
            subject,
            email,
            permissions,
        })
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, Error> {
    let value = header.ok_or_else(|| unauthenticated("Missing Authorization header"))?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| unauthenticated("Malformed Authorization header"))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(unauthenticated("Malformed Authorization header"));
    }
    Ok(token)
}
