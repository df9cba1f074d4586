//! Per-client request rate limiting.
//!
//! The router depends only on the [`RateLimiter`] trait; the limiter instance lives in
//! [`AppState`](crate::AppState) and can be swapped for a shared store when running more than one
//! process. [`InMemoryRateLimiter`] keeps fixed windows per key and loses them on restart.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::errors::Error;

/// Outcome of counting one request against a key's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `key` and decide whether it may proceed.
    async fn check(&self, key: &str) -> RateDecision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter per key.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
    checks: AtomicU64,
}

/// Expired windows are swept once every this many checks.
const PRUNE_EVERY: u64 = 1024;

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    /// Drop windows that have ended.
    pub fn prune(&self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, w| now.duration_since(w.started) < window);
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(now);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window { started: now, count: 0 });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }
}

#[async_trait::async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }
}

/// Middleware state: the limiter plus how callers are identified.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<dyn RateLimiter>,
    pub trust_forwarded_for: bool,
}

impl RateLimitState {
    pub fn new(limiter: Arc<dyn RateLimiter>, config: &RateLimitConfig) -> Self {
        Self {
            limiter,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }
}

/// Identify the caller by peer address. The first `X-Forwarded-For` hop is used instead only
/// when `trust_forwarded_for` is set, since clients control that header.
pub fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(first_hop) = forwarded {
            return first_hop.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting callers over budget with `RATE_LIMITED` and a `Retry-After` header.
pub async fn rate_limit_middleware(State(state): State<RateLimitState>, request: Request, next: Next) -> Response {
    let key = client_key(&request, state.trust_forwarded_for);
    match state.limiter.check(&key).await {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            metrics::counter!("crmctl_rate_limited_total").increment(1);
            tracing::debug!(client = %key, "Rate limit exceeded");
            Error::TooManyRequests {
                // Round up so clients never retry early
                retry_after_secs: retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0),
            }
            .into_response()
        }
    }
}
