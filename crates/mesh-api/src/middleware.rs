// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-cutting HTTP middleware: request ids, request logging, per-client-IP
//! rate limiting, and CORS.

use crate::error::ApiError;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;
use uuid::Uuid;

/// A unique request identifier, available as an Axum extension and echoed
/// back as the `x-request-id` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Generates a [`RequestId`] for each request and sets the response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    resp.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&id.0.to_string()).expect("uuid is a valid header value"),
    );
    resp
}

/// Logs method, path, status, and duration for every request.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let resp = next.run(req).await;

    let duration = start.elapsed();
    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = duration.as_millis() as u64,
        "request completed"
    );

    resp
}

/// A sliding-window rate limiter keyed per client IP.
///
/// Each client gets its own timestamp window; one noisy client cannot
/// exhaust another's quota.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    /// Allow `max_requests` per `window`, per client IP.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), max_requests, window }
    }

    /// Record a request from `ip`, returning the remaining window in
    /// milliseconds if the client is over quota.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        let timestamps = guard.entry(ip).or_default();

        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() as u32 >= self.max_requests {
            let retry_after = timestamps
                .front()
                .map(|&front| self.window.saturating_sub(now.duration_since(front)))
                .unwrap_or(self.window);
            return Err(retry_after.as_secs().max(1));
        }

        timestamps.push_back(now);
        Ok(())
    }
}

/// Axum middleware entry point for [`RateLimiter`]; requires
/// [`ConnectInfo<SocketAddr>`] to be available (set by `axum::serve` when
/// bound with `into_make_service_with_connect_info`).
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match limiter.check(addr.ip()).await {
        Ok(()) => next.run(req).await,
        Err(retry_after_secs) => {
            let mut resp =
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers_mut().insert("retry-after", value);
            }
            resp
        }
    }
}

/// CORS configuration, converted into a [`tower_http::cors::CorsLayer`].
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed `Origin` values.
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["content-type".to_string(), "authorization".to_string()],
        }
    }
}

impl CorsConfig {
    /// Build the Tower layer. A single `"*"` origin maps to
    /// [`AllowOrigin::any`]; otherwise each origin is parsed individually.
    pub fn to_cors_layer(&self) -> CorsLayer {
        let origin = if self.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            let origins: Vec<HeaderValue> =
                self.allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
            AllowOrigin::list(origins)
        };

        let methods: Vec<axum::http::Method> =
            self.allowed_methods.iter().filter_map(|m| m.parse().ok()).collect();
        let headers: Vec<axum::http::HeaderName> =
            self.allowed_headers.iter().filter_map(|h| h.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(AllowHeaders::list(headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn allows_requests_within_quota() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check(localhost()).await.is_ok());
        assert!(limiter.check(localhost()).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_requests_over_quota() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(localhost()).await.is_ok());
        assert!(limiter.check(localhost()).await.is_err());
    }

    #[tokio::test]
    async fn separate_clients_have_independent_quotas() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))).await.is_ok());
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2))).await.is_ok());
    }

    #[tokio::test]
    async fn expired_window_resets_quota() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check(localhost()).await.is_ok());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check(localhost()).await.is_ok());
    }
}
