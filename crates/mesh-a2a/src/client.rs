// SPDX-License-Identifier: MIT OR Apache-2.0
//! The A2A client itself: URL/header construction and the
//! circuit-breaker-then-retry-then-single-shot execution envelope.

use crate::types::A2aResponse;
use mesh_auth::AuthProvider;
use mesh_error::{ErrorCode, MeshError};
use mesh_resilience::{
    retry_async, BreakerConfig, CancellationToken, CircuitBreaker, RetryConfig, RetryableError,
};
use mesh_urn::Urn;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Status codes the single-shot call treats as transient and retryable.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Configuration for an [`A2aClient`].
#[derive(Clone)]
pub struct A2aConfig {
    /// Base URL every target agent's route is resolved against.
    pub base_url: String,
    /// `<product>/<version>` string sent as `User-Agent`.
    pub user_agent: String,
    /// This agent's own URN, used as the delegation chain root.
    pub own_urn: Urn,
    /// Per-request timeout for the single-shot HTTP call.
    pub request_timeout: Duration,
    /// Circuit breaker configuration.
    pub breaker: BreakerConfig,
    /// Retry configuration wrapping the breaker-gated call.
    pub retry: RetryConfig,
}

/// A thin wrapper error used internally so the retry loop can distinguish a
/// completed (non-retryable) failure from a transient one without losing
/// the underlying [`MeshError`].
struct Attempt(MeshError);

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RetryableError for Attempt {
    fn is_retryable(&self) -> bool {
        self.0.is_retryable()
    }

    fn into_mesh_error(self) -> MeshError {
        self.0
    }
}

/// Authenticated HTTP client for calling other agents in the mesh.
#[derive(Clone)]
pub struct A2aClient {
    http: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
    breaker: CircuitBreaker,
    config: A2aConfig,
}

impl A2aClient {
    /// Build a client over `auth`, using a fresh [`reqwest::Client`].
    pub fn new(config: A2aConfig, auth: Arc<dyn AuthProvider>) -> Self {
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self { http: reqwest::Client::new(), auth, breaker, config }
    }

    /// Resolve `target`'s route to `<baseUrl>/agents/<domain>-<name><cleanRoute>`.
    fn resolve_url(&self, target: &Urn, route: &str) -> String {
        let clean_route = if route.starts_with('/') { route.to_string() } else { format!("/{route}") };
        format!(
            "{}/agents/{}-{}{}",
            self.config.base_url.trim_end_matches('/'),
            target.domain(),
            target.name(),
            clean_route
        )
    }

    /// Issue an authenticated call to `target`'s `route`, optionally carrying
    /// `body` as a JSON request payload and an inbound `delegation_chain`.
    pub async fn call(
        &self,
        target: &Urn,
        route: &str,
        method: Method,
        body: Option<Value>,
        delegation_chain: Option<&str>,
    ) -> Result<A2aResponse, MeshError> {
        let url = self.resolve_url(target, route);
        let delegation = match delegation_chain {
            Some(chain) if !chain.is_empty() => format!("{chain} -> {}", self.config.own_urn.as_canonical()),
            _ => self.config.own_urn.as_canonical(),
        };
        let token = self.auth.get_token().await;
        let cancel = CancellationToken::new();

        let outcome = self
            .breaker
            .execute(|| async {
                let url = url.clone();
                let method = method.clone();
                let body = body.clone();
                let delegation = delegation.clone();
                let token = token.clone();

                retry_async(&self.config.retry, &cancel, move || {
                    let url = url.clone();
                    let method = method.clone();
                    let body = body.clone();
                    let delegation = delegation.clone();
                    let token = token.clone();
                    async move { self.single_shot(&url, method, body, &delegation, token.as_deref()).await.map_err(Attempt) }
                })
                .await
                .map(|ok| ok.value)
            })
            .await?;

        Ok(outcome)
    }

    /// One HTTP round trip, classifying the response status into a
    /// [`MeshError`] with the right retryability.
    async fn single_shot(
        &self,
        url: &str,
        method: Method,
        body: Option<Value>,
        delegation: &str,
        token: Option<&str>,
    ) -> Result<A2aResponse, MeshError> {
        let mut req = self
            .http
            .request(method, url)
            .header("content-type", "application/json")
            .header("user-agent", &self.config.user_agent)
            .header("x-agent-delegation", delegation);

        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let send = tokio::time::timeout(self.config.request_timeout, req.send());
        let response = match send.await {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) => {
                return Err(MeshError::new(ErrorCode::NetworkFault, err.to_string()).with_source(err))
            }
            Err(_) => {
                return Err(MeshError::new(ErrorCode::Timeout, "a2a request timed out")
                    .with_context("url", url)
                    .retryable(false))
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MeshError::new(ErrorCode::AuthRejected, format!("a2a call rejected: {status}"))
                .with_context("url", url)
                .retryable(false));
        }

        if RETRYABLE_STATUSES.contains(&status.as_u16()) {
            return Err(MeshError::new(
                ErrorCode::NetworkFault,
                format!("a2a call received transient status {status}"),
            )
            .with_context("url", url)
            .with_context("status", status.as_u16()));
        }

        if !status.is_success() {
            return Err(MeshError::new(ErrorCode::ProtocolViolation, format!("a2a call failed: {status}"))
                .with_context("url", url)
                .with_context("status", status.as_u16())
                .retryable(false));
        }

        let headers = response.headers().clone();
        let is_json = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let data = if is_json {
            response
                .json::<Value>()
                .await
                .map_err(|err| MeshError::new(ErrorCode::ProtocolViolation, err.to_string()).with_source(err))?
        } else {
            let text = response
                .text()
                .await
                .map_err(|err| MeshError::new(ErrorCode::ProtocolViolation, err.to_string()).with_source(err))?;
            Value::String(text)
        };

        debug!(target: "mesh.a2a", %url, status = status.as_u16(), "a2a call completed");
        Ok(A2aResponse { status: status.as_u16(), headers, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_auth::{NoopAuthProvider, StaticAuthProvider};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(base_url: String) -> A2aConfig {
        A2aConfig {
            base_url,
            user_agent: "mesh-a2a-test/0.1.0".to_string(),
            own_urn: Urn::new("acme", "caller-bot", None).unwrap(),
            request_timeout: Duration::from_secs(5),
            breaker: BreakerConfig { failure_threshold: 10, ..BreakerConfig::default() },
            retry: RetryConfig {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                overall_timeout: Duration::from_secs(5),
                jitter_factor: 0.0,
                policy: mesh_resilience::BackoffPolicy::Fixed,
            },
        }
    }

    #[tokio::test]
    async fn successful_call_decodes_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/acme-widget-bot/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = A2aClient::new(fast_config(server.uri()), Arc::new(NoopAuthProvider));
        let target = Urn::new("acme", "widget-bot", None).unwrap();
        let response = client.call(&target, "/status", Method::GET, None, None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.data, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn bearer_token_is_attached_when_auth_provider_has_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/acme-widget-bot/status"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client =
            A2aClient::new(fast_config(server.uri()), Arc::new(StaticAuthProvider::new("secret-token")));
        let target = Urn::new("acme", "widget-bot", None).unwrap();
        let response = client.call(&target, "/status", Method::GET, None, None).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn unauthorized_short_circuits_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = A2aClient::new(fast_config(server.uri()), Arc::new(NoopAuthProvider));
        let target = Urn::new("acme", "widget-bot", None).unwrap();
        let result = client.call(&target, "/status", Method::GET, None, None).await;
        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthRejected);
    }

    #[tokio::test]
    async fn transient_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = A2aClient::new(fast_config(server.uri()), Arc::new(NoopAuthProvider));
        let target = Urn::new("acme", "widget-bot", None).unwrap();
        let result = client.call(&target, "/status", Method::GET, None, None).await;
        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::RetryExhausted);
    }

    #[tokio::test]
    async fn delegation_chain_appends_current_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-agent-delegation", "urn:agent:acme:upstream-bot@latest -> urn:agent:acme:caller-bot@latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = A2aClient::new(fast_config(server.uri()), Arc::new(NoopAuthProvider));
        let target = Urn::new("acme", "widget-bot", None).unwrap();
        let result = client
            .call(
                &target,
                "/status",
                Method::GET,
                None,
                Some("urn:agent:acme:upstream-bot@latest"),
            )
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn resolve_url_prefixes_route_with_slash() {
        let client = A2aClient::new(fast_config("http://localhost:9000".to_string()), Arc::new(NoopAuthProvider));
        let target = Urn::new("acme", "widget-bot", None).unwrap();
        assert_eq!(
            client.resolve_url(&target, "status"),
            "http://localhost:9000/agents/acme-widget-bot/status"
        );
        assert_eq!(
            client.resolve_url(&target, "/status"),
            "http://localhost:9000/agents/acme-widget-bot/status"
        );
    }
}
