// SPDX-License-Identifier: MIT OR Apache-2.0
//! Auth provider contract consumed by the A2A client (C10) to attach bearer
//! credentials to outbound agent-to-agent calls.

use async_trait::async_trait;

/// Supplies a bearer token for outbound A2A calls.
///
/// Implementations may fetch a token from a static value, an environment
/// variable, or a remote token-issuing service; the A2A client only needs
/// `get_token`/`has_token` and does not care which.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Fetch the current bearer token, refreshing it if the provider caches
    /// one with an expiry. Returns `None` if no token is available.
    async fn get_token(&self) -> Option<String>;

    /// Cheap, non-blocking check for whether a token is configured at all,
    /// used to decide whether to attempt a call that requires auth.
    fn has_token(&self) -> bool;
}

/// An [`AuthProvider`] that never supplies a token; calls proceed
/// unauthenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuthProvider;

#[async_trait]
impl AuthProvider for NoopAuthProvider {
    async fn get_token(&self) -> Option<String> {
        None
    }

    fn has_token(&self) -> bool {
        false
    }
}

/// An [`AuthProvider`] backed by a single fixed token, supplied at
/// construction time.
#[derive(Debug, Clone)]
pub struct StaticAuthProvider {
    token: String,
}

impl StaticAuthProvider {
    /// Wrap a pre-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn get_token(&self) -> Option<String> {
        Some(self.token.clone())
    }

    fn has_token(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_has_no_token() {
        let provider = NoopAuthProvider;
        assert!(!provider.has_token());
        assert_eq!(provider.get_token().await, None);
    }

    #[tokio::test]
    async fn static_returns_configured_token() {
        let provider = StaticAuthProvider::new("secret-token");
        assert!(provider.has_token());
        assert_eq!(provider.get_token().await.as_deref(), Some("secret-token"));
    }
}
