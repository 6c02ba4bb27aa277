//! Unified error taxonomy with stable error codes for the agent mesh control
//! plane.
//!
//! Every mesh error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by
//! [`MeshError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed URN or malformed input.
    Format,
    /// Recognized input shape but violates a rule.
    Validation,
    /// Entity absent or duplicate where uniqueness was required.
    Resolution,
    /// Missing or rejected credentials.
    Auth,
    /// Deadline exceeded.
    Timeout,
    /// Transport fault: DNS/TCP/TLS.
    Network,
    /// JSON-RPC error or malformed response frame.
    Protocol,
    /// Fast-fail due to an open circuit breaker.
    CircuitBreaker,
    /// Bounded retry exhausted.
    Retry,
    /// External cancel signal fired.
    Cancellation,
    /// Over quota at the API boundary.
    RateLimit,
    /// Component-tagged umbrella: URN registry.
    Registry,
    /// Component-tagged umbrella: discovery service.
    Discovery,
    /// Component-tagged umbrella: MCP client.
    Mcp,
    /// Component-tagged umbrella: A2A client.
    A2a,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Format => "format",
            Self::Validation => "validation",
            Self::Resolution => "resolution",
            Self::Auth => "auth",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::CircuitBreaker => "circuit_breaker",
            Self::Retry => "retry",
            Self::Cancellation => "cancellation",
            Self::RateLimit => "rate_limit",
            Self::Registry => "registry",
            Self::Discovery => "discovery",
            Self::Mcp => "mcp",
            Self::A2a => "a2a",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// URN failed to parse against its bit-exact grammar.
    FormatInvalidUrn,
    /// Other malformed-input format error.
    FormatInvalidInput,

    /// Recognized shape but a rule was violated (bad sort field, etc.).
    ValidationFailed,

    /// Entity does not exist where one was required.
    ResolutionNotFound,
    /// Entity already exists where uniqueness was required.
    ResolutionDuplicate,

    /// Missing credential where one was required.
    AuthMissingCredential,
    /// Credential rejected (HTTP 401/403 or equivalent).
    AuthRejected,

    /// Deadline exceeded waiting for a call to complete.
    Timeout,

    /// Transport-level network fault.
    NetworkFault,

    /// JSON-RPC error or malformed wire frame.
    ProtocolViolation,

    /// Circuit breaker is open; call was fast-failed.
    CircuitBreakerOpen,

    /// Retry budget exhausted.
    RetryExhausted,

    /// Caller's cancellation signal fired.
    Cancelled,

    /// Caller exceeded the configured request quota.
    RateLimitExceeded,

    /// Registry storage is corrupt or unreadable.
    RegistryCorrupt,
    /// Registry has reached its configured agent capacity.
    RegistryCapacityExceeded,

    /// Discovery query parameters are invalid.
    DiscoveryInvalidQuery,

    /// MCP subprocess exited or failed to start.
    McpConnectionFailed,
    /// MCP tool name is not known to the connected server.
    McpToolNotFound,

    /// A2A target agent could not be resolved to a URL.
    A2aUnresolvedTarget,

    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FormatInvalidUrn | Self::FormatInvalidInput => ErrorCategory::Format,

            Self::ValidationFailed => ErrorCategory::Validation,

            Self::ResolutionNotFound | Self::ResolutionDuplicate => ErrorCategory::Resolution,

            Self::AuthMissingCredential | Self::AuthRejected => ErrorCategory::Auth,

            Self::Timeout => ErrorCategory::Timeout,

            Self::NetworkFault => ErrorCategory::Network,

            Self::ProtocolViolation => ErrorCategory::Protocol,

            Self::CircuitBreakerOpen => ErrorCategory::CircuitBreaker,

            Self::RetryExhausted => ErrorCategory::Retry,

            Self::Cancelled => ErrorCategory::Cancellation,

            Self::RateLimitExceeded => ErrorCategory::RateLimit,

            Self::RegistryCorrupt | Self::RegistryCapacityExceeded => ErrorCategory::Registry,

            Self::DiscoveryInvalidQuery => ErrorCategory::Discovery,

            Self::McpConnectionFailed | Self::McpToolNotFound => ErrorCategory::Mcp,

            Self::A2aUnresolvedTarget => ErrorCategory::A2a,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Whether this code is eligible for retry absent an explicit override.
    ///
    /// Per the retry classification rule: timeout, validation/format, and
    /// auth errors are never retried; everything else defaults to retryable.
    pub fn default_retryable(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::Timeout
                | ErrorCategory::Format
                | ErrorCategory::Validation
                | ErrorCategory::Auth
                | ErrorCategory::CircuitBreaker
                | ErrorCategory::Cancellation
        )
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"FORMAT_INVALID_URN"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormatInvalidUrn => "FORMAT_INVALID_URN",
            Self::FormatInvalidInput => "FORMAT_INVALID_INPUT",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ResolutionNotFound => "RESOLUTION_NOT_FOUND",
            Self::ResolutionDuplicate => "RESOLUTION_DUPLICATE",
            Self::AuthMissingCredential => "AUTH_MISSING_CREDENTIAL",
            Self::AuthRejected => "AUTH_REJECTED",
            Self::Timeout => "TIMEOUT",
            Self::NetworkFault => "NETWORK_FAULT",
            Self::ProtocolViolation => "PROTOCOL_VIOLATION",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::RetryExhausted => "RETRY_EXHAUSTED",
            Self::Cancelled => "CANCELLED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::RegistryCorrupt => "REGISTRY_CORRUPT",
            Self::RegistryCapacityExceeded => "REGISTRY_CAPACITY_EXCEEDED",
            Self::DiscoveryInvalidQuery => "DISCOVERY_INVALID_QUERY",
            Self::McpConnectionFailed => "MCP_CONNECTION_FAILED",
            Self::McpToolNotFound => "MCP_TOOL_NOT_FOUND",
            Self::A2aUnresolvedTarget => "A2A_UNRESOLVED_TARGET",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status code the API layer should map this error code to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::FormatInvalidUrn | Self::FormatInvalidInput | Self::ValidationFailed => 400,
            Self::AuthMissingCredential | Self::AuthRejected => 401,
            Self::ResolutionNotFound | Self::McpToolNotFound => 404,
            Self::ResolutionDuplicate => 409,
            Self::RateLimitExceeded => 429,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MeshError
// ---------------------------------------------------------------------------

/// Unified mesh-control-plane error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, arbitrary structured context, a
/// generated `error_id`/`timestamp` pair, and an explicit retry override.
///
/// # Builder usage
///
/// ```
/// use mesh_error::{MeshError, ErrorCode};
///
/// let err = MeshError::new(ErrorCode::Timeout, "a2a call timed out after 5s")
///     .with_context("target", "urn:agent:ai:ml-agent@1.0.0")
///     .with_context("timeout_ms", 5000);
/// ```
pub struct MeshError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Unique identifier for this occurrence, suitable for surfacing in a
    /// 500 response body.
    pub error_id: Uuid,
    /// When the error was constructed.
    pub timestamp: DateTime<Utc>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
    /// Explicit retry-eligibility override; `None` defers to
    /// [`ErrorCode::default_retryable`].
    pub retryable: Option<bool>,
}

impl MeshError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            error_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: None,
            context: BTreeMap::new(),
            retryable: None,
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Override retry eligibility explicitly, taking precedence over the
    /// error code's default retryability.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Whether this error should be retried: the explicit override if set,
    /// otherwise the code's default.
    pub fn is_retryable(&self) -> bool {
        self.retryable.unwrap_or_else(|| self.code.default_retryable())
    }
}

impl fmt::Debug for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("MeshError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        d.field("error_id", &self.error_id);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for MeshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serializable snapshot of a [`MeshError`] (without the opaque source), the
/// `{error, message, ...context}` shape the HTTP API returns on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeshErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Unique identifier for this occurrence.
    pub error_id: Uuid,
    /// When the error occurred.
    pub timestamp: DateTime<Utc>,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&MeshError> for MeshErrorDto {
    fn from(err: &MeshError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            error_id: err.error_id,
            timestamp: err.timestamp,
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::FormatInvalidUrn,
        ErrorCode::FormatInvalidInput,
        ErrorCode::ValidationFailed,
        ErrorCode::ResolutionNotFound,
        ErrorCode::ResolutionDuplicate,
        ErrorCode::AuthMissingCredential,
        ErrorCode::AuthRejected,
        ErrorCode::Timeout,
        ErrorCode::NetworkFault,
        ErrorCode::ProtocolViolation,
        ErrorCode::CircuitBreakerOpen,
        ErrorCode::RetryExhausted,
        ErrorCode::Cancelled,
        ErrorCode::RateLimitExceeded,
        ErrorCode::RegistryCorrupt,
        ErrorCode::RegistryCapacityExceeded,
        ErrorCode::DiscoveryInvalidQuery,
        ErrorCode::McpConnectionFailed,
        ErrorCode::McpToolNotFound,
        ErrorCode::A2aUnresolvedTarget,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = MeshError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
        assert!(err.retryable.is_none());
    }

    #[test]
    fn display_without_context() {
        let err = MeshError::new(ErrorCode::ResolutionNotFound, "no such agent");
        assert!(err.to_string().starts_with("[RESOLUTION_NOT_FOUND] no such agent"));
    }

    #[test]
    fn display_with_context() {
        let err = MeshError::new(ErrorCode::Timeout, "timed out").with_context("timeout_ms", 5000);
        let s = err.to_string();
        assert!(s.contains("timeout_ms"));
        assert!(s.contains("5000"));
    }

    #[test]
    fn builder_with_source() {
        let src = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = MeshError::new(ErrorCode::AuthRejected, "denied").with_source(src);
        assert!(err.source.is_some());
        assert_eq!(err.source.as_ref().unwrap().to_string(), "access denied");
    }

    #[test]
    fn retryable_override_takes_precedence() {
        let err = MeshError::new(ErrorCode::Internal, "x").retryable(false);
        assert!(!err.is_retryable());
        let err2 = MeshError::new(ErrorCode::Timeout, "x").retryable(true);
        assert!(err2.is_retryable());
    }

    #[test]
    fn default_retryable_excludes_format_validation_auth_timeout() {
        for code in [
            ErrorCode::FormatInvalidUrn,
            ErrorCode::ValidationFailed,
            ErrorCode::AuthRejected,
            ErrorCode::Timeout,
            ErrorCode::CircuitBreakerOpen,
            ErrorCode::Cancelled,
        ] {
            assert!(!code.default_retryable(), "{code:?} should not default-retry");
        }
    }

    #[test]
    fn default_retryable_includes_network_and_registry() {
        for code in [ErrorCode::NetworkFault, ErrorCode::RegistryCorrupt] {
            assert!(code.default_retryable(), "{code:?} should default-retry");
        }
    }

    #[test]
    fn http_status_mapping_is_consistent() {
        assert_eq!(ErrorCode::FormatInvalidUrn.http_status(), 400);
        assert_eq!(ErrorCode::ResolutionNotFound.http_status(), 404);
        assert_eq!(ErrorCode::ResolutionDuplicate.http_status(), 409);
        assert_eq!(ErrorCode::RateLimitExceeded.http_status(), 429);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()));
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!(r#""{}""#, code.as_str()));
        }
    }

    #[test]
    fn std_error_source_chain() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err = MeshError::new(ErrorCode::RegistryCorrupt, "corrupt index").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }

    #[test]
    fn dto_roundtrip_without_source() {
        let err = MeshError::new(ErrorCode::DiscoveryInvalidQuery, "bad sort field")
            .with_context("field", "bogus");
        let dto: MeshErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: MeshErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert!(back.source_message.is_none());
    }

    #[test]
    fn category_shorthand() {
        let err = MeshError::new(ErrorCode::McpToolNotFound, "no such tool");
        assert_eq!(err.category(), ErrorCategory::Mcp);
    }
}
