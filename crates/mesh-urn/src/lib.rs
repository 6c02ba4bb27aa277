// SPDX-License-Identifier: MIT OR Apache-2.0
//! mesh-urn
#![deny(unsafe_code)]
//!
//! Agent identity: parsing, validation, and normalization of agent URNs.
//!
//! Canonical form is `urn:agent:<domain>:<name>[@<version>]`. `domain` and
//! `name` may not contain the delimiter of the field that follows them;
//! `version` defaults to the literal `latest` when omitted.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SCHEME_PREFIX: &str = "urn:agent:";
const DEFAULT_VERSION: &str = "latest";

/// Errors from parsing or constructing a [`Urn`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrnError {
    #[error("urn missing required '{SCHEME_PREFIX}' prefix: {0:?}")]
    MissingScheme(String),

    #[error("urn has empty domain: {0:?}")]
    EmptyDomain(String),

    #[error("urn has empty name: {0:?}")]
    EmptyName(String),

    #[error("urn has empty version: {0:?}")]
    EmptyVersion(String),

    #[error("urn is missing the domain:name separator: {0:?}")]
    MissingSeparator(String),
}

/// A parsed, normalized agent URN: `urn:agent:<domain>:<name>[@<version>]`.
///
/// Two URNs are equal iff their full canonical strings are equal
/// (case-sensitive, exact).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "String", into = "String")]
pub struct Urn {
    domain: String,
    name: String,
    version: String,
}

impl Urn {
    /// Parse a canonical URN string.
    ///
    /// # Examples
    ///
    /// ```
    /// use mesh_urn::Urn;
    ///
    /// let urn = Urn::parse("urn:agent:ai:ml-agent@1.0.0").unwrap();
    /// assert_eq!(urn.domain(), "ai");
    /// assert_eq!(urn.name(), "ml-agent");
    /// assert_eq!(urn.version(), "1.0.0");
    ///
    /// let unversioned = Urn::parse("urn:agent:ai:ml-agent").unwrap();
    /// assert_eq!(unversioned.version(), "latest");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, UrnError> {
        let rest = raw
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| UrnError::MissingScheme(raw.to_string()))?;

        let (domain, remainder) = rest
            .split_once(':')
            .ok_or_else(|| UrnError::MissingSeparator(raw.to_string()))?;

        if domain.is_empty() {
            return Err(UrnError::EmptyDomain(raw.to_string()));
        }

        let (name, version) = match remainder.split_once('@') {
            Some((name, version)) => (name, version),
            None => (remainder, DEFAULT_VERSION),
        };

        if name.is_empty() {
            return Err(UrnError::EmptyName(raw.to_string()));
        }
        if version.is_empty() {
            return Err(UrnError::EmptyVersion(raw.to_string()));
        }

        Ok(Self {
            domain: domain.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Construct a URN from already-validated parts.
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        version: Option<String>,
    ) -> Result<Self, UrnError> {
        let domain = domain.into();
        let name = name.into();
        let version = version.unwrap_or_else(|| DEFAULT_VERSION.to_string());

        if domain.is_empty() || domain.contains(':') {
            return Err(UrnError::EmptyDomain(domain));
        }
        if name.is_empty() || name.contains('@') {
            return Err(UrnError::EmptyName(name));
        }
        if version.is_empty() {
            return Err(UrnError::EmptyVersion(version));
        }

        Ok(Self {
            domain,
            name,
            version,
        })
    }

    /// The agent's domain segment.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The agent's name segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent's version segment (`"latest"` when not explicitly given).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Render the canonical string form.
    pub fn as_canonical(&self) -> String {
        format!("{SCHEME_PREFIX}{}:{}@{}", self.domain, self.name, self.version)
    }

    /// Sanitize the canonical URN into a filesystem-safe stem: every byte
    /// outside `[A-Za-z0-9]` becomes `_`.
    ///
    /// This is not reversible on its own; the registry's index is the
    /// authority for mapping a sanitized filename back to a URN.
    pub fn sanitized_filename(&self) -> String {
        self.as_canonical()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_canonical())
    }
}

impl FromStr for Urn {
    type Err = UrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Urn {
    type Error = UrnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.as_canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_urn() {
        let urn = Urn::parse("urn:agent:ai:ml-agent@1.0.0").unwrap();
        assert_eq!(urn.domain(), "ai");
        assert_eq!(urn.name(), "ml-agent");
        assert_eq!(urn.version(), "1.0.0");
    }

    #[test]
    fn defaults_version_to_latest() {
        let urn = Urn::parse("urn:agent:ai:ml-agent").unwrap();
        assert_eq!(urn.version(), "latest");
    }

    #[test]
    fn round_trips_canonical_string() {
        for raw in [
            "urn:agent:ai:ml-agent@1.0.0",
            "urn:agent:ai:ml-agent",
            "urn:agent:finance:risk-scorer@2024-10-01",
        ] {
            let urn = Urn::parse(raw).unwrap();
            let reparsed = Urn::parse(&urn.as_canonical()).unwrap();
            assert_eq!(urn, reparsed);
        }
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(matches!(
            Urn::parse("invalid-urn-format"),
            Err(UrnError::MissingScheme(_))
        ));
    }

    #[test]
    fn rejects_empty_domain() {
        assert!(matches!(
            Urn::parse("urn:agent::name"),
            Err(UrnError::EmptyDomain(_))
        ));
    }

    #[test]
    fn rejects_empty_name() {
        assert!(matches!(
            Urn::parse("urn:agent:ai:"),
            Err(UrnError::EmptyName(_))
        ));
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            Urn::parse("urn:agent:ai-only"),
            Err(UrnError::MissingSeparator(_))
        ));
    }

    #[test]
    fn sanitized_filename_replaces_non_alphanumeric() {
        let urn = Urn::parse("urn:agent:ai:ml-agent@1.0.0").unwrap();
        assert_eq!(
            urn.sanitized_filename(),
            "urn_agent_ai_ml_agent_1_0_0"
        );
    }

    #[test]
    fn equality_is_exact_string() {
        let a = Urn::parse("urn:agent:ai:ml-agent@1.0.0").unwrap();
        let b = Urn::parse("urn:agent:ai:ml-agent@1.0.0").unwrap();
        let c = Urn::parse("urn:agent:AI:ml-agent@1.0.0").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn serde_roundtrip() {
        let urn = Urn::parse("urn:agent:ai:ml-agent@1.0.0").unwrap();
        let json = serde_json::to_string(&urn).unwrap();
        assert_eq!(json, "\"urn:agent:ai:ml-agent@1.0.0\"");
        let back: Urn = serde_json::from_str(&json).unwrap();
        assert_eq!(urn, back);
    }
}
