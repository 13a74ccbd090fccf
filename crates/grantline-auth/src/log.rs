//! Structured diagnostic records for the token endpoint.
//!
//! Every grant handler and the dispatcher report rejected requests and
//! collaborator misbehaviour through [`EndpointLog`], so operators can filter
//! and alert on a fixed event taxonomy regardless of which grant type
//! produced the record.
//!
//! # Severity
//!
//! - `debug` - expected, client-correctable mismatches (missing parameters)
//! - `info` - authentication and condition mismatches worth operational visibility
//! - `warn` - collaborator contract violations (unsupported methods, empty results)
//! - `error` - service misconfiguration
//!
//! # Format
//!
//! ```text
//! [grantline.TokenEndpoint:client_credentials] <ScopeConditionMismatch client_id="app" scope="admin">: requested scope is not allowed to this client
//! ```
//!
//! Attributes never carry secrets: client secrets, passwords, codes and
//! tokens stay out; assertions are reduced to a [`fingerprint`].

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

/// Endpoint category for records emitted by the token endpoint.
pub const TOKEN_ENDPOINT: &str = "TokenEndpoint";

/// Events recorded by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenEndpointLogEvent {
    /// Client credentials are missing, ambiguous, unknown or wrong.
    ClientAuthenticationFailed,
    /// Resource owner credentials were rejected.
    ResourceOwnerAuthenticationFailed,
    /// The client is not allowed to use the requested grant type.
    UnauthorizedGrantType,
    /// No handler is registered for the requested grant type.
    UnsupportedGrantType,
    /// A required request parameter is absent.
    MissingParam,
    /// A request parameter was sent more than once.
    DuplicateParam,
    /// The stored authorization does not match the request.
    AuthInfoConditionMismatch,
    /// The client registration does not allow the request.
    ClientConditionMismatch,
    /// The requested scope is not allowed.
    ScopeConditionMismatch,
    /// The refresh token does not match the request.
    RefreshTokenConditionMismatch,
    /// The JWT-bearer assertion failed validation.
    AssertionConditionMismatch,
    /// A storage method reported that it is not supported.
    InterfaceUnsupported,
    /// A storage method violated its contract or failed.
    InterfaceError,
}

impl TokenEndpointLogEvent {
    /// Returns the event name used in rendered records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientAuthenticationFailed => "ClientAuthenticationFailed",
            Self::ResourceOwnerAuthenticationFailed => "ResourceOwnerAuthenticationFailed",
            Self::UnauthorizedGrantType => "UnauthorizedGrantType",
            Self::UnsupportedGrantType => "UnsupportedGrantType",
            Self::MissingParam => "MissingParam",
            Self::DuplicateParam => "DuplicateParam",
            Self::AuthInfoConditionMismatch => "AuthInfoConditionMismatch",
            Self::ClientConditionMismatch => "ClientConditionMismatch",
            Self::ScopeConditionMismatch => "ScopeConditionMismatch",
            Self::RefreshTokenConditionMismatch => "RefreshTokenConditionMismatch",
            Self::AssertionConditionMismatch => "AssertionConditionMismatch",
            Self::InterfaceUnsupported => "InterfaceUnsupported",
            Self::InterfaceError => "InterfaceError",
        }
    }
}

impl fmt::Display for TokenEndpointLogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One structured diagnostic record.
///
/// Built with [`EndpointLog::token_endpoint`], enriched with [`attr`](Self::attr)
/// and emitted once through one of the level methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointLog {
    endpoint: &'static str,
    category: String,
    event: TokenEndpointLogEvent,
    attributes: BTreeMap<String, String>,
    message: String,
}

impl EndpointLog {
    /// Creates a token endpoint record for a grant type (or path) label.
    #[must_use]
    pub fn token_endpoint(
        category: impl Into<String>,
        event: TokenEndpointLogEvent,
        message: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: TOKEN_ENDPOINT,
            category: category.into(),
            event,
            attributes: BTreeMap::new(),
            message: message.into(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the event of this record.
    #[must_use]
    pub fn event(&self) -> TokenEndpointLogEvent {
        self.event
    }

    /// Returns the attribute value for `key`.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Emits the record at `DEBUG` level.
    pub fn debug(&self) {
        tracing::debug!(
            endpoint = self.endpoint,
            category = %self.category,
            event = %self.event,
            "{self}"
        );
    }

    /// Emits the record at `INFO` level.
    pub fn info(&self) {
        tracing::info!(
            endpoint = self.endpoint,
            category = %self.category,
            event = %self.event,
            "{self}"
        );
    }

    /// Emits the record at `WARN` level.
    pub fn warn(&self) {
        tracing::warn!(
            endpoint = self.endpoint,
            category = %self.category,
            event = %self.event,
            "{self}"
        );
    }

    /// Emits the record at `ERROR` level.
    pub fn error(&self) {
        tracing::error!(
            endpoint = self.endpoint,
            category = %self.category,
            event = %self.event,
            "{self}"
        );
    }
}

impl fmt::Display for EndpointLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[grantline.{}:{}] <{}",
            self.endpoint, self.category, self.event
        )?;
        for (key, value) in &self.attributes {
            write!(f, " {key}={value:?}")?;
        }
        write!(f, ">: {}", self.message)
    }
}

/// Reduces a credential to a short, non-reversible identifier for logs.
///
/// Returns `sha256:` followed by the first 16 hex characters of the digest.
#[must_use]
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    format!("sha256:{}", hex::encode(&digest[..8]))
}
