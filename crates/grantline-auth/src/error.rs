//! Token endpoint error types.
//!
//! Every externally visible failure of the token endpoint is an [`OAuthError`]:
//! one RFC 6749 §5.2 error code plus an optional human-readable description.
//! Collaborator failures are reclassified into one of these kinds at the
//! boundary and never passed through raw.

use std::fmt;

use serde::{Deserialize, Serialize};

/// OAuth 2.0 token endpoint error codes.
///
/// Defined in RFC 6749 Section 5.2, plus `server_error` for collaborator
/// misbehaviour and misconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request is missing a required parameter, includes a parameter more
    /// than once, or sends client credentials through more than one channel.
    InvalidRequest,

    /// Client authentication failed.
    InvalidClient,

    /// The authorization grant, refresh token, assertion or PKCE challenge is
    /// invalid, expired, or was issued to another client.
    InvalidGrant,

    /// The requested scope exceeds what the client or the grant allows.
    InvalidScope,

    /// The authenticated client is not allowed to use this grant type.
    UnauthorizedClient,

    /// No handler is registered for the requested grant type.
    UnsupportedGrantType,

    /// A collaborator failed or the service is misconfigured.
    ServerError,
}

impl ErrorKind {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::InvalidScope
            | Self::UnsupportedGrantType => 400,
            Self::InvalidClient | Self::UnauthorizedClient => 401,
            Self::ServerError => 500,
        }
    }

    /// Returns `true` for errors caused by the client's request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ServerError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A protocol error returned by the token endpoint.
///
/// Serializes directly to the RFC 6749 error body:
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "invalid 'code_challenge': 'A9Mel...'"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}")]
pub struct OAuthError {
    /// OAuth 2.0 error code.
    #[serde(rename = "error")]
    kind: ErrorKind,

    /// Human-readable error description.
    #[serde(rename = "error_description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl OAuthError {
    /// Creates an error carrying a description.
    #[must_use]
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: Some(description.into()),
        }
    }

    /// Creates an error without a description.
    #[must_use]
    pub fn simple(kind: ErrorKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    /// Creates an `invalid_request` error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, description)
    }

    /// Creates an `invalid_request` error for a missing parameter.
    ///
    /// The description reads `missing '<name>' parameter`.
    #[must_use]
    pub fn missing_param(name: &str) -> Self {
        Self::invalid_request(format!("missing '{name}' parameter"))
    }

    /// Creates an `invalid_client` error.
    #[must_use]
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidClient, description)
    }

    /// Creates an `invalid_grant` error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidGrant, description)
    }

    /// Creates an `invalid_scope` error.
    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidScope, description)
    }

    /// Creates an `unauthorized_client` error.
    #[must_use]
    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnauthorizedClient, description)
    }

    /// Creates an `unsupported_grant_type` error.
    #[must_use]
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedGrantType, description)
    }

    /// Creates a `server_error` without a description.
    ///
    /// Server errors never describe the underlying collaborator failure to
    /// the client.
    #[must_use]
    pub fn server_error() -> Self {
        Self::simple(ErrorKind::ServerError)
    }

    /// Returns the error code.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the HTTP status code derived from the error code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}

impl From<ErrorKind> for OAuthError {
    fn from(kind: ErrorKind) -> Self {
        Self::simple(kind)
    }
}
