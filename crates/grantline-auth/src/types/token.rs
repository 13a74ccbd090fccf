//! Issued tokens and the token endpoint success body.

use serde::{Deserialize, Serialize};

/// Token type reported in every success response.
pub const BEARER: &str = "Bearer";

/// An access token, optionally paired with a refresh token.
///
/// Created by the storage capability per issuance and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Grant record the token was issued from.
    pub auth_info_id: i64,

    /// Opaque access token.
    pub access_token: String,

    /// Access token lifetime in seconds.
    pub access_token_expires_in: i64,

    /// Opaque refresh token.
    pub refresh_token: Option<String>,

    /// Refresh token lifetime in seconds.
    pub refresh_token_expires_in: i64,

    /// Scope the access token carries.
    pub scope: String,

    /// Issuance time (Unix seconds).
    pub created_at: i64,
}

impl Token {
    /// Returns the refresh token when present and non-empty.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Returns `true` once `created_at + refresh_token_expires_in < now`.
    #[must_use]
    pub fn is_refresh_token_expired(&self, now: i64) -> bool {
        self.created_at.saturating_add(self.refresh_token_expires_in) < now
    }
}

/// Token endpoint success body (RFC 6749 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: i64,

    /// Refresh token, when issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// OpenID Connect ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Creates a bearer response carrying only the access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_in: i64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: BEARER.to_string(),
            expires_in,
            refresh_token: None,
            scope: None,
            id_token: None,
        }
    }

    /// Sets the scope unless it is empty.
    #[must_use]
    pub fn with_scope(mut self, scope: &str) -> Self {
        if !scope.is_empty() {
            self.scope = Some(scope.to_string());
        }
        self
    }

    /// Sets the refresh token unless it is absent or empty.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<&str>) -> Self {
        self.refresh_token = refresh_token
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    /// Sets the ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: String) -> Self {
        self.id_token = Some(id_token);
        self
    }
}
