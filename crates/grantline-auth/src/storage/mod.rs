//! Storage capability consumed by the token endpoint.
//!
//! The endpoint never owns persistent state. Every lookup and issuance goes
//! through [`ServiceData`], whose methods return a classified
//! [`StorageResult`]:
//!
//! | Outcome                          | Meaning                                      |
//! |----------------------------------|----------------------------------------------|
//! | `Ok(Some(value))`                | success                                      |
//! | `Err(StorageError::NotFound)`    | record missing or rejected (client-caused)   |
//! | `Err(StorageError::Unsupported)` | method not implemented by this deployment    |
//! | `Err(StorageError::Failure{..})` | backend failure                              |
//! | `Ok(None)`                       | contract violation, treated as server error  |
//!
//! Cross-call atomicity (single-use codes, refresh rotation) is the
//! implementation's responsibility.
//!
//! # Implementations
//!
//! - [`MemoryStorage`] - in-process DashMap store for development and tests

mod memory;

pub use memory::{MemoryStorage, TokenLifetimes};

use async_trait::async_trait;

use crate::types::{AuthInfo, Client, Token};

// =============================================================================
// Errors
// =============================================================================

/// Classified storage failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The record does not exist or was rejected.
    #[error("not found")]
    NotFound,

    /// The method is not implemented by this deployment.
    #[error("unsupported")]
    Unsupported,

    /// The backend failed.
    #[error("storage failure: {message}")]
    Failure {
        /// Backend diagnostic, never shown to clients.
        message: String,
    },
}

impl StorageError {
    /// Creates a `Failure` error.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }
}

/// Storage method outcome. `Ok(None)` is the empty-result contract violation.
pub type StorageResult<T> = Result<Option<T>, StorageError>;

/// Names of the capability methods, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageMethod {
    FindClient,
    FindUserId,
    FindUserIdBySubject,
    FindAuthInfoByCode,
    FindAuthInfoByRefreshToken,
    FindAccessTokenByRefreshToken,
    CreateOrUpdateAuthInfo,
    CreateAccessToken,
    RefreshAccessToken,
    Issuer,
}

impl StorageMethod {
    /// Returns the method name as logged.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindClient => "FindClient",
            Self::FindUserId => "FindUserId",
            Self::FindUserIdBySubject => "FindUserIdBySubject",
            Self::FindAuthInfoByCode => "FindAuthInfoByCode",
            Self::FindAuthInfoByRefreshToken => "FindAuthInfoByRefreshToken",
            Self::FindAccessTokenByRefreshToken => "FindAccessTokenByRefreshToken",
            Self::CreateOrUpdateAuthInfo => "CreateOrUpdateAuthInfo",
            Self::CreateAccessToken => "CreateAccessToken",
            Self::RefreshAccessToken => "RefreshAccessToken",
            Self::Issuer => "Issuer",
        }
    }
}

impl std::fmt::Display for StorageMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Capability
// =============================================================================

/// Storage operations needed by the token endpoint.
///
/// Every method except [`issuer`](Self::issuer) defaults to
/// `Err(StorageError::Unsupported)`, so a deployment implements only what its
/// registered grant types call.
#[async_trait]
pub trait ServiceData: Send + Sync {
    /// Find a client by id.
    async fn find_client(&self, _client_id: &str) -> StorageResult<Client> {
        Err(StorageError::Unsupported)
    }

    /// Authenticate a resource owner by username and password.
    ///
    /// Wrong credentials are `NotFound`.
    async fn find_user_id(&self, _username: &str, _password: &str) -> StorageResult<i64> {
        Err(StorageError::Unsupported)
    }

    /// Map an assertion subject to a user for the presenting client.
    async fn find_user_id_by_subject(&self, _client: &Client, _subject: &str) -> StorageResult<i64> {
        Err(StorageError::Unsupported)
    }

    /// Find the grant an unexpired authorization code belongs to.
    async fn find_auth_info_by_code(&self, _code: &str) -> StorageResult<AuthInfo> {
        Err(StorageError::Unsupported)
    }

    /// Find the grant a refresh token belongs to.
    async fn find_auth_info_by_refresh_token(&self, _refresh_token: &str) -> StorageResult<AuthInfo> {
        Err(StorageError::Unsupported)
    }

    /// Find the token record a refresh token was issued with.
    async fn find_access_token_by_refresh_token(&self, _refresh_token: &str) -> StorageResult<Token> {
        Err(StorageError::Unsupported)
    }

    /// Create or update the grant keyed by (user, client) without a code.
    async fn create_or_update_auth_info(
        &self,
        _user_id: i64,
        _client_id: &str,
        _scope: &str,
    ) -> StorageResult<AuthInfo> {
        Err(StorageError::Unsupported)
    }

    /// Issue a token for a grant. A refresh token is included only when
    /// `include_offline` is set.
    ///
    /// If `info` carries an authorization code, the implementation must
    /// invalidate it atomically and answer `NotFound` on a second use.
    async fn create_access_token(&self, _info: &AuthInfo, _include_offline: bool) -> StorageResult<Token> {
        Err(StorageError::Unsupported)
    }

    /// Issue a new token from a refresh token, retiring `old`.
    async fn refresh_access_token(
        &self,
        _info: &AuthInfo,
        _old: &Token,
        _include_offline: bool,
    ) -> StorageResult<Token> {
        Err(StorageError::Unsupported)
    }

    /// The service's issuer identifier. Empty means misconfigured.
    fn issuer(&self) -> String;
}
