//! Grant type handlers.
//!
//! Each handler is an independent validation and issuance state machine
//! behind the uniform [`GrantHandler`] contract:
//! `(request, client, storage) -> Result<TokenResponse, OAuthError>`.
//! The dispatcher authenticates the client and checks that it may use the
//! grant type before a handler runs.
//!
//! Built-in handlers:
//!
//! - [`AuthorizationCode`] - `authorization_code`, with PKCE
//! - [`ClientCredentials`] - `client_credentials`
//! - [`RefreshToken`] - `refresh_token`
//! - [`Password`] - `password`
//! - [`JwtBearer`] - `urn:ietf:params:oauth:grant-type:jwt-bearer`

mod authorization_code;
mod client_credentials;
mod jwt_bearer;
mod password;
mod refresh_token;

pub use authorization_code::AuthorizationCode;
pub use client_credentials::ClientCredentials;
pub use jwt_bearer::JwtBearer;
pub use password::Password;
pub use refresh_token::RefreshToken;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OAuthError;
use crate::id_token;
use crate::log::{EndpointLog, TokenEndpointLogEvent};
use crate::request::TokenRequest;
use crate::scope;
use crate::storage::{ServiceData, StorageError, StorageMethod, StorageResult};
use crate::types::{AuthInfo, Client, Token, TokenResponse};

pub const AUTHORIZATION_CODE: &str = "authorization_code";
pub const CLIENT_CREDENTIALS: &str = "client_credentials";
pub const REFRESH_TOKEN: &str = "refresh_token";
pub const PASSWORD: &str = "password";
pub const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Names of the grant types with a built-in handler.
pub const BUILTIN_GRANT_TYPES: [&str; 5] = [
    AUTHORIZATION_CODE,
    CLIENT_CREDENTIALS,
    REFRESH_TOKEN,
    PASSWORD,
    JWT_BEARER,
];

/// A grant type handler.
#[async_trait]
pub trait GrantHandler: Send + Sync {
    /// The `grant_type` value this handler serves.
    fn grant_type(&self) -> &str;

    /// Validates the request and issues a token.
    async fn handle(
        &self,
        request: &TokenRequest,
        client: &Client,
        storage: &dyn ServiceData,
    ) -> Result<TokenResponse, OAuthError>;
}

/// Returns the built-in handler for a grant type name.
#[must_use]
pub fn builtin(grant_type: &str) -> Option<Arc<dyn GrantHandler>> {
    let handler: Arc<dyn GrantHandler> = match grant_type {
        AUTHORIZATION_CODE => Arc::new(AuthorizationCode::default()),
        CLIENT_CREDENTIALS => Arc::new(ClientCredentials),
        REFRESH_TOKEN => Arc::new(RefreshToken),
        PASSWORD => Arc::new(Password),
        JWT_BEARER => Arc::new(JwtBearer::default()),
        _ => return None,
    };
    Some(handler)
}

// =============================================================================
// Shared steps
// =============================================================================

/// Returns a required parameter or a logged `invalid_request`.
pub(crate) fn require_param<'a>(
    grant_type: &str,
    request: &'a TokenRequest,
    name: &str,
) -> Result<&'a str, OAuthError> {
    request.param(name).ok_or_else(|| {
        EndpointLog::token_endpoint(
            grant_type,
            TokenEndpointLogEvent::MissingParam,
            format!("'{name}' not found"),
        )
        .attr("param", name)
        .debug();
        OAuthError::missing_param(name)
    })
}

fn not_found_event(method: StorageMethod) -> TokenEndpointLogEvent {
    match method {
        StorageMethod::FindClient => TokenEndpointLogEvent::ClientAuthenticationFailed,
        StorageMethod::FindUserId => TokenEndpointLogEvent::ResourceOwnerAuthenticationFailed,
        StorageMethod::FindUserIdBySubject => TokenEndpointLogEvent::AssertionConditionMismatch,
        StorageMethod::FindAuthInfoByRefreshToken
        | StorageMethod::FindAccessTokenByRefreshToken
        | StorageMethod::RefreshAccessToken => TokenEndpointLogEvent::RefreshTokenConditionMismatch,
        StorageMethod::FindAuthInfoByCode
        | StorageMethod::CreateOrUpdateAuthInfo
        | StorageMethod::CreateAccessToken
        | StorageMethod::Issuer => TokenEndpointLogEvent::AuthInfoConditionMismatch,
    }
}

/// Classifies a storage outcome.
///
/// `NotFound` is client-caused and becomes `invalid_grant`; every other
/// failure, including the empty `Ok(None)` result, becomes `server_error`
/// with a warning naming the method.
pub(crate) fn storage_result<T>(
    grant_type: &str,
    method: StorageMethod,
    client_id: &str,
    result: StorageResult<T>,
) -> Result<T, OAuthError> {
    match result {
        Ok(Some(value)) => Ok(value),
        Err(StorageError::NotFound) => {
            EndpointLog::token_endpoint(
                grant_type,
                not_found_event(method),
                "the method returns 'not found' error.",
            )
            .attr("method", method.as_str())
            .attr("client_id", client_id)
            .info();
            Err(OAuthError::simple(crate::error::ErrorKind::InvalidGrant))
        }
        Err(StorageError::Unsupported) => {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::InterfaceUnsupported,
                "the method returns 'unsupported' error.",
            )
            .attr("method", method.as_str())
            .warn();
            Err(OAuthError::server_error())
        }
        Err(StorageError::Failure { message }) => {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::InterfaceError,
                "the method failed.",
            )
            .attr("method", method.as_str())
            .attr("reason", message)
            .warn();
            Err(OAuthError::server_error())
        }
        Ok(None) => {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::InterfaceError,
                "the method returns an empty result.",
            )
            .attr("method", method.as_str())
            .warn();
            Err(OAuthError::server_error())
        }
    }
}

/// Rejects a requested scope the client may not use.
pub(crate) fn check_client_scope(
    grant_type: &str,
    client: &Client,
    requested: Option<&str>,
) -> Result<(), OAuthError> {
    match requested {
        Some(requested) if !client.can_use_scope(requested) => {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::ScopeConditionMismatch,
                "requested scope is not allowed to this client",
            )
            .attr("scope", requested)
            .attr("client_id", client.id.as_str())
            .info();
            Err(OAuthError::simple(crate::error::ErrorKind::InvalidScope))
        }
        _ => Ok(()),
    }
}

/// Issues a token for a grant, requesting a refresh token when the granted
/// scope includes `offline_access`.
pub(crate) async fn issue_token(
    grant_type: &str,
    client: &Client,
    info: &AuthInfo,
    storage: &dyn ServiceData,
) -> Result<Token, OAuthError> {
    let include_offline = scope::include_offline_access(&info.scope);
    storage_result(
        grant_type,
        StorageMethod::CreateAccessToken,
        &client.id,
        storage.create_access_token(info, include_offline).await,
    )
}

/// Builds the success body: access token, non-empty scope, non-empty
/// refresh token.
pub(crate) fn token_response(token: &Token, scope: &str) -> TokenResponse {
    TokenResponse::new(&token.access_token, token.access_token_expires_in)
        .with_scope(scope)
        .with_refresh_token(token.refresh_token())
}

/// Attaches an ID token when the granted scope includes `openid`.
pub(crate) fn with_id_token(
    grant_type: &str,
    response: TokenResponse,
    client: &Client,
    info: &AuthInfo,
    storage: &dyn ServiceData,
) -> Result<TokenResponse, OAuthError> {
    if !scope::include_openid(&info.scope) {
        return Ok(response);
    }

    let issuer = storage.issuer();
    if issuer.is_empty() {
        EndpointLog::token_endpoint(
            grant_type,
            TokenEndpointLogEvent::InterfaceUnsupported,
            "the method returns an empty issuer.",
        )
        .attr("method", StorageMethod::Issuer.as_str())
        .error();
        return Err(OAuthError::server_error());
    }

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    match id_token::mint(client.id_token.as_ref(), &issuer, info, now) {
        Ok(token) => Ok(response.with_id_token(token)),
        Err(e) => {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::ClientConditionMismatch,
                "failed to mint ID token",
            )
            .attr("client_id", client.id.as_str())
            .attr("reason", e.to_string())
            .error();
            Err(OAuthError::server_error())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Configurable storage double for handler tests.

    use std::sync::Mutex;

    use super::*;

    /// Each field answers the matching capability method.
    pub struct StubStorage {
        pub issuer: String,
        pub user_id: StorageResult<i64>,
        pub auth_info: StorageResult<AuthInfo>,
        pub refresh_info: StorageResult<AuthInfo>,
        pub refresh_token: StorageResult<Token>,
        pub created_info: StorageResult<AuthInfo>,
        pub token: StorageResult<Token>,
        pub calls: Mutex<Vec<(StorageMethod, bool)>>,
    }

    impl StubStorage {
        pub fn new() -> Self {
            Self {
                issuer: "example.org".to_string(),
                user_id: Err(StorageError::Unsupported),
                auth_info: Err(StorageError::Unsupported),
                refresh_info: Err(StorageError::Unsupported),
                refresh_token: Err(StorageError::Unsupported),
                created_info: Err(StorageError::Unsupported),
                token: Ok(Some(token(Some("REFRESH_TOKEN_0")))),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Recorded `(method, include_offline)` pairs for issuance calls.
        pub fn issued(&self) -> Vec<(StorageMethod, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub fn token(refresh_token: Option<&str>) -> Token {
        Token {
            auth_info_id: 1,
            access_token: "ACCESS_TOKEN_0".to_string(),
            access_token_expires_in: 86400,
            refresh_token: refresh_token.map(str::to_string),
            refresh_token_expires_in: 86400 * 30,
            scope: String::new(),
            created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn client() -> Client {
        Client::new("client_id_01", 0)
            .with_redirect_uri("http://example.org/callback")
            .with_id_token_signing(crate::types::IdTokenSigning {
                algorithm: jsonwebtoken::Algorithm::HS256,
                key: "id-token-secret".to_string(),
                key_id: Some("k1".to_string()),
            })
    }

    #[async_trait]
    impl ServiceData for StubStorage {
        async fn find_user_id(&self, _username: &str, _password: &str) -> StorageResult<i64> {
            self.user_id.clone()
        }

        async fn find_user_id_by_subject(&self, _client: &Client, _subject: &str) -> StorageResult<i64> {
            self.user_id.clone()
        }

        async fn find_auth_info_by_code(&self, _code: &str) -> StorageResult<AuthInfo> {
            self.auth_info.clone()
        }

        async fn find_auth_info_by_refresh_token(&self, _refresh_token: &str) -> StorageResult<AuthInfo> {
            self.refresh_info.clone()
        }

        async fn find_access_token_by_refresh_token(&self, _refresh_token: &str) -> StorageResult<Token> {
            self.refresh_token.clone()
        }

        async fn create_or_update_auth_info(
            &self,
            user_id: i64,
            client_id: &str,
            scope: &str,
        ) -> StorageResult<AuthInfo> {
            match &self.created_info {
                Ok(Some(_)) => {
                    let mut info = AuthInfo::new(user_id, client_id, scope);
                    info.id_token_expires_in = 3600;
                    Ok(Some(info))
                }
                other => other.clone(),
            }
        }

        async fn create_access_token(&self, _info: &AuthInfo, include_offline: bool) -> StorageResult<Token> {
            self.calls
                .lock()
                .unwrap()
                .push((StorageMethod::CreateAccessToken, include_offline));
            self.token.clone()
        }

        async fn refresh_access_token(
            &self,
            _info: &AuthInfo,
            _old: &Token,
            include_offline: bool,
        ) -> StorageResult<Token> {
            self.calls
                .lock()
                .unwrap()
                .push((StorageMethod::RefreshAccessToken, include_offline));
            self.token.clone()
        }

        fn issuer(&self) -> String {
            self.issuer.clone()
        }
    }
}
