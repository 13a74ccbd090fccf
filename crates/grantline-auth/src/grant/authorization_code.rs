//! `authorization_code` grant (RFC 6749 Section 4.1.3, RFC 7636).

use async_trait::async_trait;

use super::{
    AUTHORIZATION_CODE, GrantHandler, issue_token, require_param, storage_result, token_response,
    with_id_token,
};
use crate::error::{ErrorKind, OAuthError};
use crate::log::{EndpointLog, TokenEndpointLogEvent};
use crate::pkce::VerifierRegistry;
use crate::request::TokenRequest;
use crate::storage::{ServiceData, StorageMethod};
use crate::types::{AuthInfo, Client, TokenResponse};

/// Exchanges an authorization code for tokens.
///
/// When the stored grant carries a PKCE code verifier the request must send
/// `code_challenge_method` and `code_challenge`, checked by the verifier
/// registered for that method.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationCode {
    verifiers: VerifierRegistry,
}

impl AuthorizationCode {
    /// Creates the handler with a custom PKCE registry.
    #[must_use]
    pub fn with_verifiers(verifiers: VerifierRegistry) -> Self {
        Self { verifiers }
    }

    fn check_pkce(&self, request: &TokenRequest, client: &Client, verifier: &str) -> Result<(), OAuthError> {
        let method = require_param(AUTHORIZATION_CODE, request, "code_challenge_method")?;
        let challenge = require_param(AUTHORIZATION_CODE, request, "code_challenge")?;

        let code_verifier = self.verifiers.find(method).map_err(|_| {
            EndpointLog::token_endpoint(
                AUTHORIZATION_CODE,
                TokenEndpointLogEvent::AuthInfoConditionMismatch,
                "unsupported 'code_challenge_method'",
            )
            .attr("code_challenge_method", method)
            .attr("client_id", client.id.as_str())
            .debug();
            OAuthError::invalid_request(format!("unsupported 'code_challenge_method': '{method}'"))
        })?;

        if !code_verifier.verify(challenge, verifier) {
            EndpointLog::token_endpoint(
                AUTHORIZATION_CODE,
                TokenEndpointLogEvent::AuthInfoConditionMismatch,
                "'code_challenge' mismatch.",
            )
            .attr("client_id", client.id.as_str())
            .info();
            return Err(OAuthError::invalid_grant(format!(
                "invalid 'code_challenge': '{challenge}'"
            )));
        }
        Ok(())
    }

    fn check_binding(info: &AuthInfo, client: &Client, redirect_uri: &str) -> Result<(), OAuthError> {
        if info.client_id != client.id {
            EndpointLog::token_endpoint(
                AUTHORIZATION_CODE,
                TokenEndpointLogEvent::AuthInfoConditionMismatch,
                "'client_id' mismatch.",
            )
            .attr("client_id", client.id.as_str())
            .info();
            return Err(OAuthError::simple(ErrorKind::InvalidGrant));
        }

        if info.redirect_uri != redirect_uri {
            EndpointLog::token_endpoint(
                AUTHORIZATION_CODE,
                TokenEndpointLogEvent::AuthInfoConditionMismatch,
                "'redirect_uri' mismatch.",
            )
            .attr("client_id", client.id.as_str())
            .attr("redirect_uri", redirect_uri)
            .info();
            return Err(OAuthError::invalid_grant(format!(
                "indicated 'redirect_uri' ({redirect_uri}) is not allowed for this client"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantHandler for AuthorizationCode {
    fn grant_type(&self) -> &str {
        AUTHORIZATION_CODE
    }

    async fn handle(
        &self,
        request: &TokenRequest,
        client: &Client,
        storage: &dyn ServiceData,
    ) -> Result<TokenResponse, OAuthError> {
        let redirect_uri = require_param(AUTHORIZATION_CODE, request, "redirect_uri")?;
        let code = require_param(AUTHORIZATION_CODE, request, "code")?;

        let info = storage_result(
            AUTHORIZATION_CODE,
            StorageMethod::FindAuthInfoByCode,
            &client.id,
            storage.find_auth_info_by_code(code).await,
        )?;

        Self::check_binding(&info, client, redirect_uri)?;

        if let Some(verifier) = info.code_verifier() {
            self.check_pkce(request, client, verifier)?;
        }

        let token = issue_token(AUTHORIZATION_CODE, client, &info, storage).await?;
        let response = token_response(&token, &info.scope);
        with_id_token(AUTHORIZATION_CODE, response, client, &info, storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::testing::{StubStorage, client, token};
    use crate::id_token::IdTokenClaims;
    use crate::storage::StorageError;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    fn info(scope: &str, verifier: Option<&str>) -> AuthInfo {
        let mut info = AuthInfo::new(0, "client_id_01", scope);
        info.redirect_uri = "http://example.org/callback".to_string();
        info.code = Some("code_value".to_string());
        info.code_verifier = verifier.map(str::to_string);
        info.nonce = "07dfa90f".to_string();
        info.id_token_expires_in = 86400;
        info
    }

    fn storage_with(info: AuthInfo) -> StubStorage {
        let mut storage = StubStorage::new();
        storage.auth_info = Ok(Some(info));
        storage
    }

    fn request(extra: &[(&str, &str)]) -> TokenRequest {
        let mut pairs = vec![
            ("grant_type", "authorization_code"),
            ("code", "code_value"),
            ("redirect_uri", "http://example.org/callback"),
        ];
        pairs.extend_from_slice(extra);
        TokenRequest::from_pairs(pairs)
    }

    async fn run(storage: &StubStorage, request: &TokenRequest) -> Result<TokenResponse, OAuthError> {
        AuthorizationCode::default()
            .handle(request, &client(), storage)
            .await
    }

    #[tokio::test]
    async fn test_missing_redirect_uri_and_code() {
        let storage = storage_with(info("openid", None));

        let request = TokenRequest::from_pairs([("code", "code_value")]);
        assert_eq!(
            run(&storage, &request).await,
            Err(OAuthError::invalid_request("missing 'redirect_uri' parameter"))
        );

        let request = TokenRequest::from_pairs([("redirect_uri", "http://example.org/callback")]);
        assert_eq!(
            run(&storage, &request).await,
            Err(OAuthError::invalid_request("missing 'code' parameter"))
        );
    }

    #[tokio::test]
    async fn test_storage_outcomes() {
        let mut storage = StubStorage::new();
        storage.auth_info = Err(StorageError::NotFound);
        assert_eq!(
            run(&storage, &request(&[])).await.unwrap_err().kind(),
            ErrorKind::InvalidGrant
        );

        storage.auth_info = Err(StorageError::Unsupported);
        assert_eq!(run(&storage, &request(&[])).await, Err(OAuthError::server_error()));

        storage.auth_info = Ok(None);
        assert_eq!(run(&storage, &request(&[])).await, Err(OAuthError::server_error()));
    }

    #[tokio::test]
    async fn test_client_mismatch() {
        let mut other = info("openid", None);
        other.client_id = "client_id_02".to_string();
        let storage = storage_with(other);
        assert_eq!(
            run(&storage, &request(&[])).await,
            Err(OAuthError::simple(ErrorKind::InvalidGrant))
        );
    }

    #[tokio::test]
    async fn test_redirect_uri_mismatch() {
        let storage = storage_with(info("openid", None));
        let request = TokenRequest::from_pairs([
            ("code", "code_value"),
            ("redirect_uri", "http://example.org/other"),
        ]);
        assert_eq!(
            run(&storage, &request).await,
            Err(OAuthError::invalid_grant(
                "indicated 'redirect_uri' (http://example.org/other) is not allowed for this client"
            ))
        );
    }

    #[tokio::test]
    async fn test_pkce_parameter_errors() {
        let storage = storage_with(info("openid", Some(VERIFIER)));

        assert_eq!(
            run(&storage, &request(&[("code_challenge", CHALLENGE)])).await,
            Err(OAuthError::invalid_request("missing 'code_challenge_method' parameter"))
        );
        assert_eq!(
            run(&storage, &request(&[("code_challenge_method", "plain")])).await,
            Err(OAuthError::invalid_request("missing 'code_challenge' parameter"))
        );
        assert_eq!(
            run(
                &storage,
                &request(&[("code_challenge_method", "unknown"), ("code_challenge", CHALLENGE)])
            )
            .await,
            Err(OAuthError::invalid_request("unsupported 'code_challenge_method': 'unknown'"))
        );
    }

    #[tokio::test]
    async fn test_pkce_challenge_mismatch() {
        let storage = storage_with(info("openid", Some(VERIFIER)));
        let altered = "A9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(
            run(
                &storage,
                &request(&[("code_challenge_method", "S256"), ("code_challenge", altered)])
            )
            .await,
            Err(OAuthError::invalid_grant(format!("invalid 'code_challenge': '{altered}'")))
        );
        assert!(storage.issued().is_empty());
    }

    #[tokio::test]
    async fn test_pkce_s256_and_plain_accepted() {
        let storage = storage_with(info("openid profile offline_access", Some(VERIFIER)));

        let response = run(
            &storage,
            &request(&[("code_challenge_method", "S256"), ("code_challenge", CHALLENGE)]),
        )
        .await
        .unwrap();
        assert_eq!(response.access_token, "ACCESS_TOKEN_0");
        assert_eq!(response.refresh_token.as_deref(), Some("REFRESH_TOKEN_0"));
        assert_eq!(response.expires_in, 86400);
        assert_eq!(response.scope.as_deref(), Some("openid profile offline_access"));

        let response = run(
            &storage,
            &request(&[("code_challenge_method", "plain"), ("code_challenge", VERIFIER)]),
        )
        .await
        .unwrap();
        assert!(response.id_token.is_some());
    }

    #[tokio::test]
    async fn test_pkce_ignored_without_stored_verifier() {
        let storage = storage_with(info("profile", None));
        let response = run(&storage, &request(&[])).await.unwrap();
        assert_eq!(response.id_token, None);
    }

    #[tokio::test]
    async fn test_offline_access_flag_follows_scope() {
        let storage = storage_with(info("openid offline_access", None));
        run(&storage, &request(&[])).await.unwrap();

        let mut storage = storage_with(info("openid", None));
        storage.token = Ok(Some(token(None)));
        let response = run(&storage, &request(&[])).await.unwrap();
        assert_eq!(response.refresh_token, None);

        assert_eq!(
            storage.issued(),
            vec![(StorageMethod::CreateAccessToken, false)]
        );
    }

    #[tokio::test]
    async fn test_id_token_claims() {
        let storage = storage_with(info("openid profile", None));
        let response = run(&storage, &request(&[])).await.unwrap();
        let id_token = response.id_token.unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["client_id_01"]);
        let claims = jsonwebtoken::decode::<IdTokenClaims>(
            &id_token,
            &DecodingKey::from_secret(b"id-token-secret"),
            &validation,
        )
        .unwrap()
        .claims;
        assert_eq!(claims.iss, "example.org");
        assert_eq!(claims.sub, "0");
        assert_eq!(claims.aud, "client_id_01");
        assert_eq!(claims.nonce.as_deref(), Some("07dfa90f"));
    }

    #[tokio::test]
    async fn test_id_token_failures_are_server_errors() {
        let mut storage = storage_with(info("openid", None));
        storage.issuer = String::new();
        assert_eq!(run(&storage, &request(&[])).await, Err(OAuthError::server_error()));

        let storage = storage_with(info("openid", None));
        let keyless = Client::new("client_id_01", 0);
        assert_eq!(
            AuthorizationCode::default()
                .handle(&request(&[]), &keyless, &storage)
                .await,
            Err(OAuthError::server_error())
        );
    }

    #[tokio::test]
    async fn test_token_storage_outcomes() {
        let mut storage = storage_with(info("openid", None));
        storage.token = Err(StorageError::NotFound);
        assert_eq!(
            run(&storage, &request(&[])).await.unwrap_err().kind(),
            ErrorKind::InvalidGrant
        );

        storage.token = Ok(None);
        assert_eq!(run(&storage, &request(&[])).await, Err(OAuthError::server_error()));
    }
}
