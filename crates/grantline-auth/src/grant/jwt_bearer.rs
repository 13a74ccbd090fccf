//! JWT-bearer assertion grant (RFC 7523 Section 2.1).

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    GrantHandler, JWT_BEARER, check_client_scope, issue_token, require_param, storage_result,
    token_response,
};
use crate::assertion::{AssertionDecoder, JwtAssertionDecoder, check_assertion};
use crate::error::OAuthError;
use crate::log::{EndpointLog, TokenEndpointLogEvent};
use crate::request::TokenRequest;
use crate::storage::{ServiceData, StorageMethod};
use crate::types::{Client, TokenResponse};

/// Exchanges a signed assertion for an access token.
///
/// The assertion's `sub` names the resource owner; `aud` must be the issuer.
#[derive(Clone)]
pub struct JwtBearer {
    decoder: Arc<dyn AssertionDecoder>,
}

impl JwtBearer {
    /// Creates the handler with a custom decoder.
    #[must_use]
    pub fn with_decoder(decoder: Arc<dyn AssertionDecoder>) -> Self {
        Self { decoder }
    }
}

impl Default for JwtBearer {
    fn default() -> Self {
        Self::with_decoder(Arc::new(JwtAssertionDecoder::default()))
    }
}

impl std::fmt::Debug for JwtBearer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtBearer").finish_non_exhaustive()
    }
}

#[async_trait]
impl GrantHandler for JwtBearer {
    fn grant_type(&self) -> &str {
        JWT_BEARER
    }

    async fn handle(
        &self,
        request: &TokenRequest,
        client: &Client,
        storage: &dyn ServiceData,
    ) -> Result<TokenResponse, OAuthError> {
        let assertion = require_param(JWT_BEARER, request, "assertion")?;

        let decoded = self.decoder.decode(assertion, client);
        let token = check_assertion(assertion, &decoded, JWT_BEARER, client, storage)?;

        let Some(subject) = token.string_claim("sub") else {
            EndpointLog::token_endpoint(
                JWT_BEARER,
                TokenEndpointLogEvent::MissingParam,
                "'sub' not found in assertion",
            )
            .attr("param", "sub")
            .attr("client_id", client.id.as_str())
            .debug();
            return Err(OAuthError::invalid_request("'sub' parameter not found in assertion"));
        };

        let user_id = storage_result(
            JWT_BEARER,
            StorageMethod::FindUserIdBySubject,
            &client.id,
            storage.find_user_id_by_subject(client, subject).await,
        )?;

        let requested = request.param("scope");
        check_client_scope(JWT_BEARER, client, requested)?;

        let info = storage_result(
            JWT_BEARER,
            StorageMethod::CreateOrUpdateAuthInfo,
            &client.id,
            storage
                .create_or_update_auth_info(user_id, &client.id, requested.unwrap_or_default())
                .await,
        )?;

        let issued = issue_token(JWT_BEARER, client, &info, storage).await?;
        Ok(token_response(&issued, &info.scope))
    }
}
