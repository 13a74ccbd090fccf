//! `client_credentials` grant (RFC 6749 Section 4.4).

use async_trait::async_trait;

use super::{
    CLIENT_CREDENTIALS, GrantHandler, check_client_scope, issue_token, storage_result,
    token_response,
};
use crate::error::{ErrorKind, OAuthError};
use crate::log::{EndpointLog, TokenEndpointLogEvent};
use crate::request::TokenRequest;
use crate::storage::{ServiceData, StorageMethod};
use crate::types::{Client, TokenResponse};

/// Issues tokens to a client acting on behalf of its owning user.
///
/// No ID token: the grant has no end-user authentication event.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCredentials;

#[async_trait]
impl GrantHandler for ClientCredentials {
    fn grant_type(&self) -> &str {
        CLIENT_CREDENTIALS
    }

    async fn handle(
        &self,
        request: &TokenRequest,
        client: &Client,
        storage: &dyn ServiceData,
    ) -> Result<TokenResponse, OAuthError> {
        if !client.has_owner() {
            EndpointLog::token_endpoint(
                CLIENT_CREDENTIALS,
                TokenEndpointLogEvent::ClientConditionMismatch,
                "client has no owner user.",
            )
            .attr("client_id", client.id.as_str())
            .info();
            return Err(OAuthError::simple(ErrorKind::InvalidGrant));
        }

        let requested = request.param("scope");
        check_client_scope(CLIENT_CREDENTIALS, client, requested)?;

        let info = storage_result(
            CLIENT_CREDENTIALS,
            StorageMethod::CreateOrUpdateAuthInfo,
            &client.id,
            storage
                .create_or_update_auth_info(client.owner_user_id, &client.id, requested.unwrap_or_default())
                .await,
        )?;

        let token = issue_token(CLIENT_CREDENTIALS, client, &info, storage).await?;
        Ok(token_response(&token, &info.scope))
    }
}
