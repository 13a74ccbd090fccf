//! `password` grant (RFC 6749 Section 4.3).

use async_trait::async_trait;

use super::{
    GrantHandler, PASSWORD, check_client_scope, issue_token, require_param, storage_result,
    token_response, with_id_token,
};
use crate::error::OAuthError;
use crate::request::TokenRequest;
use crate::storage::{ServiceData, StorageMethod};
use crate::types::{Client, TokenResponse};

/// Resource owner password credentials.
///
/// The resource owner is an end-user, so `openid` yields an ID token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Password;

#[async_trait]
impl GrantHandler for Password {
    fn grant_type(&self) -> &str {
        PASSWORD
    }

    async fn handle(
        &self,
        request: &TokenRequest,
        client: &Client,
        storage: &dyn ServiceData,
    ) -> Result<TokenResponse, OAuthError> {
        let username = require_param(PASSWORD, request, "username")?;
        let password = require_param(PASSWORD, request, "password")?;

        let user_id = storage_result(
            PASSWORD,
            StorageMethod::FindUserId,
            &client.id,
            storage.find_user_id(username, password).await,
        )?;

        let requested = request.param("scope");
        check_client_scope(PASSWORD, client, requested)?;

        let info = storage_result(
            PASSWORD,
            StorageMethod::CreateOrUpdateAuthInfo,
            &client.id,
            storage
                .create_or_update_auth_info(user_id, &client.id, requested.unwrap_or_default())
                .await,
        )?;

        let token = issue_token(PASSWORD, client, &info, storage).await?;
        let response = token_response(&token, &info.scope);
        with_id_token(PASSWORD, response, client, &info, storage)
    }
}
