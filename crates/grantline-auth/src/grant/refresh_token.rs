//! `refresh_token` grant (RFC 6749 Section 6).

use async_trait::async_trait;

use super::{GrantHandler, REFRESH_TOKEN, require_param, storage_result};
use crate::error::{ErrorKind, OAuthError};
use crate::log::{EndpointLog, TokenEndpointLogEvent};
use crate::request::TokenRequest;
use crate::scope;
use crate::storage::{ServiceData, StorageMethod};
use crate::types::{Client, TokenResponse};

/// Renews an access token from a refresh token.
///
/// An optional `scope` may narrow the original grant; it is echoed in the
/// response only in that case. A new refresh token is issued only while the
/// granted scope keeps `offline_access`. No ID token is issued on refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshToken;

#[async_trait]
impl GrantHandler for RefreshToken {
    fn grant_type(&self) -> &str {
        REFRESH_TOKEN
    }

    async fn handle(
        &self,
        request: &TokenRequest,
        client: &Client,
        storage: &dyn ServiceData,
    ) -> Result<TokenResponse, OAuthError> {
        let refresh_token = require_param(REFRESH_TOKEN, request, "refresh_token")?;

        let info = storage_result(
            REFRESH_TOKEN,
            StorageMethod::FindAuthInfoByRefreshToken,
            &client.id,
            storage.find_auth_info_by_refresh_token(refresh_token).await,
        )?;

        if info.client_id != client.id {
            EndpointLog::token_endpoint(
                REFRESH_TOKEN,
                TokenEndpointLogEvent::RefreshTokenConditionMismatch,
                "'client_id' mismatch.",
            )
            .attr("client_id", client.id.as_str())
            .info();
            return Err(OAuthError::simple(ErrorKind::InvalidGrant));
        }

        let old = storage_result(
            REFRESH_TOKEN,
            StorageMethod::FindAccessTokenByRefreshToken,
            &client.id,
            storage.find_access_token_by_refresh_token(refresh_token).await,
        )?;

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if old.is_refresh_token_expired(now) {
            EndpointLog::token_endpoint(
                REFRESH_TOKEN,
                TokenEndpointLogEvent::RefreshTokenConditionMismatch,
                "expired 'refresh_token'.",
            )
            .attr("client_id", client.id.as_str())
            .info();
            return Err(OAuthError::invalid_grant("expired 'refresh_token'"));
        }

        let requested = request.param("scope");
        let mut renewed = info.clone();
        if let Some(requested) = requested {
            if !scope::is_subset(requested, &info.scope) {
                EndpointLog::token_endpoint(
                    REFRESH_TOKEN,
                    TokenEndpointLogEvent::ScopeConditionMismatch,
                    "requested scope exceeds the original grant",
                )
                .attr("scope", requested)
                .attr("client_id", client.id.as_str())
                .info();
                return Err(OAuthError::simple(ErrorKind::InvalidScope));
            }
            renewed.scope = requested.to_string();
        }

        let include_offline = scope::include_offline_access(&renewed.scope);
        let token = storage_result(
            REFRESH_TOKEN,
            StorageMethod::RefreshAccessToken,
            &client.id,
            storage
                .refresh_access_token(&renewed, &old, include_offline)
                .await,
        )?;

        Ok(TokenResponse::new(&token.access_token, token.access_token_expires_in)
            .with_refresh_token(token.refresh_token().filter(|_| include_offline))
            .with_scope(requested.unwrap_or_default()))
    }
}
