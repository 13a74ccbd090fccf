//! Token endpoint dispatcher.
//!
//! [`TokenEndpoint`] owns the grant handler registry. For every request it
//! rejects repeated parameters, authenticates the client, checks that the
//! client may use the requested grant type and hands the request to the
//! matching handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AuthConfig, ConfigError};
use crate::error::{ErrorKind, OAuthError};
use crate::grant::{self, GrantHandler};
use crate::log::{EndpointLog, TokenEndpointLogEvent};
use crate::request::{ClientAuth, ClientAuthError, TokenRequest};
use crate::storage::{ServiceData, StorageError, StorageMethod};
use crate::types::{Client, TokenResponse};

/// Log category for failures that happen before a grant type is known.
const PATH_LABEL: &str = "token";

/// Grant handler registry and dispatcher.
#[derive(Clone, Default)]
pub struct TokenEndpoint {
    handlers: HashMap<String, Arc<dyn GrantHandler>>,
}

impl TokenEndpoint {
    /// Creates an endpoint with no grant handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an endpoint serving the built-in grant types named in the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthConfig::validate`] error for an invalid
    /// configuration.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut endpoint = Self::new();
        for name in &config.grant_types {
            let handler = grant::builtin(name)
                .ok_or_else(|| ConfigError::InvalidValue(format!("Invalid grant type: '{name}'")))?;
            endpoint.support(handler);
        }
        Ok(endpoint)
    }

    /// Registers a handler under its grant type.
    ///
    /// Registering a second handler for the same grant type replaces the
    /// first: the last registration wins.
    pub fn support(&mut self, handler: Arc<dyn GrantHandler>) -> &mut Self {
        let name = handler.grant_type().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::debug!(grant_type = %name, "Replaced grant handler");
        }
        self
    }

    /// Returns the registered grant types, sorted.
    #[must_use]
    pub fn grant_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Processes a token request.
    ///
    /// # Errors
    ///
    /// Returns the [`OAuthError`] of the first failed check, or the error
    /// of the selected grant handler.
    pub async fn handle(
        &self,
        request: &TokenRequest,
        storage: &dyn ServiceData,
    ) -> Result<TokenResponse, OAuthError> {
        if let Some(name) = request.duplicated_param() {
            EndpointLog::token_endpoint(
                PATH_LABEL,
                TokenEndpointLogEvent::DuplicateParam,
                format!("'{name}' included more than once"),
            )
            .attr("param", name)
            .debug();
            return Err(OAuthError::invalid_request(format!(
                "'{name}' parameter is included more than once"
            )));
        }

        let Some(grant_type) = request.grant_type() else {
            EndpointLog::token_endpoint(
                PATH_LABEL,
                TokenEndpointLogEvent::MissingParam,
                "'grant_type' not found",
            )
            .attr("param", "grant_type")
            .debug();
            return Err(OAuthError::missing_param("grant_type"));
        };

        let client = self.authenticate_client(grant_type, request, storage).await?;

        if !client.can_use_grant_type(grant_type) {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::UnauthorizedGrantType,
                "this client is not allowed to use the grant type",
            )
            .attr("client_id", client.id.as_str())
            .info();
            return Err(OAuthError::new(
                ErrorKind::UnauthorizedClient,
                format!("'{grant_type}' is not allowed for this client"),
            ));
        }

        let Some(handler) = self.handlers.get(grant_type) else {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::UnsupportedGrantType,
                "no handler registered for the grant type",
            )
            .attr("client_id", client.id.as_str())
            .debug();
            return Err(OAuthError::new(
                ErrorKind::UnsupportedGrantType,
                format!("unsupported 'grant_type': '{grant_type}'"),
            ));
        };

        handler.handle(request, &client, storage).await
    }

    async fn authenticate_client(
        &self,
        grant_type: &str,
        request: &TokenRequest,
        storage: &dyn ServiceData,
    ) -> Result<Client, OAuthError> {
        let failed = |message: &str| {
            EndpointLog::token_endpoint(
                grant_type,
                TokenEndpointLogEvent::ClientAuthenticationFailed,
                message,
            )
        };

        let (client_id, client_secret) = match request.client_auth() {
            Ok(ClientAuth::Basic {
                client_id,
                client_secret,
            }) => (client_id, client_secret),
            Ok(ClientAuth::Body {
                client_id,
                client_secret: Some(client_secret),
            }) => (client_id, client_secret),
            Ok(ClientAuth::Body {
                client_id,
                client_secret: None,
            }) => {
                failed("'client_secret' not found")
                    .attr("client_id", client_id)
                    .info();
                return Err(OAuthError::invalid_client("missing 'client_secret' parameter"));
            }
            Ok(ClientAuth::None) => {
                failed("no client credentials").info();
                return Err(OAuthError::invalid_client("client authentication required"));
            }
            Err(ClientAuthError::Ambiguous) => {
                failed("client credentials sent in both the header and the body").debug();
                return Err(OAuthError::invalid_request(
                    "client credentials must not be sent through more than one channel",
                ));
            }
            Err(ClientAuthError::MalformedHeader(reason)) => {
                failed("malformed Authorization header")
                    .attr("reason", reason)
                    .info();
                return Err(OAuthError::invalid_client("invalid 'Authorization' header"));
            }
        };

        let client = match storage.find_client(&client_id).await {
            Ok(Some(client)) => client,
            Err(StorageError::NotFound) => {
                failed("unknown client")
                    .attr("client_id", client_id.as_str())
                    .info();
                return Err(OAuthError::simple(ErrorKind::InvalidClient));
            }
            Err(StorageError::Unsupported) => {
                EndpointLog::token_endpoint(
                    grant_type,
                    TokenEndpointLogEvent::InterfaceUnsupported,
                    "the method returns 'unsupported' error.",
                )
                .attr("method", StorageMethod::FindClient.as_str())
                .warn();
                return Err(OAuthError::server_error());
            }
            Err(StorageError::Failure { message }) => {
                EndpointLog::token_endpoint(
                    grant_type,
                    TokenEndpointLogEvent::InterfaceError,
                    "the method failed.",
                )
                .attr("method", StorageMethod::FindClient.as_str())
                .attr("reason", message)
                .warn();
                return Err(OAuthError::server_error());
            }
            Ok(None) => {
                EndpointLog::token_endpoint(
                    grant_type,
                    TokenEndpointLogEvent::InterfaceError,
                    "the method returns an empty result.",
                )
                .attr("method", StorageMethod::FindClient.as_str())
                .warn();
                return Err(OAuthError::server_error());
            }
        };

        match client.verify_secret(&client_secret) {
            Ok(true) => Ok(client),
            Ok(false) => {
                failed("client secret mismatch")
                    .attr("client_id", client_id)
                    .info();
                Err(OAuthError::simple(ErrorKind::InvalidClient))
            }
            Err(e) => {
                EndpointLog::token_endpoint(
                    grant_type,
                    TokenEndpointLogEvent::ClientConditionMismatch,
                    "stored client secret hash is unreadable",
                )
                .attr("client_id", client_id)
                .attr("reason", e.to_string())
                .error();
                Err(OAuthError::server_error())
            }
        }
    }
}

impl std::fmt::Debug for TokenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEndpoint")
            .field("grant_types", &self.grant_types())
            .finish()
    }
}
