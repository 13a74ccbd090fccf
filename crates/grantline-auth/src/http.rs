//! HTTP adapter for the token endpoint.
//!
//! # Example
//!
//! ```ignore
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! &code_challenge_method=S256
//! &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};

use crate::endpoint::TokenEndpoint;
use crate::error::OAuthError;
use crate::request::TokenRequest;
use crate::storage::ServiceData;
use crate::types::TokenResponse;

/// `Content-Type` of every token endpoint response.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// State required for the token endpoint.
#[derive(Clone)]
pub struct TokenState {
    endpoint: Arc<TokenEndpoint>,
    storage: Arc<dyn ServiceData>,
}

impl TokenState {
    /// Creates a new token state.
    pub fn new(endpoint: Arc<TokenEndpoint>, storage: Arc<dyn ServiceData>) -> Self {
        Self { endpoint, storage }
    }
}

/// Builds a router serving `POST /token`.
pub fn router(state: TokenState) -> Router {
    Router::new()
        .route("/token", post(token_handler))
        .with_state(state)
}

/// OAuth 2.0 token endpoint handler.
///
/// Reads the raw `application/x-www-form-urlencoded` body so that repeated
/// parameters can be detected.
pub async fn token_handler(
    State(state): State<TokenState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let request = TokenRequest::from_form(&body, authorization);

    match state.endpoint.handle(&request, state.storage.as_ref()).await {
        Ok(response) => token_success_response(response),
        Err(error) => token_error_response(error),
    }
}

/// Build a successful token response.
fn token_success_response(response: TokenResponse) -> Response {
    (StatusCode::OK, NO_STORE_HEADERS, Json(response)).into_response()
}

/// Build an error response for token endpoint.
fn token_error_response(error: OAuthError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, NO_STORE_HEADERS, Json(error)).into_response()
}

const NO_STORE_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::CONTENT_TYPE, JSON_CONTENT_TYPE),
    (header::CACHE_CONTROL, "no-store"),
    (header::PRAGMA, "no-cache"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_no_store(response: &Response) {
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::PRAGMA], "no-cache");
    }

    #[tokio::test]
    async fn test_success_response() {
        let response = token_success_response(
            TokenResponse::new("ACCESS_TOKEN_0", 86400).with_scope("openid"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_no_store(&response);

        let body = body_json(response).await;
        assert_eq!(body["access_token"], "ACCESS_TOKEN_0");
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 86400);
        assert_eq!(body["scope"], "openid");
        assert!(body.get("refresh_token").is_none());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_error_response_status() {
        for (error, status) in [
            (OAuthError::missing_param("code"), StatusCode::BAD_REQUEST),
            (OAuthError::simple(ErrorKind::InvalidClient), StatusCode::UNAUTHORIZED),
            (OAuthError::simple(ErrorKind::UnauthorizedClient), StatusCode::UNAUTHORIZED),
            (OAuthError::server_error(), StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            let response = token_error_response(error);
            assert_eq!(response.status(), status);
            assert_no_store(&response);
        }

        let body = body_json(token_error_response(OAuthError::missing_param("code"))).await;
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["error_description"], "missing 'code' parameter");
        assert!(body.get("access_token").is_none());

        let body = body_json(token_error_response(OAuthError::server_error())).await;
        assert!(body.get("error_description").is_none());
    }
}
