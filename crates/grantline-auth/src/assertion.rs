//! JWT-bearer assertion decoding and validation (RFC 7523).
//!
//! Decoding is a capability ([`AssertionDecoder`]) that verifies the
//! signature and time claims and reports a classified
//! [`ValidationFailure`]. [`check_assertion`] turns that outcome into a
//! protocol error and then checks the `aud` claim against the issuer.
//!
//! # Example
//!
//! ```ignore
//! let decoded = decoder.decode(assertion, &client);
//! let token = check_assertion(assertion, &decoded, GRANT_TYPE, &client, storage)?;
//! let subject = token.string_claim("sub");
//! ```

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, OAuthError};
use crate::log::{EndpointLog, TokenEndpointLogEvent, fingerprint};
use crate::storage::{ServiceData, StorageMethod};
use crate::types::Client;

// =============================================================================
// Decoding outcome
// =============================================================================

/// Why an assertion failed to decode, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationFailure {
    /// No usable key or algorithm; includes key resolution errors.
    Unverifiable,
    /// Not a well-formed JWT.
    Malformed,
    /// The signature does not verify.
    SignatureInvalid,
    /// `exp` is in the past.
    Expired,
    /// `nbf` is in the future.
    NotValidYet,
    /// Any other failure.
    Unknown,
}

impl ValidationFailure {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverifiable => "unverifiable",
            Self::Malformed => "malformed",
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::NotValidYet => "not_valid_yet",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("assertion {kind}: {message}")]
pub struct AssertionError {
    pub kind: ValidationFailure,
    /// Protocol error raised by the key resolver, surfaced verbatim.
    pub cause: Option<OAuthError>,
    pub message: String,
}

impl AssertionError {
    #[must_use]
    pub fn new(kind: ValidationFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            cause: None,
            message: message.into(),
        }
    }

    /// An unverifiable failure caused by a key resolution error.
    #[must_use]
    pub fn from_resolver(cause: OAuthError) -> Self {
        Self {
            kind: ValidationFailure::Unverifiable,
            message: cause.to_string(),
            cause: Some(cause),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AssertionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey => ValidationFailure::Unverifiable,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingRequiredClaim(_) => ValidationFailure::Malformed,
            ErrorKind::InvalidSignature => ValidationFailure::SignatureInvalid,
            ErrorKind::ExpiredSignature => ValidationFailure::Expired,
            ErrorKind::ImmatureSignature => ValidationFailure::NotValidYet,
            _ => ValidationFailure::Unknown,
        };
        Self::new(kind, err.to_string())
    }
}

/// A decoded assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionToken {
    pub claims: Map<String, Value>,
    /// Set by the decoder once signature and time claims verified.
    pub valid: bool,
}

impl AssertionToken {
    /// Returns a string claim.
    #[must_use]
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Resolves the verification key for an assertion presented by a client.
///
/// A returned [`OAuthError`] is surfaced to the client unchanged.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, header: &Header, client: &Client) -> Result<(Algorithm, DecodingKey), OAuthError>;
}

/// Verifies and decodes a JWT-bearer assertion.
pub trait AssertionDecoder: Send + Sync {
    fn decode(&self, assertion: &str, client: &Client) -> Result<AssertionToken, AssertionError>;
}

/// Uses the client's registered [`AssertionKey`](crate::types::AssertionKey).
///
/// A registered key that cannot be parsed yields `server_error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientKeyResolver;

impl KeyResolver for ClientKeyResolver {
    fn resolve(&self, _header: &Header, client: &Client) -> Result<(Algorithm, DecodingKey), OAuthError> {
        let registered = client
            .assertion_key
            .as_ref()
            .ok_or_else(|| OAuthError::invalid_grant("no assertion key registered for this client"))?;

        let key = registered.key.as_bytes();
        let decoding_key = match registered.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(DecodingKey::from_secret(key)),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(key),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key),
            _ => DecodingKey::from_ed_pem(key),
        }
        .map_err(|_| OAuthError::server_error())?;

        Ok((registered.algorithm, decoding_key))
    }
}

/// [`AssertionDecoder`] backed by `jsonwebtoken`.
///
/// Requires `exp`, checks `nbf`, leaves `aud` to [`check_assertion`].
#[derive(Clone)]
pub struct JwtAssertionDecoder {
    resolver: Arc<dyn KeyResolver>,
    leeway: u64,
}

impl JwtAssertionDecoder {
    #[must_use]
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self { resolver, leeway: 0 }
    }

    /// Allowed clock skew in seconds for `exp` and `nbf`.
    #[must_use]
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }
}

impl Default for JwtAssertionDecoder {
    fn default() -> Self {
        Self::new(Arc::new(ClientKeyResolver))
    }
}

impl std::fmt::Debug for JwtAssertionDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAssertionDecoder")
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl AssertionDecoder for JwtAssertionDecoder {
    fn decode(&self, assertion: &str, client: &Client) -> Result<AssertionToken, AssertionError> {
        let header = jsonwebtoken::decode_header(assertion)?;
        let (algorithm, key) = self
            .resolver
            .resolve(&header, client)
            .map_err(AssertionError::from_resolver)?;

        if header.alg != algorithm {
            return Err(AssertionError::new(
                ValidationFailure::Unverifiable,
                format!("unexpected algorithm {:?}", header.alg),
            ));
        }

        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.leeway = self.leeway;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<Map<String, Value>>(assertion, &key, &validation)?;
        Ok(AssertionToken {
            claims: data.claims,
            valid: true,
        })
    }
}

// =============================================================================
// Validator
// =============================================================================

fn mismatch(grant_type: &str, assertion: &str, client: &Client, message: &str) -> EndpointLog {
    EndpointLog::token_endpoint(grant_type, TokenEndpointLogEvent::AssertionConditionMismatch, message)
        .attr("assertion", fingerprint(assertion))
        .attr("client_id", client.id.as_str())
}

/// Validates a decoded assertion and its audience.
///
/// Returns the accepted token; the caller then reads the remaining claims.
///
/// # Errors
///
/// - `invalid_grant` for every decode failure, an invalid token or an `aud`
///   that is not the issuer; a key resolver error is returned as is
/// - `invalid_request` when `aud` is missing or not a string
/// - `server_error` when the issuer is empty
pub fn check_assertion<'a>(
    assertion: &str,
    decoded: &'a Result<AssertionToken, AssertionError>,
    grant_type: &str,
    client: &Client,
    storage: &dyn ServiceData,
) -> Result<&'a AssertionToken, OAuthError> {
    let token = match decoded {
        Ok(token) => token,
        Err(err) => {
            let (log, description): (fn(&EndpointLog), &str) = match err.kind {
                ValidationFailure::Unverifiable => match &err.cause {
                    Some(cause) if cause.kind() == ErrorKind::ServerError => {
                        EndpointLog::token_endpoint(
                            grant_type,
                            TokenEndpointLogEvent::ClientConditionMismatch,
                            "registered assertion key is unusable",
                        )
                        .attr("client_id", client.id.as_str())
                        .error();
                        return Err(cause.clone());
                    }
                    Some(cause) => {
                        mismatch(grant_type, assertion, client, "'assertion' unverifiable").debug();
                        return Err(cause.clone());
                    }
                    None => {
                        mismatch(grant_type, assertion, client, "'assertion' unverifiable").debug();
                        return Err(OAuthError::invalid_grant("assertion unverifiable"));
                    }
                },
                ValidationFailure::Malformed => (EndpointLog::debug, "invalid assertion format"),
                ValidationFailure::SignatureInvalid => (EndpointLog::info, "invalid assertion signature"),
                ValidationFailure::Expired => (EndpointLog::info, "assertion expired"),
                ValidationFailure::NotValidYet => (EndpointLog::info, "assertion not valid yet"),
                ValidationFailure::Unknown => (EndpointLog::warn, "invalid assertion"),
            };
            log(&mismatch(grant_type, assertion, client, description));
            return Err(OAuthError::invalid_grant(description));
        }
    };

    if !token.valid {
        mismatch(grant_type, assertion, client, "decoder returned an unverified assertion").warn();
        return Err(OAuthError::invalid_grant("invalid assertion signature"));
    }

    let Some(aud) = token.string_claim("aud") else {
        EndpointLog::token_endpoint(
            grant_type,
            TokenEndpointLogEvent::MissingParam,
            "'aud' not found in assertion",
        )
        .attr("param", "aud")
        .attr("client_id", client.id.as_str())
        .debug();
        return Err(OAuthError::invalid_request("'aud' parameter not found in assertion"));
    };

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

    if aud != issuer {
        mismatch(grant_type, assertion, client, "invalid 'aud'").info();
        return Err(OAuthError::invalid_grant(format!(
            "invalid 'aud' parameter '{aud}' in assertion"
        )));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::AssertionKey;
    use async_trait::async_trait;
    use jsonwebtoken::{EncodingKey, encode};
    use serde_json::json;

    const KEY: &str = "assertion-shared-secret";
    const ISSUER: &str = "https://issuer.example";
    const GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

    struct Issuer(&'static str);

    #[async_trait]
    impl ServiceData for Issuer {
        fn issuer(&self) -> String {
            self.0.to_string()
        }
    }

    fn client() -> Client {
        Client::new("app", 0).with_assertion_key(AssertionKey {
            algorithm: Algorithm::HS256,
            key: KEY.to_string(),
        })
    }

    fn now() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }

    fn sign(claims: Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(KEY.as_bytes()),
        )
        .unwrap()
    }

    fn run(assertion: &str, issuer: &'static str) -> Result<(), OAuthError> {
        let client = client();
        let decoded = JwtAssertionDecoder::default().decode(assertion, &client);
        check_assertion(assertion, &decoded, GRANT, &client, &Issuer(issuer)).map(|_| ())
    }

    #[test]
    fn test_valid_assertion_accepted() {
        let jwt = sign(json!({ "sub": "alice", "aud": ISSUER, "exp": now() + 300 }));
        assert_eq!(run(&jwt, ISSUER), Ok(()));
    }

    #[test]
    fn test_malformed() {
        let err = run("not-a-jwt", ISSUER).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
        assert_eq!(err.description(), Some("invalid assertion format"));
    }

    #[test]
    fn test_bad_signature() {
        let jwt = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "aud": ISSUER, "exp": now() + 300 }),
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();
        let err = run(&jwt, ISSUER).unwrap_err();
        assert_eq!(err.description(), Some("invalid assertion signature"));
    }

    #[test]
    fn test_expired() {
        let jwt = sign(json!({ "aud": ISSUER, "exp": now() - 3600 }));
        let err = run(&jwt, ISSUER).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
        assert_eq!(err.description(), Some("assertion expired"));
    }

    #[test]
    fn test_not_valid_yet() {
        let jwt = sign(json!({ "aud": ISSUER, "exp": now() + 7200, "nbf": now() + 3600 }));
        let err = run(&jwt, ISSUER).unwrap_err();
        assert_eq!(err.description(), Some("assertion not valid yet"));
    }

    #[test]
    fn test_missing_exp_is_malformed() {
        let jwt = sign(json!({ "aud": ISSUER }));
        let err = run(&jwt, ISSUER).unwrap_err();
        assert_eq!(err.description(), Some("invalid assertion format"));
    }

    #[test]
    fn test_algorithm_mismatch_is_unverifiable() {
        let jwt = encode(
            &Header::new(Algorithm::HS512),
            &json!({ "aud": ISSUER, "exp": now() + 300 }),
            &EncodingKey::from_secret(KEY.as_bytes()),
        )
        .unwrap();
        let err = run(&jwt, ISSUER).unwrap_err();
        assert_eq!(err.description(), Some("assertion unverifiable"));
    }

    #[test]
    fn test_resolver_error_surfaces_verbatim() {
        struct UnknownIssuer;
        impl KeyResolver for UnknownIssuer {
            fn resolve(&self, _: &Header, _: &Client) -> Result<(Algorithm, DecodingKey), OAuthError> {
                Err(OAuthError::invalid_client("unknown issuer"))
            }
        }

        let jwt = sign(json!({ "aud": ISSUER, "exp": now() + 300 }));
        let client = client();
        let decoded = JwtAssertionDecoder::new(Arc::new(UnknownIssuer)).decode(&jwt, &client);
        let err = check_assertion(&jwt, &decoded, GRANT, &client, &Issuer(ISSUER)).unwrap_err();
        assert_eq!(err, OAuthError::invalid_client("unknown issuer"));
    }

    #[test]
    fn test_unusable_registered_key_is_server_error() {
        let jwt = sign(json!({ "aud": ISSUER, "exp": now() + 300 }));
        let client = Client::new("app", 0).with_assertion_key(AssertionKey {
            algorithm: Algorithm::RS256,
            key: "not a pem key".to_string(),
        });
        let decoded = JwtAssertionDecoder::default().decode(&jwt, &client);
        assert_eq!(
            decoded.as_ref().unwrap_err().kind,
            ValidationFailure::Unverifiable
        );
        let err = check_assertion(&jwt, &decoded, GRANT, &client, &Issuer(ISSUER)).unwrap_err();
        assert_eq!(err, OAuthError::server_error());
    }

    #[test]
    fn test_unknown_failure() {
        let decoded = Err(AssertionError::new(ValidationFailure::Unknown, "?"));
        let err = check_assertion("x", &decoded, GRANT, &client(), &Issuer(ISSUER)).unwrap_err();
        assert_eq!(err.description(), Some("invalid assertion"));
    }

    #[test]
    fn test_invalid_token_flag() {
        let decoded = Ok(AssertionToken {
            claims: Map::new(),
            valid: false,
        });
        let err = check_assertion("x", &decoded, GRANT, &client(), &Issuer(ISSUER)).unwrap_err();
        assert_eq!(err.description(), Some("invalid assertion signature"));
    }

    #[test]
    fn test_missing_or_non_string_aud() {
        let jwt = sign(json!({ "exp": now() + 300 }));
        let err = run(&jwt, ISSUER).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.description(), Some("'aud' parameter not found in assertion"));

        let jwt = sign(json!({ "aud": [ISSUER], "exp": now() + 300 }));
        assert_eq!(run(&jwt, ISSUER).unwrap_err().kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_empty_issuer_is_server_error() {
        let jwt = sign(json!({ "aud": ISSUER, "exp": now() + 300 }));
        assert_eq!(run(&jwt, "").unwrap_err(), OAuthError::server_error());
    }

    #[test]
    fn test_audience_mismatch() {
        let jwt = sign(json!({ "aud": "https://elsewhere.example", "exp": now() + 300 }));
        let err = run(&jwt, ISSUER).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
        assert_eq!(
            err.description(),
            Some("invalid 'aud' parameter 'https://elsewhere.example' in assertion")
        );
    }

    #[test]
    fn test_client_without_key() {
        let jwt = sign(json!({ "aud": ISSUER, "exp": now() + 300 }));
        let client = Client::new("keyless", 0);
        let decoded = JwtAssertionDecoder::default().decode(&jwt, &client);
        let err = check_assertion(&jwt, &decoded, GRANT, &client, &Issuer(ISSUER)).unwrap_err();
        assert_eq!(
            err,
            OAuthError::invalid_grant("no assertion key registered for this client")
        );
    }
}
