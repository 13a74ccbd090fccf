//! OpenID Connect ID token minting.
//!
//! ID tokens are signed with the parameters registered on the client:
//! HMAC algorithms take the key as a shared secret, RSA, ECDSA and EdDSA take
//! a PEM-encoded private key.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::types::{AuthInfo, IdTokenSigning};

/// Errors raised while minting an ID token.
#[derive(Debug, thiserror::Error)]
pub enum IdTokenError {
    /// The client has no signing parameters.
    #[error("client has no ID token signing key")]
    MissingKey,

    /// The key cannot be used with the algorithm.
    #[error("invalid ID token key: {message}")]
    InvalidKey { message: String },

    /// Encoding or signing failed.
    #[error("ID token signing failed: {message}")]
    Signing { message: String },
}

/// ID token claims (OIDC Core Section 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub auth_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl IdTokenClaims {
    /// Builds the claims for a grant at time `now` (Unix seconds).
    #[must_use]
    pub fn for_grant(issuer: &str, info: &AuthInfo, now: i64) -> Self {
        Self {
            iss: issuer.to_string(),
            sub: info.subject.clone(),
            aud: info.client_id.clone(),
            exp: now + info.id_token_expires_in,
            iat: now,
            auth_time: info.authorized_at,
            nonce: Some(info.nonce.clone()).filter(|n| !n.is_empty()),
        }
    }
}

fn encoding_key(signing: &IdTokenSigning) -> Result<EncodingKey, IdTokenError> {
    let key = signing.key.as_bytes();
    let result = match signing.algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            return Ok(EncodingKey::from_secret(key));
        }
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => EncodingKey::from_rsa_pem(key),
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(key),
        _ => EncodingKey::from_ed_pem(key),
    };
    result.map_err(|e| IdTokenError::InvalidKey {
        message: e.to_string(),
    })
}

/// Signs an ID token for `info` with the client's signing parameters.
///
/// # Errors
///
/// Returns an error if the client has no key, the key does not match the
/// algorithm, or signing fails.
pub fn mint(
    signing: Option<&IdTokenSigning>,
    issuer: &str,
    info: &AuthInfo,
    now: i64,
) -> Result<String, IdTokenError> {
    let signing = signing.ok_or(IdTokenError::MissingKey)?;
    let key = encoding_key(signing)?;

    let mut header = Header::new(signing.algorithm);
    header.kid = signing.key_id.clone().filter(|k| !k.is_empty());

    let claims = IdTokenClaims::for_grant(issuer, info, now);
    jsonwebtoken::encode(&header, &claims, &key).map_err(|e| IdTokenError::Signing {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    fn info() -> AuthInfo {
        let mut info = AuthInfo::new(0, "client_id_01", "openid");
        info.nonce = "07dfa90f".to_string();
        info.id_token_expires_in = 3600;
        info.authorized_at = 1_700_000_000;
        info
    }

    fn hs256() -> IdTokenSigning {
        IdTokenSigning {
            algorithm: Algorithm::HS256,
            key: "id-token-secret".to_string(),
            key_id: Some("key-1".to_string()),
        }
    }

    #[test]
    fn test_mint_hs256_claims_and_kid() {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let token = mint(Some(&hs256()), "example.org", &info(), now).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("key-1"));
        assert_eq!(header.alg, Algorithm::HS256);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["client_id_01"]);
        validation.set_issuer(&["example.org"]);
        let data = jsonwebtoken::decode::<IdTokenClaims>(
            &token,
            &DecodingKey::from_secret(b"id-token-secret"),
            &validation,
        )
        .unwrap();

        assert_eq!(data.claims.sub, "0");
        assert_eq!(data.claims.exp, now + 3600);
        assert_eq!(data.claims.auth_time, 1_700_000_000);
        assert_eq!(data.claims.nonce.as_deref(), Some("07dfa90f"));
    }

    #[test]
    fn test_empty_nonce_is_omitted() {
        let mut info = info();
        info.nonce.clear();
        let claims = IdTokenClaims::for_grant("example.org", &info, 0);
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("nonce").is_none());
    }

    #[test]
    fn test_missing_key() {
        assert!(matches!(
            mint(None, "example.org", &info(), 0),
            Err(IdTokenError::MissingKey)
        ));
    }

    #[test]
    fn test_bad_pem_is_invalid_key() {
        let signing = IdTokenSigning {
            algorithm: Algorithm::RS256,
            key: "not a pem".to_string(),
            key_id: None,
        };
        assert!(matches!(
            mint(Some(&signing), "example.org", &info(), 0),
            Err(IdTokenError::InvalidKey { .. })
        ));
    }
}
