//! OAuth 2.0 client registrations.
//!
//! A [`Client`] is owned by the storage capability and immutable for the
//! lifetime of one token request.

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::scope;
use crate::secret;

/// Owner id meaning "no owning user".
pub const NO_OWNER: i64 = -1;

fn no_owner() -> i64 {
    NO_OWNER
}

// =============================================================================
// Key material
// =============================================================================

/// Parameters the endpoint uses to sign ID tokens issued to a client.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdTokenSigning {
    /// JWS algorithm (`HS256`, `RS256`, `ES256`, ...).
    pub algorithm: Algorithm,

    /// Shared secret for HMAC algorithms, PEM private key otherwise.
    pub key: String,

    /// Key id placed in the JWS `kid` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

impl std::fmt::Debug for IdTokenSigning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenSigning")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Key used to verify JWT-bearer assertions presented by a client.
#[derive(Clone, Serialize, Deserialize)]
pub struct AssertionKey {
    /// Expected JWS algorithm.
    pub algorithm: Algorithm,

    /// Shared secret for HMAC algorithms, PEM public key otherwise.
    pub key: String,
}

impl std::fmt::Debug for AssertionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth 2.0 client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier.
    pub id: String,

    /// User owning this client; negative when there is none.
    #[serde(default = "no_owner")]
    pub owner_user_id: i64,

    /// Argon2 PHC hash of the client secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,

    /// Grant type names this client may use.
    #[serde(default)]
    pub grant_types: Vec<String>,

    /// Scope values this client may request. Empty means all.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Registered redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// ID token signing parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdTokenSigning>,

    /// Assertion verification key for the JWT-bearer grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_key: Option<AssertionKey>,
}

impl Client {
    /// Creates a client without secret, grant types or keys.
    #[must_use]
    pub fn new(id: impl Into<String>, owner_user_id: i64) -> Self {
        Self {
            id: id.into(),
            owner_user_id,
            secret_hash: None,
            grant_types: Vec::new(),
            scopes: Vec::new(),
            redirect_uris: Vec::new(),
            id_token: None,
            assertion_key: None,
        }
    }

    /// Hashes and sets the client secret.
    ///
    /// # Errors
    ///
    /// Returns an error if Argon2 hashing fails.
    pub fn with_secret(mut self, secret: &str) -> Result<Self, argon2::password_hash::Error> {
        self.secret_hash = Some(secret::hash_secret(secret)?);
        Ok(self)
    }

    /// Allows a grant type.
    #[must_use]
    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        let grant_type = grant_type.into();
        if !self.grant_types.contains(&grant_type) {
            self.grant_types.push(grant_type);
        }
        self
    }

    /// Adds a redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    /// Restricts the scope values this client may request.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the ID token signing parameters.
    #[must_use]
    pub fn with_id_token_signing(mut self, signing: IdTokenSigning) -> Self {
        self.id_token = Some(signing);
        self
    }

    /// Sets the assertion verification key.
    #[must_use]
    pub fn with_assertion_key(mut self, key: AssertionKey) -> Self {
        self.assertion_key = Some(key);
        self
    }

    /// Returns `true` if the client has an owning user.
    #[must_use]
    pub fn has_owner(&self) -> bool {
        self.owner_user_id >= 0
    }

    /// Returns `true` if the grant type is in the allowed set.
    #[must_use]
    pub fn can_use_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Returns `true` if every token of the scope string is allowed.
    #[must_use]
    pub fn can_use_scope(&self, requested: &str) -> bool {
        if self.scopes.is_empty() {
            return true;
        }
        scope::tokens(requested).all(|s| self.scopes.iter().any(|allowed| allowed == s))
    }

    /// Verifies a presented client secret.
    ///
    /// A client without a secret never verifies.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored hash is malformed.
    pub fn verify_secret(&self, presented: &str) -> Result<bool, argon2::password_hash::Error> {
        match &self.secret_hash {
            Some(hash) => secret::verify_secret(presented, hash),
            None => Ok(false),
        }
    }
}
