//! Authorization grant records.

/// One authorization grant, in flight or at rest.
///
/// Created by the authorization step (or by the token endpoint for grants
/// without a browser step), consumed once by the `authorization_code`
/// exchange and renewed by `refresh_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// Storage identifier.
    pub id: i64,

    /// Resource owner.
    pub user_id: i64,

    /// Client the grant was issued to.
    pub client_id: String,

    /// Redirect URI bound to the authorization code.
    pub redirect_uri: String,

    /// Subject identifier placed in ID tokens.
    pub subject: String,

    /// Granted scope (space-delimited).
    pub scope: String,

    /// One-time authorization code.
    pub code: Option<String>,

    /// PKCE code verifier bound to the code.
    pub code_verifier: Option<String>,

    /// OIDC nonce from the authorization request.
    pub nonce: String,

    /// ID token lifetime in seconds.
    pub id_token_expires_in: i64,

    /// Authorization time (Unix seconds).
    pub authorized_at: i64,
}

impl AuthInfo {
    /// Creates a grant record with no code, verifier or nonce.
    #[must_use]
    pub fn new(user_id: i64, client_id: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id,
            client_id: client_id.into(),
            redirect_uri: String::new(),
            subject: user_id.to_string(),
            scope: scope.into(),
            code: None,
            code_verifier: None,
            nonce: String::new(),
            id_token_expires_in: 0,
            authorized_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    /// Returns the PKCE verifier when one is bound and non-empty.
    #[must_use]
    pub fn code_verifier(&self) -> Option<&str> {
        self.code_verifier.as_deref().filter(|v| !v.is_empty())
    }
}
