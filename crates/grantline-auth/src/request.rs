//! Token endpoint request model and client credential extraction.
//!
//! A [`TokenRequest`] is built from the raw form body so that repeated
//! parameters stay visible (RFC 6749 Section 3.2 forbids them). Client
//! credentials arrive either in the `Authorization: Basic` header or as
//! `client_id`/`client_secret` body parameters, never both.

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::STANDARD};

/// A parsed token endpoint request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    params: HashMap<String, String>,
    duplicates: Vec<String>,
    authorization: Option<String>,
}

impl TokenRequest {
    /// Parses an `application/x-www-form-urlencoded` body.
    ///
    /// The first value of a repeated parameter wins; the name is recorded as
    /// duplicated.
    #[must_use]
    pub fn from_form(body: &[u8], authorization: Option<String>) -> Self {
        Self::from_pairs(
            url::form_urlencoded::parse(body).map(|(k, v)| (k.into_owned(), v.into_owned())),
        )
        .with_authorization(authorization)
    }

    /// Builds a request from name/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::default();
        for (name, value) in pairs {
            let name = name.into();
            if request.params.contains_key(&name) {
                if !request.duplicates.contains(&name) {
                    request.duplicates.push(name);
                }
                continue;
            }
            request.params.insert(name, value.into());
        }
        request
    }

    /// Sets the raw `Authorization` header value.
    #[must_use]
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }

    /// Returns a parameter value. Empty values count as absent.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns the first parameter name sent more than once.
    #[must_use]
    pub fn duplicated_param(&self) -> Option<&str> {
        self.duplicates.first().map(String::as_str)
    }

    /// Returns the `grant_type` parameter.
    #[must_use]
    pub fn grant_type(&self) -> Option<&str> {
        self.param("grant_type")
    }

    /// Extracts the client credentials.
    ///
    /// # Errors
    ///
    /// - [`ClientAuthError::Ambiguous`] if both the header and a body
    ///   credential parameter are present
    /// - [`ClientAuthError::MalformedHeader`] if the `Authorization` header
    ///   is present but not valid Basic credentials
    pub fn client_auth(&self) -> Result<ClientAuth, ClientAuthError> {
        let body_id = self.param("client_id");
        let body_secret = self.param("client_secret");
        let header = self.authorization.as_deref().filter(|h| !h.is_empty());

        match header {
            Some(_) if body_id.is_some() || body_secret.is_some() => Err(ClientAuthError::Ambiguous),
            Some(header) => {
                let (client_id, client_secret) =
                    parse_basic_auth(header).map_err(ClientAuthError::MalformedHeader)?;
                Ok(ClientAuth::Basic {
                    client_id,
                    client_secret,
                })
            }
            None => match body_id {
                Some(client_id) => Ok(ClientAuth::Body {
                    client_id: client_id.to_string(),
                    client_secret: body_secret.map(str::to_string),
                }),
                None => Ok(ClientAuth::None),
            },
        }
    }
}

/// Client credentials presented with a request.
#[derive(Clone, PartialEq, Eq)]
pub enum ClientAuth {
    /// HTTP Basic header.
    Basic {
        client_id: String,
        client_secret: String,
    },
    /// `client_id` (and possibly `client_secret`) body parameters.
    Body {
        client_id: String,
        client_secret: Option<String>,
    },
    /// No credentials.
    None,
}

impl std::fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { client_id, .. } => f
                .debug_struct("Basic")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Self::Body { client_id, .. } => f
                .debug_struct("Body")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Self::None => f.write_str("None"),
        }
    }
}

/// Failure to extract client credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientAuthError {
    /// Credentials were sent through both the header and the body.
    #[error("client credentials sent through more than one channel")]
    Ambiguous,

    /// The `Authorization` header could not be parsed.
    #[error("malformed Authorization header: {0}")]
    MalformedHeader(String),
}

/// Parse a Basic Authorization header into `(client_id, client_secret)`.
///
/// Both parts are form-urlencoded before base64 encoding (RFC 6749
/// Section 2.3.1).
fn parse_basic_auth(header: &str) -> Result<(String, String), String> {
    let credentials = header
        .strip_prefix("Basic ")
        .ok_or_else(|| "Authorization header must start with 'Basic '".to_string())?;

    let decoded = STANDARD
        .decode(credentials.trim())
        .map_err(|_| "invalid base64 encoding".to_string())?;

    let credentials = String::from_utf8(decoded).map_err(|_| "invalid UTF-8".to_string())?;

    let (id, secret) = credentials
        .split_once(':')
        .ok_or_else(|| "credentials must be in format 'id:secret'".to_string())?;

    if id.is_empty() {
        return Err("empty client id".to_string());
    }

    Ok((form_decode(id), form_decode(secret)))
}

fn form_decode(value: &str) -> String {
    // Raw '&' or '=' means the client skipped the encoding step.
    if value.contains(['&', '=']) {
        return value.to_string();
    }
    url::form_urlencoded::parse(value.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

/// Builds a Basic Authorization header value for client credentials.
#[must_use]
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    let raw = format!("{}:{}", encode(client_id), encode(client_secret));
    format!("Basic {}", STANDARD.encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_form_first_value_wins() {
        let request = TokenRequest::from_form(b"grant_type=a&code=x&grant_type=b", None);
        assert_eq!(request.grant_type(), Some("a"));
        assert_eq!(request.duplicated_param(), Some("grant_type"));
        assert_eq!(request.param("code"), Some("x"));
    }

    #[test]
    fn test_empty_param_is_absent() {
        let request = TokenRequest::from_form(b"grant_type=&scope=openid+profile", None);
        assert_eq!(request.grant_type(), None);
        assert_eq!(request.param("scope"), Some("openid profile"));
        assert_eq!(request.duplicated_param(), None);
    }

    #[test]
    fn test_basic_auth() {
        let header = basic_auth_header("client_id_01", "client_secret_01");
        let request = TokenRequest::from_pairs([("grant_type", "client_credentials")])
            .with_authorization(Some(header));
        assert_eq!(
            request.client_auth().unwrap(),
            ClientAuth::Basic {
                client_id: "client_id_01".to_string(),
                client_secret: "client_secret_01".to_string(),
            }
        );
    }

    #[test]
    fn test_basic_auth_form_decoding() {
        let header = basic_auth_header("my client", "p@ss:word");
        let (id, secret) = parse_basic_auth(&header).unwrap();
        assert_eq!(id, "my client");
        assert_eq!(secret, "p@ss:word");
    }

    #[test]
    fn test_basic_auth_raw_plus_decodes_as_space() {
        // Credentials are form-decoded, so an unencoded '+' is a space.
        let raw = format!("Basic {}", STANDARD.encode("app:a+b"));
        assert_eq!(parse_basic_auth(&raw).unwrap().1, "a b");

        let encoded = basic_auth_header("app", "a+b");
        assert!(STANDARD
            .decode(encoded.trim_start_matches("Basic "))
            .is_ok_and(|raw| raw == b"app:a%2Bb"));
        assert_eq!(parse_basic_auth(&encoded).unwrap().1, "a+b");
    }

    #[test]
    fn test_body_auth() {
        let request = TokenRequest::from_pairs([("client_id", "app"), ("client_secret", "s")]);
        assert_eq!(
            request.client_auth().unwrap(),
            ClientAuth::Body {
                client_id: "app".to_string(),
                client_secret: Some("s".to_string()),
            }
        );

        let request = TokenRequest::from_pairs([("client_id", "app")]);
        assert_eq!(
            request.client_auth().unwrap(),
            ClientAuth::Body {
                client_id: "app".to_string(),
                client_secret: None,
            }
        );
    }

    #[test]
    fn test_both_channels_is_ambiguous() {
        let header = basic_auth_header("app", "s");
        let request = TokenRequest::from_pairs([("client_id", "app"), ("client_secret", "s")])
            .with_authorization(Some(header.clone()));
        assert_eq!(request.client_auth(), Err(ClientAuthError::Ambiguous));

        let request =
            TokenRequest::from_pairs([("client_secret", "s")]).with_authorization(Some(header));
        assert_eq!(request.client_auth(), Err(ClientAuthError::Ambiguous));
    }

    #[test]
    fn test_malformed_header() {
        for header in ["Bearer abc", "Basic !!!", "Basic bm9jb2xvbg=="] {
            let request = TokenRequest::default().with_authorization(Some(header.to_string()));
            assert!(matches!(
                request.client_auth(),
                Err(ClientAuthError::MalformedHeader(_))
            ));
        }
    }

    #[test]
    fn test_no_credentials() {
        assert_eq!(TokenRequest::default().client_auth(), Ok(ClientAuth::None));
    }

    #[test]
    fn test_debug_hides_secret() {
        let auth = ClientAuth::Basic {
            client_id: "app".to_string(),
            client_secret: "hunter2".to_string(),
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
