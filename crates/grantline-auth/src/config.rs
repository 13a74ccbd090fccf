//! Token endpoint configuration.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::grant::{
    AUTHORIZATION_CODE, BUILTIN_GRANT_TYPES, CLIENT_CREDENTIALS, PASSWORD, REFRESH_TOKEN,
};
use crate::storage::TokenLifetimes;

/// Token endpoint configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://id.example.com"
/// grant_types = ["authorization_code", "refresh_token"]
/// access_token_lifetime = "24h"
/// refresh_token_lifetime = "30d"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer identifier (ID token `iss`, assertion `aud`).
    pub issuer: String,

    /// Built-in grant types to register.
    pub grant_types: Vec<String>,

    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Authorization codes should be short-lived.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            grant_types: [AUTHORIZATION_CODE, CLIENT_CREDENTIALS, REFRESH_TOKEN, PASSWORD]
                .into_iter()
                .map(str::to_string)
                .collect(),
            access_token_lifetime: Duration::from_secs(24 * 3600),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600),
            id_token_lifetime: Duration::from_secs(3600),
            authorization_code_lifetime: Duration::from_secs(600),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Missing` if the issuer is empty
    /// - `ConfigError::InvalidValue` for a zero lifetime or an unknown or
    ///   repeated grant type
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }

        for (name, lifetime) in [
            ("access_token_lifetime", self.access_token_lifetime),
            ("refresh_token_lifetime", self.refresh_token_lifetime),
            ("id_token_lifetime", self.id_token_lifetime),
            ("authorization_code_lifetime", self.authorization_code_lifetime),
        ] {
            if lifetime.as_secs() == 0 {
                return Err(ConfigError::InvalidValue(format!("{name} must be at least 1s")));
            }
        }

        let mut seen = HashSet::new();
        for grant in &self.grant_types {
            if !BUILTIN_GRANT_TYPES.contains(&grant.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid grant type: '{grant}'. Must be one of {}",
                    BUILTIN_GRANT_TYPES.join(", ")
                )));
            }
            if !seen.insert(grant.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "grant type '{grant}' is listed more than once"
                )));
            }
        }

        Ok(())
    }

    /// Lifetimes in whole seconds.
    #[must_use]
    pub fn lifetimes(&self) -> TokenLifetimes {
        let secs = |d: Duration| i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
        TokenLifetimes {
            access_token: secs(self.access_token_lifetime),
            refresh_token: secs(self.refresh_token_lifetime),
            id_token: secs(self.id_token_lifetime),
            authorization_code: secs(self.authorization_code_lifetime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::JWT_BEARER;

    #[test]
    fn test_default_is_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lifetimes(), TokenLifetimes::default());
    }

    #[test]
    fn test_empty_issuer() {
        let config = AuthConfig {
            issuer: " ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("issuer".to_string()))
        );
    }

    #[test]
    fn test_zero_lifetime() {
        let config = AuthConfig {
            id_token_lifetime: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_grant_type_names() {
        let config = AuthConfig {
            grant_types: vec![JWT_BEARER.to_string(), "implicit".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(m)) if m.contains("implicit")));

        let config = AuthConfig {
            grant_types: vec![PASSWORD.to_string(), PASSWORD.to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_humantime_deserialization() {
        let config: AuthConfig = serde_json::from_value(serde_json::json!({
            "issuer": "https://id.example.com",
            "access_token_lifetime": "1h",
            "refresh_token_lifetime": "90days"
        }))
        .unwrap();
        assert_eq!(config.access_token_lifetime, Duration::from_secs(3600));
        assert_eq!(config.refresh_token_lifetime, Duration::from_secs(90 * 24 * 3600));
        assert_eq!(config.id_token_lifetime, Duration::from_secs(3600));
        assert_eq!(config.grant_types.len(), 4);
    }
}
