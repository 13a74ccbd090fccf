use grantline_auth::config::AuthConfig;
use grantline_auth::types::{AssertionKey, IdTokenSigning};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Token endpoint configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Users, clients and grants loaded into the in-memory store at startup
    #[serde(default)]
    pub seed: SeedConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;

        for client in &self.seed.clients {
            if client.id.is_empty() {
                return Err("seed.clients: client id must not be empty".into());
            }
            if let Some(owner) = &client.owner {
                if !self.seed.users.iter().any(|u| &u.username == owner) {
                    return Err(format!(
                        "seed.clients: owner '{owner}' of client '{}' is not a seeded user",
                        client.id
                    ));
                }
            }
        }
        for grant in &self.seed.grants {
            if !self.seed.users.iter().any(|u| u.username == grant.username) {
                return Err(format!(
                    "seed.grants: user '{}' is not a seeded user",
                    grant.username
                ));
            }
            if !self.seed.clients.iter().any(|c| c.id == grant.client_id) {
                return Err(format!(
                    "seed.grants: client '{}' is not a seeded client",
                    grant.client_id
                ));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("invalid server address: {e}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeedConfig {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub clients: Vec<SeedClient>,
    /// Pre-authorized grants with authorization codes
    #[serde(default)]
    pub grants: Vec<SeedGrant>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    /// Plaintext; hashed with argon2 at startup
    pub password: String,
}

impl std::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUser")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SeedClient {
    pub id: String,
    /// Plaintext; hashed with argon2 before it is stored
    #[serde(default)]
    pub secret: Option<String>,
    /// Username of the owning user; required for `client_credentials`
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub id_token: Option<IdTokenSigning>,
    #[serde(default)]
    pub assertion_key: Option<AssertionKey>,
}

impl std::fmt::Debug for SeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedClient")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("grant_types", &self.grant_types)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedGrant {
    pub username: String,
    pub client_id: String,
    pub code: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub nonce: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "grantline.toml";

    /// Picks the configuration file: `--config <path>` (or `--config=<path>`)
    /// first, then a non-empty `GRANTLINE_CONFIG`, then the default.
    pub fn config_path(args: impl IntoIterator<Item = String>, env_path: Option<String>) -> String {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
            if arg == "--config" {
                if let Some(path) = args.next() {
                    return path;
                }
            }
        }
        env_path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., GRANTLINE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("GRANTLINE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
