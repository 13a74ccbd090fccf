//! # grantline-auth
//!
//! OAuth 2.0 / OpenID Connect token endpoint.
//!
//! This crate provides:
//! - Client authentication (HTTP Basic or body credentials, never both)
//! - A grant handler registry with dispatch by `grant_type`
//! - Built-in grants: `authorization_code` with PKCE, `client_credentials`,
//!   `refresh_token`, `password` and JWT-bearer assertions
//! - ID token minting for `openid` grants
//! - A structured log taxonomy shared by every grant handler
//!
//! Persistence is consumed through the [`storage::ServiceData`] capability;
//! [`storage::MemoryStorage`] is an in-memory implementation for development
//! and tests.
//!
//! ## Modules
//!
//! - [`endpoint`] - Client authentication and grant dispatch
//! - [`grant`] - Grant type handlers
//! - [`pkce`] - PKCE code verifier registry
//! - [`assertion`] - JWT-bearer assertion decoding and validation
//! - [`id_token`] - OpenID Connect ID token minting
//! - [`scope`] - Space-delimited scope utilities
//! - [`error`] - Protocol error model
//! - [`log`] - Structured token endpoint log records
//! - [`storage`] - Storage capability and in-memory implementation
//! - [`http`] - Axum handler for `POST /token`
//! - [`config`] - Token endpoint configuration

pub mod assertion;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod grant;
pub mod http;
pub mod id_token;
pub mod log;
pub mod pkce;
pub mod request;
pub mod scope;
pub mod secret;
pub mod storage;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use endpoint::TokenEndpoint;
pub use error::{ErrorKind, OAuthError};
pub use grant::GrantHandler;
pub use http::{TokenState, router, token_handler};
pub use request::TokenRequest;
pub use storage::{MemoryStorage, ServiceData, StorageError, StorageResult};
pub use types::{AuthInfo, Client, Token, TokenResponse};
