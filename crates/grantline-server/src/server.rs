//! Application assembly: seeded storage, token endpoint and HTTP router.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use grantline_auth::types::{AuthInfo, Client, NO_OWNER};
use grantline_auth::{MemoryStorage, TokenEndpoint, TokenState};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, SeedConfig};

/// Creates the in-memory store and loads the configured seed data.
pub fn seed_storage(cfg: &AppConfig) -> anyhow::Result<MemoryStorage> {
    let storage = MemoryStorage::new(cfg.auth.issuer.clone(), cfg.auth.lifetimes());
    load_seed(&storage, &cfg.seed)?;
    Ok(storage)
}

fn load_seed(storage: &MemoryStorage, seed: &SeedConfig) -> anyhow::Result<()> {
    let mut user_ids = std::collections::HashMap::new();
    for user in &seed.users {
        let id = storage
            .create_user(user.username.as_str(), &user.password)
            .map_err(|e| anyhow::anyhow!("hashing password of user '{}': {e}", user.username))?;
        user_ids.insert(user.username.as_str(), id);
    }

    for seeded in &seed.clients {
        let owner = match &seeded.owner {
            Some(owner) => *user_ids
                .get(owner.as_str())
                .with_context(|| format!("unknown owner '{owner}' of client '{}'", seeded.id))?,
            None => NO_OWNER,
        };

        let mut client = Client::new(seeded.id.as_str(), owner)
            .with_scopes(seeded.scopes.iter().cloned());
        if let Some(secret) = &seeded.secret {
            client = client
                .with_secret(secret)
                .map_err(|e| anyhow::anyhow!("hashing secret of client '{}': {e}", seeded.id))?;
        }
        for grant_type in &seeded.grant_types {
            client = client.with_grant_type(grant_type.as_str());
        }
        for uri in &seeded.redirect_uris {
            client = client.with_redirect_uri(uri.as_str());
        }
        if let Some(signing) = &seeded.id_token {
            client = client.with_id_token_signing(signing.clone());
        }
        if let Some(key) = &seeded.assertion_key {
            client = client.with_assertion_key(key.clone());
        }
        storage.insert_client(client);
    }

    for grant in &seed.grants {
        let user_id = *user_ids
            .get(grant.username.as_str())
            .with_context(|| format!("unknown user '{}' in seeded grant", grant.username))?;
        let mut info = AuthInfo::new(user_id, grant.client_id.as_str(), grant.scope.as_str());
        info.redirect_uri = grant.redirect_uri.clone();
        info.code = Some(grant.code.clone());
        info.code_verifier = grant.code_verifier.clone();
        info.nonce = grant.nonce.clone();
        storage.insert_auth_info(info);
    }

    tracing::info!(
        users = seed.users.len(),
        clients = seed.clients.len(),
        grants = seed.grants.len(),
        "Seed data loaded"
    );
    Ok(())
}

/// Builds the application router.
pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let endpoint = TokenEndpoint::from_config(&cfg.auth).context("token endpoint")?;
    tracing::info!(grant_types = ?endpoint.grant_types(), "Token endpoint ready");

    let storage = seed_storage(cfg)?;
    let state = TokenState::new(Arc::new(endpoint), Arc::new(storage));
    Ok(grantline_auth::router(state).layer(TraceLayer::new_for_http()))
}

pub struct Server {
    addr: SocketAddr,
    app: Router,
}

impl Server {
    pub fn new(cfg: &AppConfig) -> anyhow::Result<Self> {
        let addr = cfg.addr().map_err(anyhow::Error::msg)?;
        let app = build_app(cfg)?;
        Ok(Self { addr, app })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
