//! In-memory storage capability.
//!
//! DashMap-backed [`ServiceData`] implementation for development servers and
//! tests. State is lost on restart.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ServiceData, StorageError, StorageResult};
use crate::secret;
use crate::types::{AuthInfo, Client, Token};

/// Token and code lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_token: i64,
    pub refresh_token: i64,
    pub id_token: i64,
    pub authorization_code: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token: 60 * 60 * 24,
            refresh_token: 60 * 60 * 24 * 30,
            id_token: 60 * 60,
            authorization_code: 60 * 10,
        }
    }
}

#[derive(Debug, Clone)]
struct UserRecord {
    id: i64,
    password_hash: String,
}

/// In-memory store for users, clients, grants and refresh tokens.
#[derive(Debug)]
pub struct MemoryStorage {
    issuer: String,
    lifetimes: TokenLifetimes,
    next_id: AtomicI64,
    users: DashMap<String, UserRecord>,
    clients: DashMap<String, Client>,
    auth_infos: DashMap<i64, AuthInfo>,
    codes: DashMap<String, i64>,
    refresh_tokens: DashMap<String, Token>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new(issuer: impl Into<String>, lifetimes: TokenLifetimes) -> Self {
        Self {
            issuer: issuer.into(),
            lifetimes,
            next_id: AtomicI64::new(0),
            users: DashMap::new(),
            clients: DashMap::new(),
            auth_infos: DashMap::new(),
            codes: DashMap::new(),
            refresh_tokens: DashMap::new(),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn now() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }

    /// Creates a user and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if password hashing fails.
    pub fn create_user(
        &self,
        username: impl Into<String>,
        password: &str,
    ) -> Result<i64, argon2::password_hash::Error> {
        let password_hash = secret::hash_secret(password)?;
        let id = self.next_id();
        self.users
            .insert(username.into(), UserRecord { id, password_hash });
        Ok(id)
    }

    /// Registers or replaces a client.
    pub fn insert_client(&self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Stores a grant record, assigning an id when it has none, and indexes
    /// its authorization code.
    ///
    /// A zero `id_token_expires_in` takes the configured ID token lifetime.
    pub fn insert_auth_info(&self, mut info: AuthInfo) -> AuthInfo {
        if info.id == 0 {
            info.id = self.next_id() + 1_000_000;
        }
        if info.id_token_expires_in == 0 {
            info.id_token_expires_in = self.lifetimes.id_token;
        }
        if let Some(code) = info.code.as_ref().filter(|c| !c.is_empty()) {
            self.codes.insert(code.clone(), info.id);
        }
        self.auth_infos.insert(info.id, info.clone());
        info
    }

    fn issue(&self, info: &AuthInfo, include_offline: bool) -> Token {
        let token = Token {
            auth_info_id: info.id,
            access_token: secret::generate_token(),
            access_token_expires_in: self.lifetimes.access_token,
            refresh_token: include_offline.then(secret::generate_token),
            refresh_token_expires_in: self.lifetimes.refresh_token,
            scope: info.scope.clone(),
            created_at: Self::now(),
        };
        if let Some(refresh_token) = &token.refresh_token {
            self.refresh_tokens
                .insert(refresh_token.clone(), token.clone());
        }
        token
    }
}

#[async_trait]
impl ServiceData for MemoryStorage {
    async fn find_client(&self, client_id: &str) -> StorageResult<Client> {
        self.clients
            .get(client_id)
            .map(|c| Some(c.clone()))
            .ok_or(StorageError::NotFound)
    }

    async fn find_user_id(&self, username: &str, password: &str) -> StorageResult<i64> {
        let user = self
            .users
            .get(username)
            .map(|u| u.clone())
            .ok_or(StorageError::NotFound)?;
        let verified = secret::verify_secret(password, &user.password_hash)
            .map_err(|e| StorageError::failure(e.to_string()))?;
        if verified {
            Ok(Some(user.id))
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn find_user_id_by_subject(&self, _client: &Client, subject: &str) -> StorageResult<i64> {
        self.users
            .iter()
            .find(|entry| entry.key() == subject || entry.value().id.to_string() == subject)
            .map(|entry| Some(entry.value().id))
            .ok_or(StorageError::NotFound)
    }

    async fn find_auth_info_by_code(&self, code: &str) -> StorageResult<AuthInfo> {
        let id = self
            .codes
            .get(code)
            .map(|id| *id)
            .ok_or(StorageError::NotFound)?;
        let info = self
            .auth_infos
            .get(&id)
            .map(|i| i.clone())
            .ok_or(StorageError::NotFound)?;
        if info.authorized_at + self.lifetimes.authorization_code < Self::now() {
            self.codes.remove(code);
            return Err(StorageError::NotFound);
        }
        Ok(Some(info))
    }

    async fn find_auth_info_by_refresh_token(&self, refresh_token: &str) -> StorageResult<AuthInfo> {
        let id = self
            .refresh_tokens
            .get(refresh_token)
            .map(|t| t.auth_info_id)
            .ok_or(StorageError::NotFound)?;
        self.auth_infos
            .get(&id)
            .map(|i| Some(i.clone()))
            .ok_or(StorageError::NotFound)
    }

    async fn find_access_token_by_refresh_token(&self, refresh_token: &str) -> StorageResult<Token> {
        self.refresh_tokens
            .get(refresh_token)
            .map(|t| Some(t.clone()))
            .ok_or(StorageError::NotFound)
    }

    async fn create_or_update_auth_info(
        &self,
        user_id: i64,
        client_id: &str,
        scope: &str,
    ) -> StorageResult<AuthInfo> {
        let existing = self
            .auth_infos
            .iter()
            .find(|e| e.user_id == user_id && e.client_id == client_id && e.code.is_none())
            .map(|e| *e.key());

        if let Some(mut info) = existing.and_then(|id| self.auth_infos.get_mut(&id)) {
            info.scope = scope.to_string();
            info.authorized_at = Self::now();
            return Ok(Some(info.clone()));
        }

        let mut info = AuthInfo::new(user_id, client_id, scope);
        info.id_token_expires_in = self.lifetimes.id_token;
        Ok(Some(self.insert_auth_info(info)))
    }

    async fn create_access_token(&self, info: &AuthInfo, include_offline: bool) -> StorageResult<Token> {
        if let Some(code) = info.code.as_deref().filter(|c| !c.is_empty()) {
            // The remove is the single-use gate: only one caller observes the entry.
            match self.codes.remove(code) {
                Some((_, id)) if id == info.id => {}
                _ => return Err(StorageError::NotFound),
            }
            if let Some(mut stored) = self.auth_infos.get_mut(&info.id) {
                stored.code = None;
            }
        }
        Ok(Some(self.issue(info, include_offline)))
    }

    async fn refresh_access_token(
        &self,
        info: &AuthInfo,
        old: &Token,
        include_offline: bool,
    ) -> StorageResult<Token> {
        let old_refresh = old.refresh_token().ok_or(StorageError::NotFound)?;
        if self.refresh_tokens.remove(old_refresh).is_none() {
            return Err(StorageError::NotFound);
        }
        Ok(Some(self.issue(info, include_offline)))
    }

    fn issuer(&self) -> String {
        self.issuer.clone()
    }
}
