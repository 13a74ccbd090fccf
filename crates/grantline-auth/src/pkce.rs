//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements RFC 7636 verification at the token endpoint. The authorization
//! record holds the code verifier; the token request carries
//! `code_challenge_method` and `code_challenge`, and the registered verifier
//! for that method confirms the pair.
//!
//! # Example
//!
//! ```
//! use grantline_auth::pkce::VerifierRegistry;
//!
//! let registry = VerifierRegistry::default();
//! let s256 = registry.find("S256").unwrap();
//! assert!(s256.verify(
//!     "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
//!     "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
//! ));
//! assert!(registry.find("unknown").is_err());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE method resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkceError {
    /// No verifier is registered for the method name.
    #[error("unsupported code challenge method: {0}")]
    UnsupportedMethod(String),
}

impl PkceError {
    /// Create an `UnsupportedMethod` error.
    #[must_use]
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod(method.into())
    }
}

// =============================================================================
// Verifiers
// =============================================================================

/// A code challenge verification algorithm.
pub trait CodeVerifier: Send + Sync {
    /// Method name as sent in `code_challenge_method`.
    fn method(&self) -> &str;

    /// Returns `true` if `challenge` matches the stored `verifier`.
    fn verify(&self, challenge: &str, verifier: &str) -> bool;
}

/// The `plain` method: byte-exact equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainVerifier;

impl CodeVerifier for PlainVerifier {
    fn method(&self) -> &str {
        "plain"
    }

    fn verify(&self, challenge: &str, verifier: &str) -> bool {
        challenge.as_bytes() == verifier.as_bytes()
    }
}

/// The `S256` method.
///
/// `code_challenge = BASE64URL(SHA256(ASCII(code_verifier)))`, without padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct S256Verifier;

impl S256Verifier {
    /// Computes the S256 challenge for a verifier.
    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        let hash = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl CodeVerifier for S256Verifier {
    fn method(&self) -> &str {
        "S256"
    }

    fn verify(&self, challenge: &str, verifier: &str) -> bool {
        Self::challenge_for(verifier) == challenge
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Method name to verifier mapping.
///
/// `Default` registers `plain` and `S256`. Lookup never falls back to another
/// method.
#[derive(Clone)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, Arc<dyn CodeVerifier>>,
}

impl VerifierRegistry {
    /// Creates a registry without any method.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            verifiers: HashMap::new(),
        }
    }

    /// Registers a verifier under its method name, replacing any previous one.
    pub fn register(&mut self, verifier: Arc<dyn CodeVerifier>) {
        self.verifiers
            .insert(verifier.method().to_string(), verifier);
    }

    /// Finds the verifier for a method name (exact match).
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` if the method is not registered.
    pub fn find(&self, method: &str) -> Result<&dyn CodeVerifier, PkceError> {
        self.verifiers
            .get(method)
            .map(|v| v.as_ref())
            .ok_or_else(|| PkceError::unsupported_method(method))
    }

    /// Returns the registered method names, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PlainVerifier));
        registry.register(Arc::new(S256Verifier));
        registry
    }
}

impl std::fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
