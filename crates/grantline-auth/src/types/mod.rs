//! Domain types shared by the dispatcher, grant handlers and storage.

mod auth_info;
mod client;
mod token;

pub use auth_info::AuthInfo;
pub use client::{AssertionKey, Client, IdTokenSigning, NO_OWNER};
pub use token::{BEARER, Token, TokenResponse};
