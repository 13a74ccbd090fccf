//! Standalone token endpoint server backed by the in-memory store.

pub mod config;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{Server, build_app};
