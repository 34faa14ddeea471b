//! API-key management for HTTP sources.
//!
//! [`ApiKeyConfig`] maps API hosts to the environment variable holding their
//! key and to where the key goes in the request.
//! [`KeyStore`] is the trait for resolving such a reference into its plaintext value.
//! [`EnvKeyStore`] implements [`KeyStore`] by reading the process environment.

mod config;
mod env;

pub use config::{ApiKeyConfig, ApiKeyEntry, KeyPlacement};
pub use env::EnvKeyStore;

use anyhow::Result;

/// Resolves a reference (e.g. an environment variable name) into a plaintext secret.
pub trait KeyStore: Send + Sync {
    fn get(&self, reference: &str) -> Result<String>;
}
