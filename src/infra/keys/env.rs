use anyhow::{Result, anyhow};

use super::KeyStore;

/// Resolves keys from process environment variables.
///
/// The binary loads `.env` with dotenvy before any lookup, so local keys can
/// live there instead of in source.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvKeyStore;

impl KeyStore for EnvKeyStore {
    fn get(&self, reference: &str) -> Result<String> {
        match std::env::var(reference) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            Ok(_) => Err(anyhow!("environment variable '{reference}' is empty")),
            Err(_) => Err(anyhow!("environment variable '{reference}' is not set")),
        }
    }
}
