//! Pipeline configuration.
//!
//! Resolution order: built-in defaults, then an optional JSON file, then
//! environment variables (a `.env` file is honoured by the binary), then CLI
//! flags applied by the caller. Secrets never live here; the api-key file only
//! names the environment variables that hold them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::infra::keys::ApiKeyConfig;
use crate::record::Identity;
use crate::scoring::LookupTables;

pub const ENV_OUTPUT_DIR: &str = "CIVIC_RATER_OUTPUT_DIR";
pub const ENV_DB_PATH: &str = "CIVIC_RATER_DB_PATH";
pub const ENV_TOP_N: &str = "CIVIC_RATER_TOP_N";

/// Outbound HTTP behaviour for API-backed sources.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Pause between consecutive page requests.
    pub throttle_ms: u64,
    pub page_param: String,
    pub page_size_param: Option<String>,
    pub page_size: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            throttle_ms: 500,
            page_param: "pageNo".to_string(),
            page_size_param: Some("numOfRows".to_string()),
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub db_path: Option<PathBuf>,
    pub top_n: usize,
    pub key_field: String,
    pub name_field: String,
    /// Keyword categories; empty means the built-in Korean categories.
    pub keywords: BTreeMap<String, Vec<String>>,
    pub http: HttpConfig,
    /// JSON file mapping API hosts to the env vars holding their keys.
    pub api_keys_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let identity = Identity::default();
        Self {
            output_dir: PathBuf::from("reports"),
            db_path: None,
            top_n: 10,
            key_field: identity.key_field,
            name_field: identity.name_field,
            keywords: BTreeMap::new(),
            http: HttpConfig::default(),
            api_keys_path: None,
        }
    }
}

impl PipelineConfig {
    /// Loads the config file (if any) and applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_json(&content)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Applies overrides from `lookup`, which is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(db) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.db_path = Some(PathBuf::from(db));
        }
        if let Some(top_n) = lookup(ENV_TOP_N).filter(|v| !v.is_empty()) {
            self.top_n = top_n
                .parse()
                .with_context(|| format!("{ENV_TOP_N} must be a positive integer, got '{top_n}'"))?;
        }
        Ok(())
    }

    pub fn identity(&self) -> Identity {
        Identity {
            key_field: self.key_field.clone(),
            name_field: self.name_field.clone(),
        }
    }

    pub fn lookup_tables(&self) -> LookupTables {
        LookupTables::new(self.keywords.clone())
    }

    pub fn api_keys(&self) -> Result<ApiKeyConfig> {
        match &self.api_keys_path {
            Some(path) => ApiKeyConfig::load(path),
            None => Ok(ApiKeyConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{ "top_n": 3, "name_field": "의원명", "http": { "throttle_ms": 0 } }"#,
        )
        .unwrap();

        assert_eq!(config.top_n, 3);
        assert_eq!(config.name_field, "의원명");
        assert_eq!(config.key_field, "code");
        assert_eq!(config.http.throttle_ms, 0);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.output_dir, PathBuf::from("reports"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_OUTPUT_DIR, "/tmp/out"),
            (ENV_DB_PATH, "scores.sqlite"),
            (ENV_TOP_N, "25"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.db_path, Some(PathBuf::from("scores.sqlite")));
        assert_eq!(config.top_n, 25);
    }

    #[test]
    fn test_bad_top_n_is_an_error() {
        let mut config = PipelineConfig::default();
        let result = config.apply_env(|k| (k == ENV_TOP_N).then(|| "many".to_string()));

        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_fields_in_file_are_ignored() {
        let config = PipelineConfig::from_json(r#"{ "legacy_api_key": "x" }"#).unwrap();

        assert_eq!(config, PipelineConfig::default());
    }
}
