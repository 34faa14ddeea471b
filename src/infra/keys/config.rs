use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// How one API host expects its key.
///
/// Exactly one of `query_param` or `header` must be set:
/// ```json
/// { "env": "DATA_GO_KR_SERVICE_KEY", "query_param": "serviceKey" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiKeyEntry {
    /// Name of the environment variable holding the key.
    pub env: String,
    #[serde(default)]
    pub query_param: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPlacement {
    Query(String),
    Header(String),
}

impl ApiKeyEntry {
    pub fn placement(&self) -> Result<KeyPlacement> {
        match (&self.query_param, &self.header) {
            (Some(param), None) => Ok(KeyPlacement::Query(param.clone())),
            (None, Some(header)) => Ok(KeyPlacement::Header(header.clone())),
            (Some(_), Some(_)) => bail!("key '{}' sets both query_param and header", self.env),
            (None, None) => bail!("key '{}' sets neither query_param nor header", self.env),
        }
    }
}

/// Maps API hosts to [`ApiKeyEntry`]s.
///
/// Stored as a plain JSON object on disk:
/// ```json
/// {
///   "apis.data.go.kr": { "env": "DATA_GO_KR_SERVICE_KEY", "query_param": "serviceKey" },
///   "openapi.naver.com": { "env": "NAVER_CLIENT_SECRET", "header": "X-Naver-Client-Secret" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeyConfig {
    entries: HashMap<String, ApiKeyEntry>,
}

impl ApiKeyConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read api key config {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("failed to parse api key config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let entries: HashMap<String, ApiKeyEntry> = serde_json::from_str(content)?;
        for entry in entries.values() {
            entry.placement()?;
        }
        Ok(Self { entries })
    }

    /// Returns the entry for `host`, if one is configured.
    pub fn get(&self, host: &str) -> Option<&ApiKeyEntry> {
        self.entries.get(host)
    }

    /// Iterates over all `(host, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ApiKeyEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entries() {
        let config = ApiKeyConfig::from_json(
            r#"{
                "apis.data.go.kr": { "env": "DATA_GO_KR_SERVICE_KEY", "query_param": "serviceKey" },
                "openapi.naver.com": { "env": "NAVER_CLIENT_SECRET", "header": "X-Naver-Client-Secret" }
            }"#,
        )
        .unwrap();

        let data = config.get("apis.data.go.kr").unwrap();
        assert_eq!(data.placement().unwrap(), KeyPlacement::Query("serviceKey".into()));

        let naver = config.get("openapi.naver.com").unwrap();
        assert_eq!(
            naver.placement().unwrap(),
            KeyPlacement::Header("X-Naver-Client-Secret".into())
        );
        assert_eq!(config.iter().count(), 2);
        assert!(config.get("example.com").is_none());
    }

    #[test]
    fn test_ambiguous_entry_is_rejected() {
        let result = ApiKeyConfig::from_json(
            r#"{ "h": { "env": "K", "query_param": "key", "header": "X-Key" } }"#,
        );
        assert!(result.is_err());

        let result = ApiKeyConfig::from_json(r#"{ "h": { "env": "K" } }"#);
        assert!(result.is_err());
    }
}
