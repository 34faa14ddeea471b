use std::time::Duration;

use tracing::{debug, info};

use super::{SourceBatch, SourceError, parse_json_records};
use crate::config::HttpConfig;
use crate::fetch::auth::{ApiKey, UrlParam};
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::infra::keys::{ApiKeyConfig, EnvKeyStore, KeyPlacement, KeyStore};

/// Everything an HTTP source needs besides its URL.
pub struct HttpContext {
    pub settings: HttpConfig,
    pub keys: ApiKeyConfig,
    pub store: Box<dyn KeyStore>,
}

impl Default for HttpContext {
    fn default() -> Self {
        Self {
            settings: HttpConfig::default(),
            keys: ApiKeyConfig::default(),
            store: Box::new(EnvKeyStore),
        }
    }
}

impl HttpContext {
    pub fn new(settings: HttpConfig, keys: ApiKeyConfig) -> Self {
        Self {
            settings,
            keys,
            store: Box::new(EnvKeyStore),
        }
    }

    /// Builds a client for `url`, wrapped with the host's key if one is configured.
    pub fn client_for(&self, url: &reqwest::Url) -> Result<Box<dyn HttpClient>, SourceError> {
        let host = url.host_str().unwrap_or_default().to_string();
        let credentials = |message: String| SourceError::Credentials {
            host: host.clone(),
            message,
        };

        let basic = BasicClient::new(&self.settings).map_err(|e| credentials(format!("{e:#}")))?;

        let Some(entry) = self.keys.get(&host) else {
            return Ok(Box::new(basic));
        };

        let key = self
            .store
            .get(&entry.env)
            .map_err(|e| credentials(format!("{e:#}")))?;

        match entry.placement().map_err(|e| credentials(format!("{e:#}")))? {
            KeyPlacement::Query(param_name) => Ok(Box::new(UrlParam {
                inner: basic,
                param_name,
                key,
            })),
            KeyPlacement::Header(header) => {
                let client =
                    ApiKey::new(basic, &header, &key).map_err(|e| credentials(format!("{e:#}")))?;
                Ok(Box::new(client))
            }
        }
    }
}

/// Fetches JSON records from `url`, following `pages` pages.
///
/// With more than one page the configured page (and page-size) parameters
/// are appended. Requests are spaced by the configured throttle and a failed
/// request fails the whole read. After the first page, a page with no rows
/// or no record array at `pointer` (data.go.kr sends `"items": ""` past the
/// last page) ends the walk.
pub async fn fetch_records(
    url: &str,
    pointer: Option<&str>,
    pages: u32,
    ctx: &HttpContext,
) -> Result<SourceBatch, SourceError> {
    let base = reqwest::Url::parse(url).map_err(|e| SourceError::Http {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let client = ctx.client_for(&base)?;
    let shown = format!("{}{}", base.host_str().unwrap_or_default(), base.path());

    let mut batch = SourceBatch::default();

    for page in 1..=pages.max(1) {
        if page > 1 && ctx.settings.throttle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ctx.settings.throttle_ms)).await;
        }

        let mut page_url = base.clone();
        if pages > 1 {
            let mut query = page_url.query_pairs_mut();
            query.append_pair(&ctx.settings.page_param, &page.to_string());
            if let Some(size_param) = &ctx.settings.page_size_param {
                query.append_pair(size_param, &ctx.settings.page_size.to_string());
            }
        }

        let bytes = fetch_bytes(client.as_ref(), page_url.as_str())
            .await
            .map_err(|e| SourceError::Http {
                url: shown.clone(),
                message: format!("{e:#}"),
            })?;

        let page_batch = match parse_json_records(&shown, &bytes, pointer) {
            Ok(page_batch) => page_batch,
            Err(SourceError::Shape { .. }) if page > 1 => {
                debug!(page, "no record array, past the last page");
                break;
            }
            Err(e) => return Err(e),
        };
        debug!(page, rows = page_batch.rows.len(), "page fetched");

        if page_batch.rows.is_empty() && page_batch.skipped.is_empty() {
            break;
        }
        batch.append(page_batch);
    }

    info!(source = %shown, rows = batch.rows.len(), "HTTP source read");
    Ok(batch)
}
