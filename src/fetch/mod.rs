//! HTTP fetching with pluggable authentication wrappers.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;
use tracing::debug;

/// GETs `url` and returns the body. Non-2xx responses are errors carrying
/// the status and body text; nothing is retried.
pub async fn fetch_bytes(client: &dyn HttpClient, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("request returned status {}: {}", status, body));
    }

    let bytes = resp.bytes().await?;
    debug!(bytes = bytes.len(), "response received");
    Ok(bytes.to_vec())
}
