use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// `header_name` is the header field to set (e.g. `"X-Naver-Client-Secret"`);
/// the key is written verbatim as its value.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    /// Validates the header name and value up front so requests cannot fail on them.
    pub fn new(inner: C, header_name: &str, key: &str) -> anyhow::Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid header name '{header_name}': {e}"))?;
        let mut value = HeaderValue::from_str(key)
            .map_err(|_| anyhow::anyhow!("API key for '{header_name}' is not a valid header value"))?;
        value.set_sensitive(true);

        Ok(Self {
            inner,
            header_name,
            value,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> anyhow::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::fetch::BasicClient;

    #[test]
    fn test_rejects_bad_header_name() {
        let inner = BasicClient::new(&HttpConfig::default()).unwrap();
        assert!(ApiKey::new(inner, "bad header", "k").is_err());
    }

    #[test]
    fn test_rejects_newline_in_key() {
        let inner = BasicClient::new(&HttpConfig::default()).unwrap();
        assert!(ApiKey::new(inner, "X-Api-Key", "abc\ndef").is_err());
    }
}
