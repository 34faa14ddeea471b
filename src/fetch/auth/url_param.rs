use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use std::fmt;

/// An [`HttpClient`] wrapper that puts an API key into the query string.
///
/// Public-data portals such as apis.data.go.kr expect the key as
/// `serviceKey`. A parameter of the same name already present in the URL is
/// replaced, so a key pasted into a source URL never travels twice.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> fmt::Debug for UrlParam<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlParam")
            .field("param_name", &self.param_name)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn with_key(url: &mut reqwest::Url, param_name: &str, key: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param_name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut query = url.query_pairs_mut();
    query.clear();
    for (k, v) in &kept {
        query.append_pair(k, v);
    }
    query.append_pair(param_name, key);
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> anyhow::Result<reqwest::Response> {
        with_key(req.url_mut(), &self.param_name, &self.key);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_replaces_existing_param() {
        let mut url =
            reqwest::Url::parse("https://apis.data.go.kr/list?serviceKey=OLD&pageNo=2").unwrap();

        with_key(&mut url, "serviceKey", "NEW");

        assert_eq!(url.query(), Some("pageNo=2&serviceKey=NEW"));
    }

    #[test]
    fn test_debug_hides_key() {
        let client = UrlParam {
            inner: (),
            param_name: "serviceKey".to_string(),
            key: "secret".to_string(),
        };

        assert!(!format!("{client:?}").contains("secret"));
    }
}
