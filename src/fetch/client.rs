use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes one request. Wrappers in [`crate::fetch::auth`] decorate an
/// inner client with credentials.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> anyhow::Result<Response>;
}
