use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response};

/// Minimal seam over HTTP execution so auth wrappers compose and tests can
/// script responses without a network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Forwarding impl so a shared [`Arc`]-wrapped client is itself an
/// [`HttpClient`]; lets callers retain a handle after moving one into a wrapper.
#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
