use std::time::Duration;

use super::client::HttpClient;
use async_trait::async_trait;

/// Plain [`HttpClient`] over a shared [`reqwest::Client`].
///
/// Every request carries the configured timeout; exceeding it surfaces as a
/// timeout error from `execute`, which the fetch layer folds into
/// [`FetchError::Timeout`](crate::error::FetchError::Timeout).
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
