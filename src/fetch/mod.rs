//! HTTP fetch layer.
//!
//! [`HttpClient`] is the seam the rest of the crate depends on; auth wrappers
//! in [`auth`] decorate it. [`fetch_bytes`] is the single GET primitive every
//! data source uses: one request, no retry, failures mapped into
//! [`FetchError`]. Retry and backoff live in the scheduler.

mod basic;
mod client;

pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use reqwest::Url;

use crate::error::FetchError;

/// Issues a single GET for `url` and returns the raw body.
///
/// Non-2xx responses become [`FetchError::Status`] carrying the status code
/// and body text; a timeout becomes [`FetchError::Timeout`]; everything else
/// is [`FetchError::Transport`].
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: Url) -> Result<Bytes, FetchError> {
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await.map_err(classify)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            status: status.as_u16(),
            body,
        });
    }

    resp.bytes().await.map_err(classify)
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err)
    }
}
