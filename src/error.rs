//! Error taxonomy for the aggregation core.
//!
//! [`ConfigError`] is fatal and only raised during startup. Everything else is
//! transient: the scheduler catches it, logs it, and flags the affected
//! snapshot field stale without touching its last-known-good value.

use thiserror::Error;

/// Startup configuration failures. These abort the process before any
/// network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingKey(&'static str),

    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to load station list from {path}")]
    StationList {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// A single HTTP fetch attempt failed. No retry happens at this layer;
/// backoff policy belongs to the scheduler.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The transit feed payload was not structurally valid protobuf.
///
/// Unknown fields are not an error; protobuf skips them, which is how the
/// decoder stays forward compatible.
#[derive(Debug, Error)]
#[error("feed payload is not a valid FeedMessage: {0}")]
pub struct DecodeError(#[from] pub prost::DecodeError);

/// A weather payload did not have the JSON shape we expect.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("weather payload missing field {0}")]
    Missing(&'static str),

    #[error("weather payload field {0} has the wrong type")]
    Invalid(&'static str),

    #[error("weather payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Union of the transient failures one refresh cycle can produce, caught at
/// the scheduler boundary and turned into a stale flag.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}
