//! Weather data: HTTP client, domain types, and pure JSON normalization.

pub mod client;
pub mod model;
pub mod normalize;

pub use client::WeatherClient;
pub use model::{ConditionKind, ConditionSummary, ForecastPoint, ForecastSeries, WeatherSnapshot};
pub use normalize::{normalize_current, normalize_forecast, parse_payload};
