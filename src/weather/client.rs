use bytes::Bytes;
use reqwest::Url;

use crate::config::Endpoints;
use crate::error::FetchError;
use crate::fetch::{HttpClient, fetch_bytes};

/// Client for the current-conditions and forecast weather endpoints.
///
/// The API key travels as a query parameter, so wrap the inner client in
/// [`UrlParam`](crate::fetch::auth::UrlParam) with `appid`.
pub struct WeatherClient<C> {
    http: C,
    current_url: Url,
    forecast_url: Url,
}

impl<C: HttpClient> WeatherClient<C> {
    pub fn new(http: C, endpoints: &Endpoints) -> Self {
        Self {
            http,
            current_url: endpoints.weather_current.clone(),
            forecast_url: endpoints.weather_forecast.clone(),
        }
    }

    /// Current conditions at the given coordinates, metric units, raw JSON.
    pub async fn fetch_current(&self, lat: f64, lon: f64) -> Result<Bytes, FetchError> {
        self.get(self.current_url.clone(), lat, lon).await
    }

    /// Multi-step forecast at the given coordinates, metric units, raw JSON.
    pub async fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<Bytes, FetchError> {
        self.get(self.forecast_url.clone(), lat, lon).await
    }

    async fn get(&self, mut url: Url, lat: f64, lon: f64) -> Result<Bytes, FetchError> {
        url.query_pairs_mut()
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string())
            .append_pair("units", "metric");
        fetch_bytes(&self.http, url).await
    }
}
