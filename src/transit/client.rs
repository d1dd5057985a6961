use bytes::Bytes;
use chrono::NaiveDate;
use reqwest::Url;

use crate::config::Endpoints;
use crate::error::FetchError;
use crate::fetch::{HttpClient, fetch_bytes};

/// Client for the realtime and alerts transit feed endpoints.
///
/// Authentication is not handled here; wrap the inner client in
/// [`ApiKey`](crate::fetch::auth::ApiKey) so every request carries the
/// `Authorization: apiKey <key>` header.
pub struct TransitClient<C> {
    http: C,
    realtime_url: Url,
    alerts_url: Url,
}

impl<C: HttpClient> TransitClient<C> {
    pub fn new(http: C, endpoints: &Endpoints) -> Self {
        Self {
            http,
            realtime_url: endpoints.realtime.clone(),
            alerts_url: endpoints.alerts.clone(),
        }
    }

    /// One GET against the realtime feed. Returns the raw protobuf payload.
    pub async fn fetch_realtime(&self) -> Result<Bytes, FetchError> {
        fetch_bytes(&self.http, self.realtime_url.clone()).await
    }

    /// One GET against the alerts feed, filtered to alerts valid on `date`
    /// and currently published.
    pub async fn fetch_alerts(&self, date: NaiveDate) -> Result<Bytes, FetchError> {
        let mut url = self.alerts_url.clone();
        url.query_pairs_mut()
            .append_pair("outputFormat", "rapidJSON")
            .append_pair("coordOutputFormat", "EPSG:4326")
            .append_pair("filterDateValid", &date.format("%d-%m-%Y").to_string())
            .append_pair("filterPublicationStatus", "current");
        fetch_bytes(&self.http, url).await
    }
}
