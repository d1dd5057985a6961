//! Process-wide configuration.
//!
//! Everything the pipeline needs is read from the environment exactly once at
//! startup and frozen into a [`Config`]. Components receive a reference; no
//! code re-reads the environment mid-run.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::ConfigError;

const TRANSIT_KEY_VAR: &str = "TfNSW_KEY";
const WEATHER_KEY_VAR: &str = "WEATHER_KEY";

const DEFAULT_REALTIME_URL: &str = "https://api.transport.nsw.gov.au/v2/gtfs/realtime/sydneytrains";
const DEFAULT_ALERTS_URL: &str = "https://api.transport.nsw.gov.au/v2/gtfs/alerts/sydneytrains";
const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const DEFAULT_FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// One entry from the station reference list. Read-only; used by the
/// presentation layer for selection widgets.
#[derive(Debug, Clone, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
}

/// Where the dashboard is located, for the weather calls.
#[derive(Debug, Clone)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub realtime: Url,
    pub alerts: Url,
    pub weather_current: Url,
    pub weather_forecast: Url,
}

/// Cadences and retry policy for the scheduler. All values are configuration,
/// not hard-coded policy.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub transit_interval: Duration,
    pub alerts_interval: Duration,
    pub weather_interval: Duration,
    pub forecast_interval: Duration,
    pub clock_period: Duration,
    pub fetch_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transit_key: String,
    pub weather_key: String,
    pub location: Location,
    pub endpoints: Endpoints,
    pub poll: PollConfig,
    pub stations: Vec<Station>,
}

impl Config {
    /// Builds the configuration from the environment.
    ///
    /// A missing API key is fatal here, before any network call, so polling
    /// never has to deal with absent credentials.
    pub fn from_env() -> Result<Self, ConfigError> {
        let transit_key = require_env(TRANSIT_KEY_VAR)?;
        let weather_key = require_env(WEATHER_KEY_VAR)?;

        let location = Location {
            latitude: env_f64("LOCATION_LAT", 33.8688)?,
            longitude: env_f64("LOCATION_LON", 151.2093)?,
            label: std::env::var("LOCATION_LABEL").unwrap_or_else(|_| "Sydney".to_string()),
        };

        let endpoints = Endpoints {
            realtime: env_url("TRANSIT_REALTIME_URL", DEFAULT_REALTIME_URL)?,
            alerts: env_url("TRANSIT_ALERTS_URL", DEFAULT_ALERTS_URL)?,
            weather_current: env_url("WEATHER_CURRENT_URL", DEFAULT_WEATHER_URL)?,
            weather_forecast: env_url("WEATHER_FORECAST_URL", DEFAULT_FORECAST_URL)?,
        };

        let poll = PollConfig {
            transit_interval: env_secs("REFRESH_TRANSIT_SECS", 30)?,
            alerts_interval: env_secs("REFRESH_ALERTS_SECS", 120)?,
            weather_interval: env_secs("REFRESH_WEATHER_SECS", 300)?,
            forecast_interval: env_secs("REFRESH_FORECAST_SECS", 900)?,
            clock_period: Duration::from_micros(16_667),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS", 10)?,
            backoff_base: env_secs("BACKOFF_BASE_SECS", 2)?,
            backoff_cap: env_secs("BACKOFF_CAP_SECS", 120)?,
        };

        let station_path =
            std::env::var("STATION_LIST").unwrap_or_else(|_| "stations.csv".to_string());
        let stations = load_stations(&station_path)?;

        Ok(Config {
            transit_key,
            weather_key,
            location,
            endpoints,
            poll,
            stations,
        })
    }
}

/// Loads the read-only station reference list from a two-column CSV file.
pub fn load_stations(path: &str) -> Result<Vec<Station>, ConfigError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| ConfigError::StationList {
        path: path.to_string(),
        source,
    })?;

    let mut stations = Vec::new();
    for row in reader.deserialize() {
        let station: Station = row.map_err(|source| ConfigError::StationList {
            path: path.to_string(),
            source,
        })?;
        stations.push(station);
    }
    Ok(stations)
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingKey(name)),
    }
}

fn env_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|e| ConfigError::Invalid {
            name,
            value: v.clone(),
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_secs(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(v) => {
            let secs: u64 = v.parse().map_err(|e| ConfigError::Invalid {
                name,
                value: v.clone(),
                reason: format!("{e}"),
            })?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

fn env_url(name: &'static str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|e| ConfigError::Invalid {
        name,
        value: raw.clone(),
        reason: format!("{e}"),
    })
}
