//! Pure normalization of weather JSON into domain types.
//!
//! No network access here; everything takes a parsed [`Value`] so fixtures
//! exercise the same code paths the scheduler runs. A missing or mistyped
//! field becomes a [`NormalizeError`] naming the JSON path, and raw JSON
//! never travels further than this module.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::NormalizeError;
use crate::weather::model::{
    ConditionKind, ConditionSummary, ForecastPoint, ForecastSeries, WeatherSnapshot,
};

/// Parses raw response bytes into JSON.
pub fn parse_payload(bytes: &[u8]) -> Result<Value, NormalizeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Normalizes a current-conditions payload.
pub fn normalize_current(
    value: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<WeatherSnapshot, NormalizeError> {
    let temp = require_f64(value, &["main", "temp"], "main.temp")?;
    let wind_speed = require_f64(value, &["wind", "speed"], "wind.speed")?;
    let observed_at = epoch_time(require_i64(value, &["dt"], "dt")?, "dt")?;

    let conditions = condition_list(&value["weather"], "weather")?;
    let primary = conditions
        .first()
        .ok_or(NormalizeError::Missing("weather.0"))?;
    let kind = ConditionKind::from_code(primary.id, wind_speed);

    Ok(WeatherSnapshot {
        temp,
        feels_like: optional_f64(value, &["main", "feels_like"]),
        temp_min: optional_f64(value, &["main", "temp_min"]),
        temp_max: optional_f64(value, &["main", "temp_max"]),
        humidity: optional_f64(value, &["main", "humidity"]),
        conditions,
        kind,
        wind_speed,
        wind_deg: optional_f64(value, &["wind", "deg"]),
        observed_at,
        fetched_at,
    })
}

/// Normalizes a forecast payload into a series with strictly ascending
/// timestamps. The previous series is always replaced wholesale; entries are
/// never merged across fetches.
pub fn normalize_forecast(
    value: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<ForecastSeries, NormalizeError> {
    let list = value["list"]
        .as_array()
        .ok_or(NormalizeError::Missing("list"))?;

    let mut points = Vec::with_capacity(list.len());
    for item in list {
        let time = epoch_time(require_i64(item, &["dt"], "list.dt")?, "list.dt")?;
        let temp = require_f64(item, &["main", "temp"], "list.main.temp")?;
        points.push(ForecastPoint {
            time,
            temp,
            temp_min: optional_f64(item, &["main", "temp_min"]),
            temp_max: optional_f64(item, &["main", "temp_max"]),
            conditions: condition_list(&item["weather"], "list.weather")?,
            cloudiness_pct: optional_f64(item, &["clouds", "all"]),
            wind_speed: optional_f64(item, &["wind", "speed"]),
            precipitation_chance: optional_f64(item, &["pop"]),
        });
    }

    points.sort_by_key(|p| p.time);
    points.dedup_by_key(|p| p.time);

    Ok(ForecastSeries { points, fetched_at })
}

fn condition_list(value: &Value, name: &'static str) -> Result<Vec<ConditionSummary>, NormalizeError> {
    let entries = value.as_array().ok_or(NormalizeError::Missing(name))?;
    entries
        .iter()
        .map(|entry| {
            let id = entry["id"]
                .as_u64()
                .ok_or(NormalizeError::Invalid("weather.id"))? as u32;
            Ok(ConditionSummary {
                id,
                name: entry["main"].as_str().unwrap_or_default().to_string(),
                description: entry["description"].as_str().map(String::from),
            })
        })
        .collect()
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    Some(cursor)
}

fn require_f64(value: &Value, path: &[&str], name: &'static str) -> Result<f64, NormalizeError> {
    match lookup(value, path) {
        None | Some(Value::Null) => Err(NormalizeError::Missing(name)),
        Some(v) => v.as_f64().ok_or(NormalizeError::Invalid(name)),
    }
}

fn require_i64(value: &Value, path: &[&str], name: &'static str) -> Result<i64, NormalizeError> {
    match lookup(value, path) {
        None | Some(Value::Null) => Err(NormalizeError::Missing(name)),
        Some(v) => v.as_i64().ok_or(NormalizeError::Invalid(name)),
    }
}

fn optional_f64(value: &Value, path: &[&str]) -> Option<f64> {
    lookup(value, path).and_then(Value::as_f64)
}

fn epoch_time(secs: i64, name: &'static str) -> Result<DateTime<Utc>, NormalizeError> {
    DateTime::from_timestamp(secs, 0).ok_or(NormalizeError::Invalid(name))
}
