//! The snapshot store: last-known-good state for every data source.
//!
//! The store exclusively owns all entity data. Writers are the scheduler's
//! publish paths only; readers get a cheap clone (fields are `Arc` swaps) and
//! never wait on an in-flight fetch. Every publish, successful or not, bumps
//! a version counter on a watch channel so subscribers can re-read.

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::PollError;
use crate::transit::{ServiceAlert, TripStatus};
use crate::weather::{ForecastSeries, WeatherSnapshot};

/// The data sources the scheduler refreshes independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    Realtime,
    Alerts,
    WeatherCurrent,
    WeatherForecast,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Realtime => "realtime",
            Source::Alerts => "alerts",
            Source::WeatherCurrent => "weather",
            Source::WeatherForecast => "forecast",
        };
        f.write_str(name)
    }
}

/// One independently refreshable snapshot field.
///
/// A failed refresh flags the field stale and records the error but never
/// touches the held value; the last-known-good data keeps being served.
#[derive(Debug, Serialize)]
pub struct Field<T> {
    value: Option<Arc<T>>,
    updated_at: Option<DateTime<Utc>>,
    stale: bool,
    last_error: Option<String>,
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        self.value.as_deref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Time since the value was last refreshed successfully.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.updated_at.map(|at| now - at)
    }

    fn set(&mut self, value: T, now: DateTime<Utc>) {
        self.value = Some(Arc::new(value));
        self.updated_at = Some(now);
        self.stale = false;
        self.last_error = None;
    }

    fn mark_stale(&mut self, error: String) {
        self.stale = true;
        self.last_error = Some(error);
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field {
            value: None,
            updated_at: None,
            stale: false,
            last_error: None,
        }
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Field {
            value: self.value.clone(),
            updated_at: self.updated_at,
            stale: self.stale,
            last_error: self.last_error.clone(),
        }
    }
}

/// The aggregate the presentation layer reads.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub clock: DateTime<Local>,
    pub alerts: Field<Vec<ServiceAlert>>,
    pub trips: Field<Vec<TripStatus>>,
    pub weather_now: Field<WeatherSnapshot>,
    pub forecast: Field<ForecastSeries>,
}

impl Snapshot {
    /// The clock formatted the way the time display renders it.
    pub fn clock_hhmmss(&self) -> String {
        self.clock.format("%H:%M:%S").to_string()
    }
}

pub struct SnapshotStore {
    state: RwLock<Snapshot>,
    version: watch::Sender<u64>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        SnapshotStore {
            state: RwLock::new(Snapshot {
                clock: Local::now(),
                alerts: Field::default(),
                trips: Field::default(),
                weather_now: Field::default(),
                forecast: Field::default(),
            }),
            version,
        }
    }

    /// Returns the current snapshot immediately. Never waits on a fetch;
    /// field updates are whole-value swaps so a reader can never observe a
    /// partially written field.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().expect("snapshot lock poisoned").clone()
    }

    /// Subscribes to publish notifications. The receiver observes the version
    /// counter; dropping it unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn publish_alerts(&self, alerts: Vec<ServiceAlert>) {
        self.update(|state, now| state.alerts.set(alerts, now));
    }

    pub fn publish_trips(&self, trips: Vec<TripStatus>) {
        self.update(|state, now| state.trips.set(trips, now));
    }

    pub fn publish_weather(&self, weather: WeatherSnapshot) {
        self.update(|state, now| state.weather_now.set(weather, now));
    }

    pub fn publish_forecast(&self, forecast: ForecastSeries) {
        self.update(|state, now| state.forecast.set(forecast, now));
    }

    pub fn publish_clock(&self, now: DateTime<Local>) {
        self.update(|state, _| state.clock = now);
    }

    /// Records a failed refresh: the affected field keeps its last-known-good
    /// value but is flagged stale, and subscribers are still notified so the
    /// display can surface the condition.
    pub fn publish_error(&self, source: Source, error: &PollError) {
        let message = error.to_string();
        self.update(|state, _| match source {
            Source::Realtime => state.trips.mark_stale(message),
            Source::Alerts => state.alerts.mark_stale(message),
            Source::WeatherCurrent => state.weather_now.mark_stale(message),
            Source::WeatherForecast => state.forecast.mark_stale(message),
        });
    }

    fn update<F: FnOnce(&mut Snapshot, DateTime<Utc>)>(&self, apply: F) {
        {
            let mut state = self.state.write().expect("snapshot lock poisoned");
            apply(&mut state, Utc::now());
        }
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
