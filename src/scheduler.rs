//! Drives the refresh cycles.
//!
//! Each data source gets its own cooperative task looping
//! wait → fetch → decode → publish. Sources never delay one another, and a
//! source can have at most one fetch in flight: the loop is sequential, timer
//! ticks that land mid-fetch are skipped, and manual triggers that arrive
//! mid-fetch are coalesced into the cycle that just ran. Failures are caught
//! here, logged, and turned into a stale flag on the affected field; after a
//! failure the next attempt waits an exponentially growing, capped delay.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{Config, Location};
use crate::error::PollError;
use crate::fetch::HttpClient;
use crate::snapshot::{SnapshotStore, Source};
use crate::transit::{ServiceAlert, TransitClient, TripStatus, decode};
use crate::weather::{WeatherClient, normalize_current, normalize_forecast, parse_payload};

/// Delay before retry attempt number `failures` (1-based): the base doubled
/// per consecutive failure, capped.
pub fn backoff_delay(base: Duration, cap: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}

/// One realtime-feed cycle: fetch, decode, publish the trip board.
pub async fn refresh_realtime<C: HttpClient>(
    client: &TransitClient<C>,
    store: &SnapshotStore,
) -> Result<(), PollError> {
    let bytes = client.fetch_realtime().await?;
    let feed = decode(&bytes)?;
    let trips = TripStatus::from_feed(&feed);
    debug!(entities = feed.entity.len(), trips = trips.len(), "realtime feed decoded");
    store.publish_trips(trips);
    Ok(())
}

/// One alerts cycle, filtered to alerts valid today.
pub async fn refresh_alerts<C: HttpClient>(
    client: &TransitClient<C>,
    store: &SnapshotStore,
) -> Result<(), PollError> {
    let bytes = client.fetch_alerts(Local::now().date_naive()).await?;
    let feed = decode(&bytes)?;
    let alerts = ServiceAlert::from_feed(&feed);
    debug!(alerts = alerts.len(), "alerts feed decoded");
    store.publish_alerts(alerts);
    Ok(())
}

/// One current-conditions cycle.
pub async fn refresh_weather<C: HttpClient>(
    client: &WeatherClient<C>,
    store: &SnapshotStore,
    location: &Location,
) -> Result<(), PollError> {
    let bytes = client
        .fetch_current(location.latitude, location.longitude)
        .await?;
    let payload = parse_payload(&bytes)?;
    let weather = normalize_current(&payload, Utc::now())?;
    store.publish_weather(weather);
    Ok(())
}

/// One forecast cycle.
pub async fn refresh_forecast<C: HttpClient>(
    client: &WeatherClient<C>,
    store: &SnapshotStore,
    location: &Location,
) -> Result<(), PollError> {
    let bytes = client
        .fetch_forecast(location.latitude, location.longitude)
        .await?;
    let payload = parse_payload(&bytes)?;
    let forecast = normalize_forecast(&payload, Utc::now())?;
    debug!(points = forecast.points.len(), "forecast normalized");
    store.publish_forecast(forecast);
    Ok(())
}

/// Running scheduler: one task per data source plus the clock task.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    triggers: Vec<(Source, watch::Sender<u64>)>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start<CT, CW>(
        config: &Config,
        transit: Arc<TransitClient<CT>>,
        weather: Arc<WeatherClient<CW>>,
        store: Arc<SnapshotStore>,
    ) -> Scheduler
    where
        CT: HttpClient + 'static,
        CW: HttpClient + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut triggers = Vec::new();
        let mut tasks = Vec::new();
        let poll = &config.poll;

        {
            let (tx, rx) = watch::channel(0u64);
            triggers.push((Source::Realtime, tx));
            let client = transit.clone();
            let target = store.clone();
            tasks.push(tokio::spawn(run_source(
                Source::Realtime,
                poll.transit_interval,
                poll.backoff_base,
                poll.backoff_cap,
                store.clone(),
                rx,
                shutdown_rx.clone(),
                move || {
                    let client = client.clone();
                    let store = target.clone();
                    async move { refresh_realtime(&client, &store).await }
                },
            )));
        }

        {
            let (tx, rx) = watch::channel(0u64);
            triggers.push((Source::Alerts, tx));
            let client = transit.clone();
            let target = store.clone();
            tasks.push(tokio::spawn(run_source(
                Source::Alerts,
                poll.alerts_interval,
                poll.backoff_base,
                poll.backoff_cap,
                store.clone(),
                rx,
                shutdown_rx.clone(),
                move || {
                    let client = client.clone();
                    let store = target.clone();
                    async move { refresh_alerts(&client, &store).await }
                },
            )));
        }

        {
            let (tx, rx) = watch::channel(0u64);
            triggers.push((Source::WeatherCurrent, tx));
            let client = weather.clone();
            let target = store.clone();
            let location = config.location.clone();
            tasks.push(tokio::spawn(run_source(
                Source::WeatherCurrent,
                poll.weather_interval,
                poll.backoff_base,
                poll.backoff_cap,
                store.clone(),
                rx,
                shutdown_rx.clone(),
                move || {
                    let client = client.clone();
                    let store = target.clone();
                    let location = location.clone();
                    async move { refresh_weather(&client, &store, &location).await }
                },
            )));
        }

        {
            let (tx, rx) = watch::channel(0u64);
            triggers.push((Source::WeatherForecast, tx));
            let client = weather.clone();
            let target = store.clone();
            let location = config.location.clone();
            tasks.push(tokio::spawn(run_source(
                Source::WeatherForecast,
                poll.forecast_interval,
                poll.backoff_base,
                poll.backoff_cap,
                store.clone(),
                rx,
                shutdown_rx.clone(),
                move || {
                    let client = client.clone();
                    let store = target.clone();
                    let location = location.clone();
                    async move { refresh_forecast(&client, &store, &location).await }
                },
            )));
        }

        tasks.push(tokio::spawn(run_clock(
            poll.clock_period,
            store.clone(),
            shutdown_rx,
        )));

        info!(
            transit_secs = poll.transit_interval.as_secs(),
            alerts_secs = poll.alerts_interval.as_secs(),
            weather_secs = poll.weather_interval.as_secs(),
            forecast_secs = poll.forecast_interval.as_secs(),
            "scheduler started"
        );

        Scheduler {
            shutdown: shutdown_tx,
            triggers,
            tasks,
        }
    }

    /// Bypasses the timer for one source, e.g. when the user presses the
    /// refresh key. A no-op if that source is already fetching.
    pub fn refresh_now(&self, source: Source) {
        if let Some((_, tx)) = self.triggers.iter().find(|(s, _)| *s == source) {
            tx.send_modify(|n| *n += 1);
        }
    }

    /// Stops all pollers. In-flight fetches are abandoned, not awaited; an
    /// abandoned fetch can never publish into the store.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("scheduler stopped");
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_source<F, Fut>(
    source: Source,
    period: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
    store: Arc<SnapshotStore>,
    mut trigger: watch::Receiver<u64>,
    mut shutdown: watch::Receiver<bool>,
    cycle: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), PollError>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick(), if failures == 0 => {}
            _ = tokio::time::sleep(backoff_delay(backoff_base, backoff_cap, failures)),
                if failures > 0 => {}
            changed = trigger.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!(%source, "manual refresh");
            }
        }
        if *shutdown.borrow() {
            break;
        }

        let outcome = tokio::select! {
            _ = shutdown.changed() => break,
            outcome = cycle() => outcome,
        };

        // A trigger that arrived while the fetch was in flight must not queue
        // a duplicate request.
        trigger.mark_unchanged();

        match outcome {
            Ok(()) => {
                if failures > 0 {
                    info!(%source, "refresh recovered");
                }
                failures = 0;
            }
            Err(error) => {
                failures += 1;
                let retry_in = backoff_delay(backoff_base, backoff_cap, failures);
                warn!(
                    %source,
                    error = %error,
                    failures,
                    retry_in_secs = retry_in.as_secs(),
                    "refresh failed, serving last known good value"
                );
                store.publish_error(source, &error);
            }
        }
    }
    debug!(%source, "poller stopped");
}

async fn run_clock(period: Duration, store: Arc<SnapshotStore>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => store.publish_clock(Local::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Endpoints, PollConfig};
    use crate::gtfs_rt::{FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate};
    use async_trait::async_trait;
    use prost::Message;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves scripted (status, body) sequences keyed by URL path suffix;
    /// 503 for unscripted paths or exhausted scripts. An optional delay
    /// simulates a slow fetch.
    struct ScriptedClient {
        routes: Mutex<Vec<(&'static str, VecDeque<(u16, Vec<u8>)>)>>,
        delay: Duration,
    }

    impl ScriptedClient {
        fn new(path: &'static str, responses: Vec<(u16, Vec<u8>)>) -> Self {
            Self {
                routes: Mutex::new(vec![(path, responses.into())]),
                delay: Duration::ZERO,
            }
        }

        fn slow(path: &'static str, responses: Vec<(u16, Vec<u8>)>, delay: Duration) -> Self {
            let mut client = Self::new(path, responses);
            client.delay = delay;
            client
        }

        fn empty() -> Self {
            Self {
                routes: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let path = req.url().path().to_string();
            let (status, body) = self
                .routes
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(suffix, _)| path.ends_with(suffix))
                .and_then(|(_, queue)| queue.pop_front())
                .unwrap_or((503, b"no scripted response".to_vec()));
            let resp = http::Response::builder().status(status).body(body).unwrap();
            Ok(resp.into())
        }
    }

    fn feed_with_trip(trip_id: &str) -> Vec<u8> {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1700000000),
                incrementality: None,
                feed_version: None,
            },
            entity: vec![FeedEntity {
                id: "1".to_string(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        trip_id: Some(trip_id.to_string()),
                        ..Default::default()
                    },
                    delay: Some(60),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        }
        .encode_to_vec()
    }

    fn test_config() -> Config {
        Config {
            transit_key: "test".to_string(),
            weather_key: "test".to_string(),
            location: crate::config::Location {
                latitude: 33.8688,
                longitude: 151.2093,
                label: "Sydney".to_string(),
            },
            endpoints: Endpoints {
                realtime: "http://transit.test/realtime".parse().unwrap(),
                alerts: "http://transit.test/alerts".parse().unwrap(),
                weather_current: "http://weather.test/weather".parse().unwrap(),
                weather_forecast: "http://weather.test/forecast".parse().unwrap(),
            },
            poll: PollConfig {
                transit_interval: Duration::from_secs(3600),
                alerts_interval: Duration::from_secs(3600),
                weather_interval: Duration::from_secs(3600),
                forecast_interval: Duration::from_secs(3600),
                clock_period: Duration::from_millis(250),
                fetch_timeout: Duration::from_secs(5),
                backoff_base: Duration::from_secs(2),
                backoff_cap: Duration::from_secs(60),
            },
            stations: vec![],
        }
    }

    fn start_with_realtime(
        config: &Config,
        realtime: ScriptedClient,
    ) -> (Scheduler, Arc<SnapshotStore>) {
        let transit = Arc::new(TransitClient::new(realtime, &config.endpoints));
        let weather = Arc::new(WeatherClient::new(ScriptedClient::empty(), &config.endpoints));
        let store = Arc::new(SnapshotStore::new());
        let scheduler = Scheduler::start(config, transit, weather, store.clone());
        (scheduler, store)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, cap, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, cap, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, cap, 5), Duration::from_secs(32));
        assert_eq!(backoff_delay(base, cap, 6), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, cap, 1000), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_500_then_recovery_with_backoff() {
        let config = test_config();
        let realtime = ScriptedClient::new(
            "/realtime",
            vec![
                (500, b"upstream broke".to_vec()),
                (200, feed_with_trip("100.A")),
            ],
        );
        let (scheduler, store) = start_with_realtime(&config, realtime);

        let mut rx = store.subscribe();

        // First cycle fails: the field goes stale but nothing crashes and no
        // value is invented.
        loop {
            rx.changed().await.unwrap();
            let snap = store.snapshot();
            if snap.trips.is_stale() {
                assert!(snap.trips.value().is_none());
                assert!(snap.trips.last_error().unwrap().contains("500"));
                break;
            }
        }

        // The backoff retry then lands the data and clears staleness.
        loop {
            rx.changed().await.unwrap();
            let snap = store.snapshot();
            if let Some(trips) = snap.trips.value() {
                assert_eq!(trips[0].trip_id, "100.A");
                assert!(!snap.trips.is_stale());
                break;
            }
        }

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now_bypasses_timer() {
        let config = test_config();
        let realtime = ScriptedClient::new(
            "/realtime",
            vec![
                (200, feed_with_trip("100.A")),
                (200, feed_with_trip("101.B")),
            ],
        );
        let (scheduler, store) = start_with_realtime(&config, realtime);

        let mut rx = store.subscribe();
        loop {
            rx.changed().await.unwrap();
            if store.snapshot().trips.value().is_some() {
                break;
            }
        }

        let asked_at = tokio::time::Instant::now();
        scheduler.refresh_now(Source::Realtime);

        loop {
            rx.changed().await.unwrap();
            let snap = store.snapshot();
            if let Some(trips) = snap.trips.value() {
                if trips[0].trip_id == "101.B" {
                    break;
                }
            }
        }
        // far sooner than the 3600 s timer would have delivered it
        assert!(asked_at.elapsed() < config.poll.transit_interval);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_fetch_does_not_queue_duplicate() {
        let config = test_config();
        let realtime = ScriptedClient::slow(
            "/realtime",
            vec![
                (200, feed_with_trip("100.A")),
                (200, feed_with_trip("101.B")),
            ],
            Duration::from_secs(10),
        );
        let (scheduler, store) = start_with_realtime(&config, realtime);

        // Let the first fetch get in flight, then trigger while it runs.
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.refresh_now(Source::Realtime);

        let mut rx = store.subscribe();
        loop {
            rx.changed().await.unwrap();
            if store.snapshot().trips.value().is_some() {
                break;
            }
        }

        // The coalesced trigger must not have started a second fetch.
        tokio::time::sleep(Duration::from_secs(200)).await;
        let snap = store.snapshot();
        assert_eq!(snap.trips.value().unwrap()[0].trip_id, "100.A");

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_publishing() {
        let config = test_config();
        let (scheduler, store) =
            start_with_realtime(&config, ScriptedClient::new("/realtime", vec![(200, feed_with_trip("100.A"))]));

        scheduler.shutdown().await;

        let version = store.version();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.version(), version);
    }

    #[tokio::test]
    async fn test_refresh_weather_missing_field_is_normalize_error() {
        let config = test_config();
        let payload = serde_json::json!({
            "dt": 1700000000,
            "main": {"humidity": 50},
            "weather": [{"id": 800, "main": "Clear"}],
            "wind": {"speed": 3.0}
        });
        let weather = WeatherClient::new(
            ScriptedClient::new("/weather", vec![(200, serde_json::to_vec(&payload).unwrap())]),
            &config.endpoints,
        );
        let store = SnapshotStore::new();

        let err = refresh_weather(&weather, &store, &config.location)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PollError::Normalize(crate::error::NormalizeError::Missing("main.temp"))
        ));
        // nothing was published
        assert!(store.snapshot().weather_now.value().is_none());
    }
}
