//! CLI entry point for the transit board data core.
//!
//! Runs the polling scheduler headlessly, takes one-shot snapshots for
//! debugging, and lists the configured stations. The interactive display is
//! a separate concern that subscribes to the snapshot store.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_board::{
    config::Config,
    fetch::{
        BasicClient,
        auth::{ApiKey, UrlParam},
    },
    scheduler::{
        Scheduler, refresh_alerts, refresh_forecast, refresh_realtime, refresh_weather,
    },
    snapshot::{Snapshot, SnapshotStore},
    transit::TransitClient,
    weather::WeatherClient,
};

#[derive(Parser)]
#[command(name = "transit_board")]
#[command(about = "Live transit and weather aggregation core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll all sources continuously until Ctrl-C
    Run,
    /// Fetch every source once, print the snapshot as JSON, and exit
    Snapshot,
    /// Print the configured station list
    Stations,
}

type Transit = TransitClient<ApiKey<BasicClient>>;
type Weather = WeatherClient<UrlParam<BasicClient>>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/transit_board.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_board.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    // Missing keys abort here, before any client exists or request is made.
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Snapshot => snapshot_once(config).await,
        Commands::Stations => {
            for station in &config.stations {
                println!("{}\t{}", station.id, station.name);
            }
            Ok(())
        }
    }
}

fn build_clients(config: &Config) -> Result<(Arc<Transit>, Arc<Weather>)> {
    let transit = TransitClient::new(
        ApiKey::api_key(
            BasicClient::with_timeout(config.poll.fetch_timeout)?,
            &config.transit_key,
        ),
        &config.endpoints,
    );
    let weather = WeatherClient::new(
        UrlParam::new(
            BasicClient::with_timeout(config.poll.fetch_timeout)?,
            "appid",
            &config.weather_key,
        ),
        &config.endpoints,
    );
    Ok((Arc::new(transit), Arc::new(weather)))
}

async fn run(config: Config) -> Result<()> {
    let (transit, weather) = build_clients(&config)?;
    let store = Arc::new(SnapshotStore::new());
    let scheduler = Scheduler::start(&config, transit, weather, store.clone());

    info!(
        location = %config.location.label,
        stations = config.stations.len(),
        "transit board core running, Ctrl-C to stop"
    );

    // Headless subscriber: log data-field changes as a stand-in for the
    // display, which would re-render on the same notifications.
    let mut rx = store.subscribe();
    let mut seen = FieldStamps::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                log_field_changes(&store.snapshot(), &mut seen);
            }
        }
    }

    info!("shutting down");
    scheduler.shutdown().await;
    Ok(())
}

async fn snapshot_once(config: Config) -> Result<()> {
    let (transit, weather) = build_clients(&config)?;
    let store = SnapshotStore::new();

    if let Err(error) = refresh_realtime(transit.as_ref(), &store).await {
        warn!(%error, "realtime refresh failed");
    }
    if let Err(error) = refresh_alerts(transit.as_ref(), &store).await {
        warn!(%error, "alerts refresh failed");
    }
    if let Err(error) = refresh_weather(weather.as_ref(), &store, &config.location).await {
        warn!(%error, "weather refresh failed");
    }
    if let Err(error) = refresh_forecast(weather.as_ref(), &store, &config.location).await {
        warn!(%error, "forecast refresh failed");
    }

    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
    Ok(())
}

#[derive(Default)]
struct FieldStamps {
    alerts: Option<DateTime<Utc>>,
    trips: Option<DateTime<Utc>>,
    weather: Option<DateTime<Utc>>,
    forecast: Option<DateTime<Utc>>,
}

fn log_field_changes(snapshot: &Snapshot, seen: &mut FieldStamps) {
    if snapshot.alerts.updated_at() != seen.alerts {
        seen.alerts = snapshot.alerts.updated_at();
        let count = snapshot.alerts.value().map_or(0, Vec::len);
        info!(alerts = count, "alerts refreshed");
    }
    if snapshot.trips.updated_at() != seen.trips {
        seen.trips = snapshot.trips.updated_at();
        let count = snapshot.trips.value().map_or(0, Vec::len);
        info!(trips = count, "trip board refreshed");
    }
    if snapshot.weather_now.updated_at() != seen.weather {
        seen.weather = snapshot.weather_now.updated_at();
        if let Some(weather) = snapshot.weather_now.value() {
            info!(temp = weather.temp, kind = ?weather.kind, "weather refreshed");
        }
    }
    if snapshot.forecast.updated_at() != seen.forecast {
        seen.forecast = snapshot.forecast.updated_at();
        let points = snapshot.forecast.value().map_or(0, |f| f.points.len());
        info!(points, "forecast refreshed");
    }
}
