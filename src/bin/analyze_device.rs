//! Compute a single analytics report for one device and print it as JSON.
//!
//! Reads from the PostgreSQL reading store by default. With `--demo` the
//! report runs over a synthetic 30-day series held in memory, so the tool can
//! be tried without a database.
//!
//! Usage:
//!   cargo run --bin analyze_device -- summary silo-norte-01
//!   cargo run --bin analyze_device -- energy silo-norte-01 --days 30
//!   cargo run --bin analyze_device -- fungus demo-silo --demo

use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use silowatch_analytics::config::{self, DEFAULT_CONFIG_PATH};
use silowatch_analytics::db;
use silowatch_analytics::model::{Quantity, Reading};
use silowatch_analytics::service::{AnalyticsService, ServiceError};
use silowatch_analytics::store::{MemoryStore, PgReadingStore, ReadingStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Report {
    Statistics,
    Anomalies,
    Trends,
    Correlation,
    Comfort,
    Summary,
    Amplitude,
    HumidityRate,
    Fungus,
    Critical,
    ForecastTemperature,
    ForecastHumidity,
    Patterns,
    Energy,
    FullForecast,
    Metrics,
}

#[derive(Parser)]
#[command(name = "analyze_device")]
#[command(about = "Compute one analytics report for a device and print it as JSON")]
struct Cli {
    /// Report to compute
    #[arg(value_enum)]
    report: Report,

    /// Device identifier
    device: String,

    /// Analysis window in days (hour-based reports use days * 24)
    #[arg(long, default_value_t = 7)]
    days: u32,

    /// Forecast horizon in days
    #[arg(long, default_value_t = 7)]
    horizon: u32,

    /// Use a synthetic in-memory series instead of the database
    #[arg(long)]
    demo: bool,

    /// Path to the service configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

/// 30 days of hourly readings with a daily cycle, a slow warming drift and a
/// few humid spikes.
fn demo_readings(device_id: &str) -> Vec<Reading> {
    let hours = 30 * 24;
    let start = Utc::now() - Duration::hours(hours);
    (0..hours)
        .map(|i| {
            let phase = ((i % 24) as f64 - 8.0) / 24.0 * std::f64::consts::TAU;
            let wobble = ((i as f64) * 0.37).sin();
            let spike = if i % 97 == 0 { 15.0 } else { 0.0 };
            Reading::new(
                device_id,
                start + Duration::hours(i),
                24.0 + 0.01 * i as f64 + 4.0 * phase.sin() + 0.5 * wobble,
                68.0 - 8.0 * phase.sin() + 1.5 * wobble + spike,
            )
        })
        .collect()
}

fn to_json<T: Serialize>(report: Result<T, ServiceError>) -> Result<String, Box<dyn std::error::Error>> {
    Ok(serde_json::to_string_pretty(&report?)?)
}

fn render(service: &AnalyticsService, cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    let device = cli.device.as_str();
    let hours = cli.days.saturating_mul(24);
    match cli.report {
        Report::Statistics => to_json(service.statistics(device, None, None)),
        Report::Anomalies => to_json(service.anomalies(device, hours, 3.0)),
        Report::Trends => to_json(service.trends(device, cli.days)),
        Report::Correlation => to_json(service.correlation(device, cli.days)),
        Report::Comfort => to_json(service.comfort(device, hours)),
        Report::Summary => to_json(service.device_summary(device, cli.days)),
        Report::Amplitude => to_json(service.thermal_amplitude(device, cli.days)),
        Report::HumidityRate => to_json(service.humidity_rate(device, cli.days)),
        Report::Fungus => to_json(service.fungus_risk(device, cli.days)),
        Report::Critical => to_json(service.critical_time(device, cli.days)),
        Report::ForecastTemperature => {
            to_json(service.forecast(device, Quantity::Temperature, cli.days, cli.horizon))
        }
        Report::ForecastHumidity => {
            to_json(service.forecast(device, Quantity::Humidity, cli.days, cli.horizon))
        }
        Report::Patterns => to_json(service.patterns(device, cli.days)),
        Report::Energy => to_json(service.default_energy(device, cli.days)),
        Report::FullForecast => to_json(service.full_forecast(device, cli.days, cli.horizon)),
        Report::Metrics => to_json(service.device_metrics(device, 100)),
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config(&cli.config).unwrap_or_else(|e| {
        log::warn!("{}; using defaults", e);
        Default::default()
    });

    let store: Arc<dyn ReadingStore> = if cli.demo {
        let store = MemoryStore::new();
        store.extend(demo_readings(&cli.device))?;
        Arc::new(store)
    } else {
        let client = db::connect_and_verify(&config.database.readings_table)?;
        Arc::new(PgReadingStore::new(client, &config.database.readings_table)?)
    };

    let service = AnalyticsService::new(store, config);
    println!("{}", render(&service, cli)?);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}
