//! Silo Analytics Service - HTTP server
//!
//! Loads configuration, connects to the PostgreSQL reading store and serves
//! the analytics API over HTTP.
//!
//! Usage:
//!   cargo run --release                        # Serve on the configured port
//!   cargo run --release -- --port 9000         # Override the port
//!   cargo run --release -- --config other.toml # Alternate config file
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string
//!   RUST_LOG     - log verbosity (default: info)

use std::sync::Arc;

use clap::Parser;

use silowatch_analytics::config::{self, DEFAULT_CONFIG_PATH};
use silowatch_analytics::db;
use silowatch_analytics::endpoint;
use silowatch_analytics::service::AnalyticsService;
use silowatch_analytics::store::PgReadingStore;
use silowatch_analytics::weather::WeatherClient;

#[derive(Parser)]
#[command(name = "silowatch_analytics")]
#[command(about = "Temperature and humidity analytics for grain silo sensors")]
#[command(version)]
struct Cli {
    /// Path to the service configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the HTTP port from the configuration
    #[arg(long)]
    port: Option<u16>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    println!("🌾 Silo Analytics Service");
    println!("=========================\n");

    if let Err(e) = run(cli) {
        eprintln!("\n❌ {}\n", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config(&cli.config)?;
    println!("✓ Configuration loaded from {}", cli.config);

    println!("📊 Connecting to database...");
    let client = db::connect_and_verify(&config.database.readings_table)?;
    let store = PgReadingStore::new(client, &config.database.readings_table)?;
    println!("✓ Reading store ready ({})\n", config.database.readings_table);

    let port = cli.port.unwrap_or(config.service.endpoint_port);
    let weather = WeatherClient::new(config.weather.clone());
    let mut service = AnalyticsService::new(Arc::new(store), config);
    match weather {
        Ok(client) => service = service.with_weather(client),
        Err(e) => log::warn!("weather client unavailable: {}", e),
    }

    if !service.forecasting_available() {
        println!("⚠️  Forecasting disabled; /api/forecast temperature and humidity routes answer 503");
    }

    println!("📡 Serving analytics API on port {}", port);
    endpoint::start_endpoint_server(port, service)?;
    Ok(())
}
