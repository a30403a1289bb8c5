/// silowatch_analytics: grain silo temperature/humidity analytics service.
///
/// # Module structure
///
/// ```text
/// silowatch_analytics
/// ├── model       - shared data types (Reading, ReadingSeries, Quantity, TimeWindow)
/// ├── error       - AnalyticsError taxonomy
/// ├── config      - service configuration loader (analytics.toml)
/// ├── db          - PostgreSQL connection + schema validation
/// ├── store       - ReadingStore trait, in-memory and PostgreSQL stores
/// ├── weather     - Open-Meteo client and internal/external comparison
/// ├── service     - parameter validation, composite reports, worker fan-out
/// ├── endpoint    - HTTP API over the service
/// ├── analysis
/// │   ├── stats      - shared statistical primitives
/// │   ├── analytics  - statistics, anomalies, trends, correlation, comfort
/// │   ├── indicators - thermal amplitude, humidity rate, fungus risk, critical time
/// │   ├── forecast   - patterns, energy, forecasting over a SeasonalForecaster
/// │   ├── harmonic   - built-in trend + Fourier forecaster (feature `forecast`)
/// │   └── metrics    - fleet and per-device metrics
/// └── fixtures (test only) - synthetic series and API payloads
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod db;
pub mod endpoint;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod weather;

#[cfg(test)]
mod fixtures;
