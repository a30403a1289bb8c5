/// The analytics engine.
///
/// Submodules:
/// - `stats` - numeric primitives and statistical capabilities
/// - `analytics` - descriptive statistics, anomalies, trends, correlation, comfort
/// - `indicators` - thermal amplitude, humidity rate, fungus risk, critical time
/// - `forecast` - patterns, seasonal forecasts, energy cost
/// - `harmonic` - built-in seasonal forecaster (feature `forecast`)
/// - `metrics` - cross-device rollups
///
/// Every report function is pure over its input: no I/O, no shared state.

pub mod analytics;
pub mod forecast;
#[cfg(feature = "forecast")]
pub mod harmonic;
pub mod indicators;
pub mod metrics;
pub mod stats;
