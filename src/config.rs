/// Service configuration loader - parses analytics.toml
///
/// Keeps ports, table names, weather API endpoints, forecaster tuning and
/// energy tariffs out of the code. Every section is optional; a missing
/// section or key falls back to the defaults below.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::analysis::forecast::{DEFAULT_COST_PER_KWH, DEFAULT_TARGET_TEMP_C};

pub const DEFAULT_CONFIG_PATH: &str = "analytics.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root of analytics.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub database: DatabaseSection,
    pub weather: WeatherSection,
    pub forecast: ForecastSection,
    pub energy: EnergySection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub endpoint_port: u16,
    /// Size of the pool used to fan out composite reports.
    pub worker_threads: usize,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            endpoint_port: 8082,
            worker_threads: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Schema-qualified table holding the raw readings.
    pub readings_table: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            readings_table: "sensors.readings".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeatherSection {
    pub base_url: String,
    pub archive_url: String,
    pub timezone: String,
    pub timeout_secs: u64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1".to_string(),
            archive_url: "https://archive-api.open-meteo.com/v1".to_string(),
            timezone: "America/Recife".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastSection {
    pub enabled: bool,
    pub daily_fourier_order: usize,
    pub weekly_fourier_order: usize,
    /// Coverage of the uncertainty band, in (0, 1).
    pub interval_width: f64,
}

impl Default for ForecastSection {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_fourier_order: 4,
            weekly_fourier_order: 3,
            interval_width: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnergySection {
    pub target_temp_c: f64,
    pub cost_per_kwh: f64,
}

impl Default for EnergySection {
    fn default() -> Self {
        Self {
            target_temp_c: DEFAULT_TARGET_TEMP_C,
            cost_per_kwh: DEFAULT_COST_PER_KWH,
        }
    }
}

impl ServiceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.service.worker_threads == 0 {
            return Err(ConfigError::Invalid("service.worker_threads must be at least 1".into()));
        }
        let width = self.forecast.interval_width;
        if !(width > 0.0 && width < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "forecast.interval_width must be in (0, 1), got {}",
                width
            )));
        }
        if self.energy.cost_per_kwh < 0.0 {
            return Err(ConfigError::Invalid("energy.cost_per_kwh must not be negative".into()));
        }
        Ok(())
    }
}

/// Parses configuration from a TOML string.
pub fn parse_config(contents: &str, origin: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads analytics.toml (or another path).
pub fn load_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    parse_config(&contents, &display)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("", "inline").expect("empty config is valid");
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.energy.target_temp_c, 22.0);
        assert_eq!(config.energy.cost_per_kwh, 0.85);
        assert_eq!(config.weather.timezone, "America/Recife");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse_config("[service]\nendpoint_port = 9000\n", "inline").unwrap();
        assert_eq!(config.service.endpoint_port, 9000);
        assert_eq!(config.service.worker_threads, 4);
        assert!(config.forecast.enabled);
    }

    #[test]
    fn test_rejects_bad_interval_width() {
        let err = parse_config("[forecast]\ninterval_width = 1.2\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml_reports_origin() {
        let err = parse_config("[service\n", "analytics.toml").unwrap_err();
        assert!(err.to_string().contains("analytics.toml"));
    }

    #[test]
    fn test_load_project_config() {
        let config = load_config(concat!(env!("CARGO_MANIFEST_DIR"), "/analytics.toml"))
            .expect("analytics.toml should parse");
        assert!(config.service.worker_threads >= 1);
        assert!(config.database.readings_table.contains('.'));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        assert!(matches!(
            load_config("/nonexistent/analytics.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
