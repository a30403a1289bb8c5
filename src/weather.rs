/// Open-Meteo weather API client
///
/// Fetches current conditions, forecasts and archived observations for a
/// coordinate, and compares a silo's latest internal reading with the
/// outside conditions.
///
/// API Documentation: https://open-meteo.com/en/docs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::analysis::stats::round_to;
use crate::config::WeatherSection;

const HOURLY_VARIABLES: &str = "temperature_2m,relative_humidity_2m,precipitation,wind_speed_10m";
const DAILY_VARIABLES: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Open-Meteo API error: {0}")]
    Status(reqwest::StatusCode),

    #[error("unexpected Open-Meteo payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("current conditions not present in response")]
    MissingCurrent,
}

// ============================================================================
// Response structures
// ============================================================================

/// `current` block of a `/forecast?current=...` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentWeather {
    pub time: Option<String>,
    #[serde(rename = "temperature_2m")]
    pub temperature: Option<f64>,
    #[serde(rename = "relative_humidity_2m")]
    pub humidity: Option<f64>,
    pub precipitation: Option<f64>,
    #[serde(rename = "wind_speed_10m")]
    pub wind_speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CurrentEnvelope {
    current: Option<CurrentWeather>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conditions {
    #[serde(rename = "temperatura")]
    pub temperature: Option<f64>,
    #[serde(rename = "umidade")]
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherComparison {
    #[serde(rename = "interno")]
    pub internal: Conditions,
    #[serde(rename = "externo")]
    pub external: Conditions,
    /// internal - external, `None` when either side is missing.
    #[serde(rename = "diferencas")]
    pub differences: Conditions,
    pub timestamp: Option<String>,
}

// ============================================================================
// URL construction
// ============================================================================

fn coordinate_params(latitude: f64, longitude: f64, timezone: &str) -> String {
    format!(
        "latitude={}&longitude={}&timezone={}",
        latitude,
        longitude,
        urlencoding::encode(timezone)
    )
}

pub fn current_url(config: &WeatherSection, latitude: f64, longitude: f64) -> String {
    format!(
        "{}/forecast?{}&current={}",
        config.base_url,
        coordinate_params(latitude, longitude, &config.timezone),
        HOURLY_VARIABLES
    )
}

pub fn forecast_url(config: &WeatherSection, latitude: f64, longitude: f64, days: u32) -> String {
    format!(
        "{}/forecast?{}&hourly={}&daily={}&forecast_days={}",
        config.base_url,
        coordinate_params(latitude, longitude, &config.timezone),
        HOURLY_VARIABLES,
        DAILY_VARIABLES,
        days
    )
}

pub fn history_url(
    config: &WeatherSection,
    latitude: f64,
    longitude: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> String {
    format!(
        "{}/archive?{}&start_date={}&end_date={}&hourly={}",
        config.archive_url,
        coordinate_params(latitude, longitude, &config.timezone),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        HOURLY_VARIABLES
    )
}

// ============================================================================
// Parsing and comparison
// ============================================================================

pub fn parse_current(json: &str) -> Result<CurrentWeather, WeatherError> {
    let envelope: CurrentEnvelope = serde_json::from_str(json)?;
    envelope.current.ok_or(WeatherError::MissingCurrent)
}

/// Internal minus external conditions, rounded to 2 decimals.
pub fn compare(
    internal_temp: Option<f64>,
    internal_humidity: Option<f64>,
    current: &CurrentWeather,
) -> WeatherComparison {
    let diff = |a: Option<f64>, b: Option<f64>| Some(round_to(a? - b?, 2));

    WeatherComparison {
        internal: Conditions {
            temperature: internal_temp,
            humidity: internal_humidity,
        },
        external: Conditions {
            temperature: current.temperature,
            humidity: current.humidity,
        },
        differences: Conditions {
            temperature: diff(internal_temp, current.temperature),
            humidity: diff(internal_humidity, current.humidity),
        },
        timestamp: current.time.clone(),
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct WeatherClient {
    http: reqwest::blocking::Client,
    config: WeatherSection,
}

impl WeatherClient {
    pub fn new(config: WeatherSection) -> Result<Self, WeatherError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn get_text(&self, url: &str) -> Result<String, WeatherError> {
        log::debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status()));
        }
        Ok(response.text()?)
    }

    pub fn fetch_current(&self, latitude: f64, longitude: f64) -> Result<CurrentWeather, WeatherError> {
        let body = self.get_text(&current_url(&self.config, latitude, longitude))?;
        parse_current(&body)
    }

    /// Raw forecast document (hourly and daily blocks).
    pub fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        days: u32,
    ) -> Result<serde_json::Value, WeatherError> {
        let body = self.get_text(&forecast_url(&self.config, latitude, longitude, days))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Raw archived hourly observations between two dates, inclusive.
    pub fn fetch_history(
        &self,
        latitude: f64,
        longitude: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<serde_json::Value, WeatherError> {
        let body = self.get_text(&history_url(&self.config, latitude, longitude, start, end))?;
        Ok(serde_json::from_str(&body)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{fixture_open_meteo_forecast_json, fixture_open_meteo_partial_json};

    #[test]
    fn test_parse_current_block() {
        let current = parse_current(fixture_open_meteo_forecast_json()).expect("fixture should parse");
        assert_eq!(current.temperature, Some(29.4));
        assert_eq!(current.humidity, Some(71.0));
        assert_eq!(current.time.as_deref(), Some("2025-03-10T14:00"));
    }

    #[test]
    fn test_parse_without_current_block() {
        let err = parse_current(r#"{"latitude": 1.0}"#).unwrap_err();
        assert!(matches!(err, WeatherError::MissingCurrent));
    }

    #[test]
    fn test_compare_differences() {
        let current = parse_current(fixture_open_meteo_forecast_json()).unwrap();
        let cmp = compare(Some(32.15), Some(65.0), &current);

        assert_eq!(cmp.differences.temperature, Some(2.75));
        assert_eq!(cmp.differences.humidity, Some(-6.0));
        assert_eq!(cmp.external.temperature, Some(29.4));
    }

    #[test]
    fn test_compare_missing_external_humidity() {
        let current = parse_current(fixture_open_meteo_partial_json()).unwrap();
        let cmp = compare(Some(30.0), Some(60.0), &current);
        assert_eq!(cmp.differences.temperature, Some(3.0));
        assert_eq!(cmp.differences.humidity, None);

        let json = serde_json::to_value(&cmp).unwrap();
        assert!(json["diferencas"]["umidade"].is_null());
    }

    #[test]
    fn test_urls_encode_timezone() {
        let config = WeatherSection::default();
        let url = forecast_url(&config, -8.05, -34.9, 7);
        assert!(url.starts_with("https://api.open-meteo.com/v1/forecast?"));
        assert!(url.contains("timezone=America%2FRecife"));
        assert!(url.contains("forecast_days=7"));

        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let url = history_url(&config, -8.05, -34.9, start, end);
        assert!(url.starts_with("https://archive-api.open-meteo.com/v1/archive?"));
        assert!(url.contains("start_date=2025-01-01&end_date=2025-01-31"));
    }
}
