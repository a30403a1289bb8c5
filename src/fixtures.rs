/// Test fixtures: synthetic reading series and captured Open-Meteo payloads.
///
/// Series start on Monday 2025-03-10 00:00 UTC so that day-of-week grouping
/// is predictable. Only compiled for tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::model::{Reading, ReadingSeries};

pub const DEVICE: &str = "silo-norte-01";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
}

/// `n` hourly readings whose values come from `f(i)`.
pub fn hourly_series(n: usize, f: impl Fn(usize) -> (f64, f64)) -> ReadingSeries {
    spaced_series(n, Duration::hours(1), f)
}

pub fn spaced_series(
    n: usize,
    step: Duration,
    f: impl Fn(usize) -> (f64, f64),
) -> ReadingSeries {
    let readings = (0..n)
        .map(|i| {
            let (t, h) = f(i);
            Reading::new(DEVICE, base_time() + step * i as i32, t, h)
        })
        .collect();
    ReadingSeries::new(DEVICE, readings)
}

pub fn constant_series(n: usize, temperature: f64, humidity: f64) -> ReadingSeries {
    hourly_series(n, |_| (temperature, humidity))
}

/// Hourly readings with a daily temperature cycle peaking at 14:00 and
/// humidity moving opposite to it.
pub fn diurnal_series(days: usize) -> ReadingSeries {
    hourly_series(days * 24, |i| {
        let phase = ((i % 24) as f64 - 8.0) / 24.0 * std::f64::consts::TAU;
        let t = 25.0 + 4.0 * phase.sin();
        let h = 60.0 - 10.0 * phase.sin();
        (t, h)
    })
}

/// Builds a series from explicit `(hour offset, temperature, humidity)`.
pub fn series_at_hours(points: &[(i64, Option<f64>, Option<f64>)]) -> ReadingSeries {
    let readings = points
        .iter()
        .map(|&(hour, t, h)| Reading {
            timestamp: base_time() + Duration::hours(hour),
            temperature: t,
            humidity: h,
            device_id: DEVICE.to_string(),
        })
        .collect();
    ReadingSeries::new(DEVICE, readings)
}

/// Open-Meteo `/v1/forecast` response with `current` and a 2-hour forecast.
pub fn fixture_open_meteo_forecast_json() -> &'static str {
    r#"{
  "latitude": -8.05,
  "longitude": -34.9,
  "timezone": "America/Recife",
  "current": {
    "time": "2025-03-10T14:00",
    "interval": 900,
    "temperature_2m": 29.4,
    "relative_humidity_2m": 71,
    "precipitation": 0.0,
    "wind_speed_10m": 12.3
  },
  "hourly": {
    "time": ["2025-03-10T14:00", "2025-03-10T15:00"],
    "temperature_2m": [29.4, 29.0],
    "relative_humidity_2m": [71, 73],
    "precipitation": [0.0, 0.2],
    "wind_speed_10m": [12.3, 11.8]
  },
  "daily": {
    "time": ["2025-03-10"],
    "temperature_2m_max": [30.1],
    "temperature_2m_min": [24.2],
    "precipitation_sum": [1.4]
  }
}"#
}

/// `current` block with humidity missing.
pub fn fixture_open_meteo_partial_json() -> &'static str {
    r#"{
  "current": {
    "time": "2025-03-10T14:00",
    "temperature_2m": 27.0,
    "relative_humidity_2m": null
  }
}"#
}
