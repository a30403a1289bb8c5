/// Cross-device rollups.
///
/// Unlike the per-device reports, an empty fleet is a valid answer here:
/// `global_metrics` returns an all-zero report instead of an error.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::stats::{self, round_to};
use crate::model::{Quantity, Reading};

pub const ALERT_TEMPERATURE_C: f64 = 35.0;
pub const ALERT_HUMIDITY_PCT: f64 = 80.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetQuantity {
    #[serde(rename = "media")]
    pub mean: f64,
    #[serde(rename = "minima")]
    pub min: f64,
    #[serde(rename = "maxima")]
    pub max: f64,
    #[serde(rename = "variacao")]
    pub range: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetReport {
    #[serde(rename = "silos_ativos")]
    pub active_devices: usize,
    #[serde(rename = "silos_em_alerta")]
    pub devices_in_alert: usize,
    #[serde(rename = "temperatura")]
    pub temperature: FleetQuantity,
    #[serde(rename = "umidade")]
    pub humidity: FleetQuantity,
}

impl FleetReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSummary {
    #[serde(rename = "media")]
    pub mean: f64,
    #[serde(rename = "minima")]
    pub min: f64,
    #[serde(rename = "maxima")]
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "total_leituras")]
    pub reading_count: usize,
    /// `None` when every reading lacks the quantity.
    #[serde(rename = "temperatura")]
    pub temperature: Option<RangeSummary>,
    #[serde(rename = "umidade")]
    pub humidity: Option<RangeSummary>,
    #[serde(rename = "ultima_leitura")]
    pub latest: DateTime<Utc>,
}

pub fn is_alert(reading: &Reading) -> bool {
    reading.temperature.is_some_and(|t| t >= ALERT_TEMPERATURE_C)
        || reading.humidity.is_some_and(|h| h >= ALERT_HUMIDITY_PCT)
}

/// Fleet summary from the latest reading of each device.
pub fn global_metrics(latest: &[Reading]) -> FleetReport {
    if latest.is_empty() {
        return FleetReport::empty();
    }

    let fleet_quantity = |quantity: Quantity| {
        let values: Vec<f64> = latest
            .iter()
            .filter_map(|r| r.value(quantity).filter(|v| v.is_finite()))
            .collect();
        match (stats::mean(&values), stats::min(&values), stats::max(&values)) {
            (Some(mean), Some(min), Some(max)) => FleetQuantity {
                mean: round_to(mean, 2),
                min: round_to(min, 2),
                max: round_to(max, 2),
                range: round_to(max - min, 2),
            },
            _ => FleetQuantity::default(),
        }
    };

    FleetReport {
        active_devices: latest.len(),
        devices_in_alert: latest.iter().filter(|r| is_alert(r)).count(),
        temperature: fleet_quantity(Quantity::Temperature),
        humidity: fleet_quantity(Quantity::Humidity),
    }
}

/// Summary of a device's most recent readings; `None` when there are none.
pub fn device_metrics(device_id: &str, recent: &[Reading]) -> Option<DeviceReport> {
    let latest = recent.iter().map(|r| r.timestamp).max()?;

    let summary = |quantity: Quantity| {
        let values: Vec<f64> = recent
            .iter()
            .filter_map(|r| r.value(quantity).filter(|v| v.is_finite()))
            .collect();
        Some(RangeSummary {
            mean: round_to(stats::mean(&values)?, 2),
            min: round_to(stats::min(&values)?, 2),
            max: round_to(stats::max(&values)?, 2),
        })
    };

    Some(DeviceReport {
        device_id: device_id.to_string(),
        reading_count: recent.len(),
        temperature: summary(Quantity::Temperature),
        humidity: summary(Quantity::Humidity),
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::base_time;
    use chrono::Duration;

    fn latest(device: &str, t: f64, h: f64) -> Reading {
        Reading::new(device, base_time(), t, h)
    }

    #[test]
    fn test_empty_fleet_is_all_zero() {
        let report = global_metrics(&[]);
        assert_eq!(report, FleetReport::empty());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["silos_ativos"], 0);
        assert_eq!(json["temperatura"]["variacao"], 0.0);
    }

    #[test]
    fn test_fleet_rollup_and_alerts() {
        let report = global_metrics(&[
            latest("silo-a", 20.0, 50.0),
            latest("silo-b", 35.0, 60.0),
            latest("silo-c", 25.0, 80.0),
        ]);

        assert_eq!(report.active_devices, 3);
        assert_eq!(report.devices_in_alert, 2);
        assert_eq!(report.temperature.mean, 26.67);
        assert_eq!(report.temperature.range, 15.0);
        assert_eq!(report.humidity.max, 80.0);
    }

    #[test]
    fn test_device_metrics_none_without_readings() {
        assert!(device_metrics("silo-a", &[]).is_none());
    }

    #[test]
    fn test_device_metrics_reports_latest_timestamp() {
        let readings = vec![
            Reading::new("silo-a", base_time() + Duration::hours(2), 24.0, 55.0),
            Reading::new("silo-a", base_time() + Duration::hours(1), 22.0, 57.0),
            Reading {
                timestamp: base_time(),
                temperature: None,
                humidity: Some(59.0),
                device_id: "silo-a".into(),
            },
        ];
        let report = device_metrics("silo-a", &readings).expect("has readings");

        assert_eq!(report.reading_count, 3);
        assert_eq!(report.latest, base_time() + Duration::hours(2));
        let temp = report.temperature.expect("temperature present");
        assert_eq!(temp.mean, 23.0);
        assert_eq!(report.humidity.map(|h| h.mean), Some(57.0));
    }
}
