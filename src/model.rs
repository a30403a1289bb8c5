/// Shared data types for the silo analytics service.
///
/// `Reading` is a single timestamped temperature/humidity sample as it comes
/// out of the reading store. `ReadingSeries` is the normalised, time-sorted
/// view of one device's readings that every report function consumes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// One temperature/humidity sample from a device.
///
/// Either value may be missing; the store maps SQL NULL to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "temperatura")]
    pub temperature: Option<f64>,
    #[serde(rename = "umidade")]
    pub humidity: Option<f64>,
    #[serde(rename = "dispositivo")]
    pub device_id: String,
}

impl Reading {
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        temperature: f64,
        humidity: f64,
    ) -> Self {
        Self {
            timestamp,
            temperature: Some(temperature),
            humidity: Some(humidity),
            device_id: device_id.into(),
        }
    }

    /// Value of the requested quantity, if present.
    pub fn value(&self, quantity: Quantity) -> Option<f64> {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
        }
    }

    /// Both values, only when neither is missing.
    pub fn pair(&self) -> Option<(f64, f64)> {
        Some((self.temperature?, self.humidity?))
    }
}

/// The two measured quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quantity {
    #[serde(rename = "temperatura")]
    Temperature,
    #[serde(rename = "umidade")]
    Humidity,
}

impl Quantity {
    pub const ALL: [Quantity; 2] = [Quantity::Temperature, Quantity::Humidity];

    /// Consumer-facing label, matches the serialised form.
    pub fn label(self) -> &'static str {
        match self {
            Quantity::Temperature => "temperatura",
            Quantity::Humidity => "umidade",
        }
    }
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Time-sorted readings for a single device.
///
/// Construction enforces the series invariants: ascending timestamps, a
/// single device id, and non-finite values normalised to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSeries {
    device_id: String,
    readings: Vec<Reading>,
}

impl ReadingSeries {
    pub fn new(device_id: impl Into<String>, readings: Vec<Reading>) -> Self {
        let device_id = device_id.into();
        let total = readings.len();

        let mut readings: Vec<Reading> = readings
            .into_iter()
            .filter(|r| r.device_id == device_id)
            .map(|mut r| {
                r.temperature = r.temperature.filter(|v| v.is_finite());
                r.humidity = r.humidity.filter(|v| v.is_finite());
                r
            })
            .collect();

        if readings.len() != total {
            log::warn!(
                "dropped {} readings not belonging to device {}",
                total - readings.len(),
                device_id
            );
        }

        // Stable: equal timestamps keep store order
        readings.sort_by_key(|r| r.timestamp);

        Self { device_id, readings }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.readings.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.readings.last().map(|r| r.timestamp)
    }

    /// Present values of one quantity, in time order.
    pub fn values(&self, quantity: Quantity) -> Vec<f64> {
        self.readings.iter().filter_map(|r| r.value(quantity)).collect()
    }

    /// `(timestamp, value)` points for one quantity, missing rows skipped.
    pub fn points(&self, quantity: Quantity) -> Vec<(DateTime<Utc>, f64)> {
        self.readings
            .iter()
            .filter_map(|r| r.value(quantity).map(|v| (r.timestamp, v)))
            .collect()
    }

    /// Readings with both temperature and humidity present.
    pub fn complete(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter().filter(|r| r.pair().is_some())
    }

    pub fn complete_count(&self) -> usize {
        self.complete().count()
    }
}

// ---------------------------------------------------------------------------
// Query windows
// ---------------------------------------------------------------------------

/// Time window requested from the reading store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// From `now - hours` up to `now`.
    LastHours(u32),
    /// Inclusive absolute range.
    Range { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl TimeWindow {
    pub fn last_days(days: u32) -> Self {
        TimeWindow::LastHours(days.saturating_mul(24))
    }

    /// Resolves the window to absolute bounds relative to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            TimeWindow::LastHours(hours) => (now - Duration::hours(i64::from(hours)), now),
            TimeWindow::Range { start, end } => (start, end),
        }
    }

    pub fn contains(&self, now: DateTime<Utc>, timestamp: DateTime<Utc>) -> bool {
        let (start, end) = self.resolve(now);
        timestamp >= start && timestamp <= end
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
