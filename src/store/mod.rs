/// Reading store: where raw sensor readings come from.
///
/// The engine only needs three queries: a device's readings inside a time
/// window, its most recent readings, and the set of known devices.
/// `MemoryStore` backs tests and the demo tool; `PgReadingStore` backs the
/// service.

pub mod pg;

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Reading, TimeWindow};

pub use self::pg::PgReadingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Database(#[from] postgres::Error),

    #[error("reading store lock poisoned")]
    LockPoisoned,

    #[error("invalid table name `{0}`")]
    InvalidTableName(String),

    #[error("value {value} for {field} cannot be stored")]
    Unrepresentable { field: &'static str, value: f64 },
}

pub trait ReadingStore: Send + Sync {
    /// Readings of one device inside the window, oldest first.
    fn series(&self, device_id: &str, window: &TimeWindow) -> Result<Vec<Reading>, StoreError>;

    /// Up to `limit` most recent readings, newest first.
    fn recent(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError>;

    /// Distinct device ids, sorted.
    fn device_ids(&self) -> Result<Vec<String>, StoreError>;

    fn latest(&self, device_id: &str) -> Result<Option<Reading>, StoreError> {
        Ok(self.recent(device_id, 1)?.into_iter().next())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Readings held in process, keyed by device.
///
/// `LastHours` windows resolve against the injected clock so tests can pin
/// "now".
pub struct MemoryStore {
    readings: RwLock<BTreeMap<String, Vec<Reading>>>,
    clock: Clock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(BTreeMap::new()),
            clock: Box::new(Utc::now),
        }
    }

    /// A store whose clock is frozen at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            readings: RwLock::new(BTreeMap::new()),
            clock: Box::new(move || now),
        }
    }

    pub fn insert(&self, reading: Reading) -> Result<(), StoreError> {
        self.extend(std::iter::once(reading))
    }

    pub fn extend(&self, readings: impl IntoIterator<Item = Reading>) -> Result<(), StoreError> {
        let mut map = self.readings.write().map_err(|_| StoreError::LockPoisoned)?;
        for reading in readings {
            let entry = map.entry(reading.device_id.clone()).or_default();
            let pos = entry.partition_point(|r| r.timestamp <= reading.timestamp);
            entry.insert(pos, reading);
        }
        Ok(())
    }
}

impl ReadingStore for MemoryStore {
    fn series(&self, device_id: &str, window: &TimeWindow) -> Result<Vec<Reading>, StoreError> {
        let now = (self.clock)();
        let map = self.readings.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map
            .get(device_id)
            .map(|rs| {
                rs.iter()
                    .filter(|r| window.contains(now, r.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn recent(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let map = self.readings.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map
            .get(device_id)
            .map(|rs| rs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn device_ids(&self) -> Result<Vec<String>, StoreError> {
        let map = self.readings.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::base_time;
    use chrono::Duration;

    fn store_with_day() -> MemoryStore {
        let store = MemoryStore::at(base_time() + Duration::hours(24));
        store
            .extend((0..24).rev().map(|h| {
                Reading::new("silo-a", base_time() + Duration::hours(h), 20.0 + h as f64, 50.0)
            }))
            .unwrap();
        store
            .insert(Reading::new("silo-b", base_time(), 30.0, 70.0))
            .unwrap();
        store
    }

    #[test]
    fn test_series_is_ascending_and_windowed() {
        let store = store_with_day();
        let rs = store.series("silo-a", &TimeWindow::LastHours(6)).unwrap();

        assert_eq!(rs.len(), 6);
        assert!(rs.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(rs[0].timestamp, base_time() + Duration::hours(18));
    }

    #[test]
    fn test_recent_is_newest_first() {
        let store = store_with_day();
        let rs = store.recent("silo-a", 3).unwrap();
        assert_eq!(rs.len(), 3);
        assert_eq!(rs[0].temperature, Some(43.0));
        assert_eq!(store.latest("silo-a").unwrap().map(|r| r.temperature), Some(Some(43.0)));
    }

    #[test]
    fn test_unknown_device_is_empty() {
        let store = store_with_day();
        assert!(store.series("nope", &TimeWindow::LastHours(24)).unwrap().is_empty());
        assert!(store.latest("nope").unwrap().is_none());
    }

    #[test]
    fn test_device_ids_sorted() {
        assert_eq!(store_with_day().device_ids().unwrap(), vec!["silo-a", "silo-b"]);
    }
}
