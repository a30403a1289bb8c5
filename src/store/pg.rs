/// PostgreSQL-backed reading store.
///
/// Expects a table shaped like sql/001_sensor_readings.sql:
/// `(device_id TEXT, reading_time TIMESTAMPTZ, temperature NUMERIC NULL,
/// humidity NUMERIC NULL)`. NUMERIC columns are read through
/// `rust_decimal::Decimal` and converted to `f64`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use postgres::{Client, Row};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::model::{Reading, TimeWindow};
use crate::store::{ReadingStore, StoreError};

pub struct PgReadingStore {
    client: Mutex<Client>,
    table: String,
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_.]` passes.
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let ok = !table.is_empty()
        && table.split('.').count() <= 2
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !table.starts_with('.')
        && !table.ends_with('.');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(table.to_string()))
    }
}

fn decimal_to_f64(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64())
}

fn f64_to_decimal(field: &'static str, value: Option<f64>) -> Result<Option<Decimal>, StoreError> {
    value
        .map(|v| Decimal::try_from(v).map_err(|_| StoreError::Unrepresentable { field, value: v }))
        .transpose()
}

fn row_to_reading(row: &Row) -> Reading {
    Reading {
        device_id: row.get(0),
        timestamp: row.get::<_, DateTime<Utc>>(1),
        temperature: decimal_to_f64(row.get(2)),
        humidity: decimal_to_f64(row.get(3)),
    }
}

impl PgReadingStore {
    /// Wraps an already validated connection (see `db::connect_and_verify`).
    pub fn new(client: Client, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            client: Mutex::new(client),
            table: table.to_string(),
        })
    }

    /// Inserts readings in one transaction.
    pub fn insert(&self, readings: &[Reading]) -> Result<u64, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut tx = client.transaction()?;
        let sql = format!(
            "INSERT INTO {} (device_id, reading_time, temperature, humidity)
             VALUES ($1, $2, $3, $4)",
            self.table
        );
        let mut inserted = 0;
        for r in readings {
            let temperature = f64_to_decimal("temperature", r.temperature)?;
            let humidity = f64_to_decimal("humidity", r.humidity)?;
            inserted += tx.execute(&sql, &[&r.device_id, &r.timestamp, &temperature, &humidity])?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Deletes every reading of a device; used to clean up test data.
    pub fn delete_device(&self, device_id: &str) -> Result<u64, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::LockPoisoned)?;
        let sql = format!("DELETE FROM {} WHERE device_id = $1", self.table);
        Ok(client.execute(&sql, &[&device_id])?)
    }
}

impl ReadingStore for PgReadingStore {
    fn series(&self, device_id: &str, window: &TimeWindow) -> Result<Vec<Reading>, StoreError> {
        let (start, end) = window.resolve(Utc::now());
        let mut client = self.client.lock().map_err(|_| StoreError::LockPoisoned)?;
        let sql = format!(
            "SELECT device_id, reading_time, temperature, humidity
             FROM {}
             WHERE device_id = $1 AND reading_time >= $2 AND reading_time <= $3
             ORDER BY reading_time ASC",
            self.table
        );
        let rows = client.query(&sql, &[&device_id, &start, &end])?;
        log::debug!("{} readings for {} in [{}, {}]", rows.len(), device_id, start, end);
        Ok(rows.iter().map(row_to_reading).collect())
    }

    fn recent(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::LockPoisoned)?;
        let sql = format!(
            "SELECT device_id, reading_time, temperature, humidity
             FROM {}
             WHERE device_id = $1
             ORDER BY reading_time DESC
             LIMIT $2",
            self.table
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = client.query(&sql, &[&device_id, &limit])?;
        Ok(rows.iter().map(row_to_reading).collect())
    }

    fn device_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::LockPoisoned)?;
        let sql = format!("SELECT DISTINCT device_id FROM {} ORDER BY device_id", self.table);
        let rows = client.query(&sql, &[])?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("sensors.readings").is_ok());
        assert!(validate_table_name("readings").is_ok());
        assert!(validate_table_name("readings; DROP TABLE x").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name(".readings").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn test_decimal_conversion() {
        assert_eq!(decimal_to_f64(Decimal::from_f64(23.45)), Some(23.45));
        assert_eq!(decimal_to_f64(None), None);
        assert!(matches!(
            f64_to_decimal("temperature", Some(f64::NAN)),
            Err(StoreError::Unrepresentable { field: "temperature", .. })
        ));
        assert_eq!(f64_to_decimal("humidity", None).unwrap(), None);
    }
}
