/// Integration tests for the PostgreSQL reading store
///
/// Prerequisites:
/// - PostgreSQL running with sql/001_sensor_readings.sql applied
/// - DATABASE_URL set in .env
///
/// Run with: cargo test --test pg_store -- --ignored --test-threads=1

use std::sync::Arc;

use chrono::{Duration, Utc};

use silowatch_analytics::config::ServiceConfig;
use silowatch_analytics::db::{self, DbConfigError};
use silowatch_analytics::model::{Reading, TimeWindow};
use silowatch_analytics::service::AnalyticsService;
use silowatch_analytics::store::{PgReadingStore, ReadingStore};

const TABLE: &str = "sensors.readings";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn setup_store() -> PgReadingStore {
    let client = db::connect_and_verify(TABLE).expect("DATABASE_URL must point at a prepared database");
    PgReadingStore::new(client, TABLE).expect("valid table name")
}

/// Hourly readings for the last `hours` hours, oldest first.
fn seed(store: &PgReadingStore, device_id: &str, hours: i64) -> Vec<Reading> {
    store.delete_device(device_id).expect("cleanup");
    let now = Utc::now();
    let readings: Vec<Reading> = (0..hours)
        .map(|i| {
            let mut r = Reading::new(
                device_id,
                now - Duration::hours(hours - i),
                22.0 + (i % 5) as f64,
                60.0 + (i % 3) as f64,
            );
            if i == 3 {
                r.humidity = None;
            }
            r
        })
        .collect();
    store.insert(&readings).expect("insert test readings");
    readings
}

// ---------------------------------------------------------------------------
// Schema validation
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_connect_and_verify_finds_readings_table() {
    assert!(db::connect_and_verify(TABLE).is_ok());
}

#[test]
#[ignore]
fn test_missing_table_is_reported() {
    let result = db::connect_and_verify("sensors.does_not_exist");
    assert!(matches!(result, Err(DbConfigError::MissingTable(_))));
}

// ---------------------------------------------------------------------------
// Store queries
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_series_window_and_nulls() {
    let store = setup_store();
    seed(&store, "TEST-pg-series", 48);

    let day = store.series("TEST-pg-series", &TimeWindow::LastHours(24)).unwrap();
    assert_eq!(day.len(), 24);
    assert!(day.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    let all = store.series("TEST-pg-series", &TimeWindow::last_days(3)).unwrap();
    assert_eq!(all.len(), 48);
    assert_eq!(all[3].humidity, None);
    assert_eq!(all[3].temperature, Some(25.0));

    store.delete_device("TEST-pg-series").unwrap();
}

#[test]
#[ignore]
fn test_recent_is_newest_first() {
    let store = setup_store();
    let seeded = seed(&store, "TEST-pg-recent", 12);

    let recent = store.recent("TEST-pg-recent", 5).unwrap();
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].timestamp.timestamp(), seeded[11].timestamp.timestamp());
    assert!(store.device_ids().unwrap().contains(&"TEST-pg-recent".to_string()));

    store.delete_device("TEST-pg-recent").unwrap();
}

#[test]
#[ignore]
fn test_service_over_postgres() {
    let store = setup_store();
    seed(&store, "TEST-pg-service", 48);

    let service = AnalyticsService::new(Arc::new(setup_store()), ServiceConfig::default());
    let trends = service.trends("TEST-pg-service", 2).unwrap();
    assert_eq!(trends.device_id, "TEST-pg-service");

    let metrics = service.device_metrics("TEST-pg-service", 100).unwrap();
    assert_eq!(metrics.reading_count, 48);

    store.delete_device("TEST-pg-service").unwrap();
}
