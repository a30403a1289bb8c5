/// Analytics service: the boundary between callers and the engine.
///
/// Each method validates its parameters against the documented API bounds,
/// reads the device series for the right window from the `ReadingStore`,
/// and runs the matching report. Composite reports (`device_summary`,
/// `full_forecast`) fan their parts out on a worker pool and join over a
/// channel; each part is wrapped in a `Section` so one failing part does not
/// fail the whole summary.

use std::fmt::Display;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use threadpool::ThreadPool;

use crate::analysis::analytics::{
    self, AnomalyReport, ComfortReport, CorrelationReport, Direction, StatisticsReport, TrendReport,
};
use crate::analysis::forecast::{
    self, EnergyReport, ForecastReport, PatternReport, SeasonalForecaster,
};
use crate::analysis::indicators::{
    self, AmplitudeReport, CriticalTimeReport, FungusReport, HumidityRateReport,
};
use crate::analysis::metrics::{self, DeviceReport, FleetReport};
use crate::config::{ForecastSection, ServiceConfig};
use crate::error::AnalyticsError;
use crate::model::{Quantity, ReadingSeries, TimeWindow};
use crate::store::{ReadingStore, StoreError};
use crate::weather::{self, WeatherClient, WeatherComparison, WeatherError};

pub const DEFAULT_STATISTICS_HOURS: u32 = 24;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error("{0}")]
    NotFound(String),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServiceError {
    /// HTTP status the endpoint answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Analytics(e) if e.is_client_error() => 400,
            ServiceError::Analytics(AnalyticsError::CapabilityUnavailable(_)) => 503,
            ServiceError::NotFound(_) => 404,
            _ => 500,
        }
    }
}

fn check_range<T: PartialOrd + Display + Copy>(
    name: &'static str,
    value: T,
    min: T,
    max: T,
) -> Result<(), AnalyticsError> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(AnalyticsError::invalid(
            name,
            format!("{} is outside {}..={}", value, min, max),
        ))
    }
}

// ---------------------------------------------------------------------------
// Composite report types
// ---------------------------------------------------------------------------

/// Outcome of one part of a composite report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Ok { report: T },
    Failed { error: String },
}

impl<T> Section<T> {
    fn from_result(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(report) => Section::Ok { report },
            Err(e) => Section::Failed {
                error: e.to_string(),
            },
        }
    }

    fn missing() -> Self {
        Section::Failed {
            error: "worker did not report".to_string(),
        }
    }

    pub fn report(&self) -> Option<&T> {
        match self {
            Section::Ok { report } => Some(report),
            Section::Failed { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Section::Ok { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "estatisticas")]
    pub statistics: Section<StatisticsReport>,
    #[serde(rename = "tendencias")]
    pub trends: Section<TrendReport>,
    #[serde(rename = "correlacao")]
    pub correlation: Section<CorrelationReport>,
    #[serde(rename = "anomalias")]
    pub anomalies: Section<AnomalyReport>,
    #[serde(rename = "conforto")]
    pub comfort: Section<ComfortReport>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastOverview {
    #[serde(rename = "previsoes_disponiveis")]
    pub forecasts_available: bool,
    #[serde(rename = "padroes_identificados")]
    pub patterns_found: bool,
    #[serde(rename = "economia_estimada")]
    pub energy_estimated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullForecast {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "previsao_temperatura")]
    pub temperature: Section<ForecastReport>,
    #[serde(rename = "previsao_umidade")]
    pub humidity: Section<ForecastReport>,
    #[serde(rename = "padroes")]
    pub patterns: Section<PatternReport>,
    #[serde(rename = "analise_energetica")]
    pub energy: Section<EnergyReport>,
    #[serde(rename = "resumo")]
    pub overview: ForecastOverview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceList {
    pub total: usize,
    #[serde(rename = "dispositivos")]
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceWeatherComparison {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(flatten)]
    pub comparison: WeatherComparison,
}

enum SummaryPart {
    Statistics(Section<StatisticsReport>),
    Trends(Section<TrendReport>),
    Correlation(Section<CorrelationReport>),
    Anomalies(Section<AnomalyReport>),
    Comfort(Section<ComfortReport>),
}

enum ForecastPart {
    Temperature(Section<ForecastReport>),
    Humidity(Section<ForecastReport>),
    Patterns(Section<PatternReport>),
    Energy(Section<EnergyReport>),
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Forecaster selected by configuration; `None` when disabled or not built.
pub fn configured_forecaster(config: &ForecastSection) -> Option<Arc<dyn SeasonalForecaster>> {
    if !config.enabled {
        return None;
    }
    #[cfg(feature = "forecast")]
    {
        Some(Arc::new(crate::analysis::harmonic::HarmonicForecaster::new(
            config.daily_fourier_order,
            config.weekly_fourier_order,
            config.interval_width,
        )))
    }
    #[cfg(not(feature = "forecast"))]
    {
        log::warn!("forecasting enabled in config but the `forecast` feature is not built");
        None
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn ReadingStore>,
    forecaster: Option<Arc<dyn SeasonalForecaster>>,
    weather: Option<Arc<WeatherClient>>,
    config: Arc<ServiceConfig>,
    pool: Arc<Mutex<ThreadPool>>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn ReadingStore>, config: ServiceConfig) -> Self {
        let workers = config.service.worker_threads.max(1);
        Self {
            forecaster: configured_forecaster(&config.forecast),
            store,
            weather: None,
            config: Arc::new(config),
            pool: Arc::new(Mutex::new(ThreadPool::with_name(
                "analytics-worker".to_string(),
                workers,
            ))),
        }
    }

    pub fn with_forecaster(mut self, forecaster: Option<Arc<dyn SeasonalForecaster>>) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn with_weather(mut self, client: WeatherClient) -> Self {
        self.weather = Some(Arc::new(client));
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn forecasting_available(&self) -> bool {
        self.forecaster.is_some()
    }

    fn load(&self, device_id: &str, window: TimeWindow) -> Result<ReadingSeries, ServiceError> {
        let readings = self.store.series(device_id, &window)?;
        Ok(ReadingSeries::new(device_id, readings))
    }

    fn worker_pool(&self) -> ThreadPool {
        match self.pool.lock() {
            Ok(pool) => pool.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // --- General analytics --------------------------------------------------

    /// Statistics for an explicit range, or for the last 24 hours.
    pub fn statistics(
        &self,
        device_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<StatisticsReport, ServiceError> {
        let window = match (start, end) {
            (Some(start), Some(end)) if end >= start => TimeWindow::Range { start, end },
            (Some(_), Some(_)) => {
                return Err(AnalyticsError::invalid("end_date", "must not precede start_date").into());
            }
            (None, None) => TimeWindow::LastHours(DEFAULT_STATISTICS_HOURS),
            _ => {
                return Err(AnalyticsError::invalid(
                    "start_date",
                    "start_date and end_date must be given together",
                )
                .into());
            }
        };
        Ok(analytics::basic_statistics(&self.load(device_id, window)?)?)
    }

    pub fn anomalies(&self, device_id: &str, hours: u32, threshold: f64) -> Result<AnomalyReport, ServiceError> {
        check_range("hours", hours, 1, 168)?;
        check_range("threshold", threshold, 1.0, 5.0)?;
        let series = self.load(device_id, TimeWindow::LastHours(hours))?;
        Ok(analytics::detect_anomalies(&series, hours, threshold))
    }

    pub fn trends(&self, device_id: &str, days: u32) -> Result<TrendReport, ServiceError> {
        check_range("days", days, 1, 30)?;
        Ok(analytics::trends(&self.load(device_id, TimeWindow::last_days(days))?, days)?)
    }

    pub fn correlation(&self, device_id: &str, days: u32) -> Result<CorrelationReport, ServiceError> {
        check_range("days", days, 1, 30)?;
        Ok(analytics::correlation(&self.load(device_id, TimeWindow::last_days(days))?, days)?)
    }

    pub fn comfort(&self, device_id: &str, hours: u32) -> Result<ComfortReport, ServiceError> {
        check_range("hours", hours, 1, 168)?;
        Ok(analytics::comfort(&self.load(device_id, TimeWindow::LastHours(hours))?, hours)?)
    }

    // --- Indicators ---------------------------------------------------------

    pub fn thermal_amplitude(&self, device_id: &str, days: u32) -> Result<AmplitudeReport, ServiceError> {
        check_range("days", days, 1, 30)?;
        Ok(indicators::thermal_amplitude(&self.load(device_id, TimeWindow::last_days(days))?, days)?)
    }

    pub fn humidity_rate(&self, device_id: &str, days: u32) -> Result<HumidityRateReport, ServiceError> {
        check_range("days", days, 1, 30)?;
        Ok(indicators::humidity_rate(&self.load(device_id, TimeWindow::last_days(days))?, days)?)
    }

    pub fn fungus_risk(&self, device_id: &str, days: u32) -> Result<FungusReport, ServiceError> {
        check_range("days", days, 1, 30)?;
        Ok(indicators::fungus_risk(&self.load(device_id, TimeWindow::last_days(days))?, days)?)
    }

    pub fn critical_time(&self, device_id: &str, days: u32) -> Result<CriticalTimeReport, ServiceError> {
        check_range("days", days, 1, 30)?;
        Ok(indicators::critical_time(&self.load(device_id, TimeWindow::last_days(days))?, days)?)
    }

    // --- Forecasting --------------------------------------------------------

    pub fn forecast(
        &self,
        device_id: &str,
        quantity: Quantity,
        days_history: u32,
        days_forecast: u32,
    ) -> Result<ForecastReport, ServiceError> {
        check_range("days_history", days_history, 7, 90)?;
        check_range("days_forecast", days_forecast, 1, 30)?;
        let forecaster = self
            .forecaster
            .as_deref()
            .ok_or(AnalyticsError::CapabilityUnavailable("forecast"))?;
        let series = self.load(device_id, TimeWindow::last_days(days_history))?;
        Ok(forecast::forecast(&series, quantity, days_forecast, Some(forecaster))?)
    }

    pub fn patterns(&self, device_id: &str, days: u32) -> Result<PatternReport, ServiceError> {
        check_range("days", days, 7, 90)?;
        Ok(forecast::analyze_patterns(&self.load(device_id, TimeWindow::last_days(days))?, days)?)
    }

    pub fn energy(
        &self,
        device_id: &str,
        days: u32,
        target_temp: f64,
        cost_per_kwh: f64,
    ) -> Result<EnergyReport, ServiceError> {
        check_range("days", days, 7, 90)?;
        check_range("target_temp", target_temp, 15.0, 30.0)?;
        check_range("cost_per_kwh", cost_per_kwh, 0.1, 5.0)?;
        let series = self.load(device_id, TimeWindow::last_days(days))?;
        Ok(forecast::energy_analysis(&series, days, target_temp, cost_per_kwh)?)
    }

    /// Energy analysis with the configured tariff.
    pub fn default_energy(&self, device_id: &str, days: u32) -> Result<EnergyReport, ServiceError> {
        self.energy(
            device_id,
            days,
            self.config.energy.target_temp_c,
            self.config.energy.cost_per_kwh,
        )
    }

    // --- Metrics ------------------------------------------------------------

    pub fn global_metrics(&self) -> Result<FleetReport, ServiceError> {
        let mut latest = Vec::new();
        for device_id in self.store.device_ids()? {
            if let Some(reading) = self.store.latest(&device_id)? {
                latest.push(reading);
            }
        }
        Ok(metrics::global_metrics(&latest))
    }

    pub fn device_metrics(&self, device_id: &str, limit: usize) -> Result<DeviceReport, ServiceError> {
        check_range("limit", limit, 10, 1000)?;
        let recent = self.store.recent(device_id, limit)?;
        metrics::device_metrics(device_id, &recent)
            .ok_or_else(|| ServiceError::NotFound(format!("device {} has no readings", device_id)))
    }

    pub fn list_devices(&self) -> Result<DeviceList, ServiceError> {
        let devices = self.store.device_ids()?;
        Ok(DeviceList {
            total: devices.len(),
            devices,
        })
    }

    // --- Composite reports --------------------------------------------------

    /// Statistics, trends, correlation, anomalies and comfort computed in
    /// parallel, plus derived insights.
    pub fn device_summary(&self, device_id: &str, days: u32) -> Result<DeviceSummary, ServiceError> {
        check_range("days", days, 1, 30)?;
        let hours = days * 24;
        let pool = self.worker_pool();
        let (tx, rx) = mpsc::channel();

        let jobs: Vec<Box<dyn FnOnce(&AnalyticsService, &str) -> SummaryPart + Send>> = vec![
            Box::new(|s: &AnalyticsService, d: &str| SummaryPart::Statistics(Section::from_result(s.statistics(d, None, None)))),
            Box::new(move |s: &AnalyticsService, d: &str| SummaryPart::Trends(Section::from_result(s.trends(d, days)))),
            Box::new(move |s: &AnalyticsService, d: &str| SummaryPart::Correlation(Section::from_result(s.correlation(d, days)))),
            Box::new(move |s: &AnalyticsService, d: &str| {
                SummaryPart::Anomalies(Section::from_result(
                    s.anomalies_unbounded(d, hours, analytics::DEFAULT_ANOMALY_THRESHOLD),
                ))
            }),
            Box::new(move |s: &AnalyticsService, d: &str| SummaryPart::Comfort(Section::from_result(s.comfort_unbounded(d, hours)))),
        ];
        let expected = jobs.len();

        for job in jobs {
            let tx = tx.clone();
            let service = self.clone();
            let device = device_id.to_string();
            pool.execute(move || {
                let _ = tx.send(job(&service, &device));
            });
        }
        drop(tx);

        let mut summary = DeviceSummary {
            device_id: device_id.to_string(),
            days,
            statistics: Section::missing(),
            trends: Section::missing(),
            correlation: Section::missing(),
            anomalies: Section::missing(),
            comfort: Section::missing(),
            insights: Vec::new(),
        };
        for part in rx.iter().take(expected) {
            match part {
                SummaryPart::Statistics(s) => summary.statistics = s,
                SummaryPart::Trends(s) => summary.trends = s,
                SummaryPart::Correlation(s) => summary.correlation = s,
                SummaryPart::Anomalies(s) => summary.anomalies = s,
                SummaryPart::Comfort(s) => summary.comfort = s,
            }
        }
        summary.insights = summary_insights(summary.trends.report(), summary.anomalies.report());

        log::info!(
            "device summary for {} over {} days: {} insights",
            device_id,
            days,
            summary.insights.len()
        );
        Ok(summary)
    }

    // Summary windows (days * 24 h) can exceed the single-report hour bound.
    fn anomalies_unbounded(&self, device_id: &str, hours: u32, threshold: f64) -> Result<AnomalyReport, ServiceError> {
        let series = self.load(device_id, TimeWindow::LastHours(hours))?;
        Ok(analytics::detect_anomalies(&series, hours, threshold))
    }

    fn comfort_unbounded(&self, device_id: &str, hours: u32) -> Result<ComfortReport, ServiceError> {
        Ok(analytics::comfort(&self.load(device_id, TimeWindow::LastHours(hours))?, hours)?)
    }

    /// Temperature and humidity forecasts, patterns and energy in parallel.
    pub fn full_forecast(
        &self,
        device_id: &str,
        days_history: u32,
        days_forecast: u32,
    ) -> Result<FullForecast, ServiceError> {
        check_range("days_history", days_history, 7, 90)?;
        check_range("days_forecast", days_forecast, 1, 14)?;
        let pool = self.worker_pool();
        let (tx, rx) = mpsc::channel();

        let jobs: Vec<Box<dyn FnOnce(&AnalyticsService, &str) -> ForecastPart + Send>> = vec![
            Box::new(move |s: &AnalyticsService, d: &str| {
                ForecastPart::Temperature(Section::from_result(s.forecast(
                    d,
                    Quantity::Temperature,
                    days_history,
                    days_forecast,
                )))
            }),
            Box::new(move |s: &AnalyticsService, d: &str| {
                ForecastPart::Humidity(Section::from_result(s.forecast(
                    d,
                    Quantity::Humidity,
                    days_history,
                    days_forecast,
                )))
            }),
            Box::new(move |s: &AnalyticsService, d: &str| ForecastPart::Patterns(Section::from_result(s.patterns(d, days_history)))),
            Box::new(move |s: &AnalyticsService, d: &str| ForecastPart::Energy(Section::from_result(s.default_energy(d, days_history)))),
        ];
        let expected = jobs.len();

        for job in jobs {
            let tx = tx.clone();
            let service = self.clone();
            let device = device_id.to_string();
            pool.execute(move || {
                let _ = tx.send(job(&service, &device));
            });
        }
        drop(tx);

        let (mut temperature, mut humidity, mut patterns, mut energy) =
            (Section::missing(), Section::missing(), Section::missing(), Section::missing());
        for part in rx.iter().take(expected) {
            match part {
                ForecastPart::Temperature(s) => temperature = s,
                ForecastPart::Humidity(s) => humidity = s,
                ForecastPart::Patterns(s) => patterns = s,
                ForecastPart::Energy(s) => energy = s,
            }
        }

        let overview = ForecastOverview {
            forecasts_available: temperature.is_ok(),
            patterns_found: patterns.is_ok(),
            energy_estimated: energy.is_ok(),
        };
        Ok(FullForecast {
            device_id: device_id.to_string(),
            temperature,
            humidity,
            patterns,
            energy,
            overview,
        })
    }

    // --- External weather ---------------------------------------------------

    fn weather_client(&self) -> Result<&WeatherClient, ServiceError> {
        self.weather
            .as_deref()
            .ok_or_else(|| AnalyticsError::CapabilityUnavailable("weather").into())
    }

    pub fn compare_with_weather(
        &self,
        device_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<DeviceWeatherComparison, ServiceError> {
        check_range("latitude", latitude, -90.0, 90.0)?;
        check_range("longitude", longitude, -180.0, 180.0)?;
        let client = self.weather_client()?;

        let latest = self
            .store
            .latest(device_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("device {} has no readings", device_id)))?;
        let current = client.fetch_current(latitude, longitude)?;

        Ok(DeviceWeatherComparison {
            device_id: device_id.to_string(),
            comparison: weather::compare(latest.temperature, latest.humidity, &current),
        })
    }

    pub fn weather_forecast(&self, latitude: f64, longitude: f64, days: u32) -> Result<serde_json::Value, ServiceError> {
        check_range("latitude", latitude, -90.0, 90.0)?;
        check_range("longitude", longitude, -180.0, 180.0)?;
        check_range("days", days, 1, 16)?;
        Ok(self.weather_client()?.fetch_forecast(latitude, longitude, days)?)
    }
}

/// Human-readable highlights of a device summary.
pub fn summary_insights(trends: Option<&TrendReport>, anomalies: Option<&AnomalyReport>) -> Vec<String> {
    let mut insights = Vec::new();
    if let Some(t) = trends {
        if t.temperature.direction != Direction::Stable {
            insights.push(format!(
                "Temperatura {} ({:.2}°C/dia)",
                t.temperature.direction.label(),
                t.temperature.change_per_day
            ));
        }
        if t.humidity.direction != Direction::Stable {
            insights.push(format!(
                "Umidade {} ({:.2}%/dia)",
                t.humidity.direction.label(),
                t.humidity.change_per_day
            ));
        }
    }
    if let Some(a) = anomalies.filter(|a| a.count > 0) {
        insights.push(format!("{} anomalias detectadas", a.count));
    }
    insights
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
