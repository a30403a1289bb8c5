/// Temporal patterns, seasonal forecasts and energy-cost estimation.
///
/// Forecasting itself is delegated to a `SeasonalForecaster`. The engine
/// only selects the points, fixes the model settings and the horizon, and
/// shapes the result; a missing forecaster surfaces as
/// `CapabilityUnavailable`.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;

use crate::analysis::stats::{self, round_to};
use crate::error::{require, AnalyticsError};
use crate::model::{Quantity, ReadingSeries};

pub const PATTERN_MIN_READINGS: usize = 100;
pub const FORECAST_MIN_READINGS: usize = 100;
pub const ENERGY_MIN_READINGS: usize = 100;

pub const DEFAULT_TARGET_TEMP_C: f64 = 22.0;
pub const DEFAULT_COST_PER_KWH: f64 = 0.85;
const KWH_PER_DEGREE_HOUR: f64 = 0.1;
const CRITICAL_DELTA_C: f64 = 5.0;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyEntry {
    #[serde(rename = "hora")]
    pub hour: u32,
    #[serde(rename = "media")]
    pub mean: Option<f64>,
    #[serde(rename = "desvio")]
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayEntry {
    /// 0 = Monday.
    #[serde(rename = "dia_semana")]
    pub weekday: u32,
    #[serde(rename = "media")]
    pub mean: Option<f64>,
    #[serde(rename = "desvio")]
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityPattern {
    #[serde(rename = "hora_maxima")]
    pub peak_hour: u32,
    #[serde(rename = "hora_minima")]
    pub trough_hour: u32,
    /// Always 24 entries, hours without data have `None` fields.
    #[serde(rename = "por_hora")]
    pub hourly: Vec<HourlyEntry>,
    /// Always 7 entries.
    #[serde(rename = "por_dia_semana")]
    pub weekly: Vec<WeekdayEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityPatterns {
    #[serde(rename = "temperatura")]
    pub temperature: QuantityPattern,
    #[serde(rename = "umidade")]
    pub humidity: QuantityPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "padroes_horarios")]
    pub patterns: QuantityPatterns,
    pub insights: Vec<String>,
}

/// Hour-of-day and day-of-week profiles over complete rows.
pub fn analyze_patterns(series: &ReadingSeries, days: u32) -> Result<PatternReport, AnalyticsError> {
    let rows: Vec<(DateTime<Utc>, f64, f64)> = series
        .complete()
        .filter_map(|r| r.pair().map(|(t, h)| (r.timestamp, t, h)))
        .collect();
    require("patterns", PATTERN_MIN_READINGS, rows.len())?;

    let temperature = quantity_pattern(rows.iter().map(|&(ts, t, _)| (ts, t)))?;
    let humidity = quantity_pattern(rows.iter().map(|&(ts, _, h)| (ts, h)))?;

    let insights = vec![
        format!("Temperatura mais alta às {}h", temperature.peak_hour),
        format!("Temperatura mais baixa às {}h", temperature.trough_hour),
        format!("Umidade mais alta às {}h", humidity.peak_hour),
        format!("Umidade mais baixa às {}h", humidity.trough_hour),
    ];

    Ok(PatternReport {
        device_id: series.device_id().to_string(),
        days,
        patterns: QuantityPatterns {
            temperature,
            humidity,
        },
        insights,
    })
}

fn quantity_pattern(
    points: impl Iterator<Item = (DateTime<Utc>, f64)>,
) -> Result<QuantityPattern, AnalyticsError> {
    let mut by_hour: Vec<Vec<f64>> = vec![Vec::new(); 24];
    let mut by_weekday: Vec<Vec<f64>> = vec![Vec::new(); 7];
    for (ts, v) in points {
        by_hour[ts.hour() as usize].push(v);
        by_weekday[ts.weekday().num_days_from_monday() as usize].push(v);
    }

    let hour_means: Vec<(u32, f64)> = by_hour
        .iter()
        .enumerate()
        .filter_map(|(h, vals)| stats::mean(vals).map(|m| (h as u32, m)))
        .collect();

    // First hour wins on ties
    let mut peak = *hour_means
        .first()
        .ok_or_else(|| AnalyticsError::insufficient("patterns", 1, 0))?;
    let mut trough = peak;
    for &(h, m) in &hour_means[1..] {
        if m > peak.1 {
            peak = (h, m);
        }
        if m < trough.1 {
            trough = (h, m);
        }
    }

    let summarise = |vals: &[f64]| {
        (
            stats::mean(vals).map(|m| round_to(m, 2)),
            stats::sample_std_dev(vals).map(|s| round_to(s, 2)),
        )
    };

    Ok(QuantityPattern {
        peak_hour: peak.0,
        trough_hour: trough.0,
        hourly: by_hour
            .iter()
            .enumerate()
            .map(|(h, vals)| {
                let (mean, std_dev) = summarise(vals);
                HourlyEntry {
                    hour: h as u32,
                    mean,
                    std_dev,
                }
            })
            .collect(),
        weekly: by_weekday
            .iter()
            .enumerate()
            .map(|(d, vals)| {
                let (mean, std_dev) = summarise(vals);
                WeekdayEntry {
                    weekday: d as u32,
                    mean,
                    std_dev,
                }
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Forecasting capability
// ---------------------------------------------------------------------------

/// Model configuration handed to the forecaster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSettings {
    pub daily_seasonality: bool,
    pub weekly_seasonality: bool,
    pub yearly_seasonality: bool,
    pub changepoint_prior_scale: f64,
}

impl ForecastSettings {
    /// Settings used for every sensor forecast.
    pub const SENSOR: ForecastSettings = ForecastSettings {
        daily_seasonality: true,
        weekly_seasonality: true,
        yearly_seasonality: false,
        changepoint_prior_scale: 0.05,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "previsto")]
    pub value: f64,
    #[serde(rename = "limite_inferior")]
    pub lower: f64,
    #[serde(rename = "limite_superior")]
    pub upper: f64,
}

/// Additive seasonal curve fitting and extrapolation.
///
/// Implementations return exactly `horizon_steps` points at
/// `last + k * step` for `k = 1..=horizon_steps`.
pub trait SeasonalForecaster: Send + Sync {
    fn fit_and_predict(
        &self,
        points: &[(DateTime<Utc>, f64)],
        settings: &ForecastSettings,
        horizon_steps: usize,
        step: Duration,
    ) -> Result<Vec<ForecastPoint>, AnalyticsError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    #[serde(rename = "componentes")]
    pub components: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "tipo")]
    pub quantity: Quantity,
    #[serde(rename = "dias_previstos")]
    pub days_forecast: u32,
    #[serde(rename = "previsoes")]
    pub points: Vec<ForecastPoint>,
    #[serde(rename = "metricas_modelo")]
    pub model: ModelInfo,
}

/// Hourly forecast of one quantity for `days_forecast * 24` steps.
pub fn forecast(
    series: &ReadingSeries,
    quantity: Quantity,
    days_forecast: u32,
    forecaster: Option<&dyn SeasonalForecaster>,
) -> Result<ForecastReport, AnalyticsError> {
    let forecaster = forecaster.ok_or(AnalyticsError::CapabilityUnavailable("forecast"))?;

    let points = series.points(quantity);
    require("forecast", FORECAST_MIN_READINGS, points.len())?;

    let settings = ForecastSettings::SENSOR;
    let horizon = days_forecast as usize * 24;
    let predicted = forecaster.fit_and_predict(&points, &settings, horizon, Duration::hours(1))?;

    log::debug!(
        "forecast {} for {}: {} points from {} observations",
        quantity.label(),
        series.device_id(),
        predicted.len(),
        points.len()
    );

    let points = predicted
        .into_iter()
        .map(|p| ForecastPoint {
            timestamp: p.timestamp,
            value: round_to(p.value, 2),
            lower: round_to(p.lower, 2),
            upper: round_to(p.upper, 2),
        })
        .collect();

    Ok(ForecastReport {
        device_id: series.device_id().to_string(),
        quantity,
        days_forecast,
        points,
        model: ModelInfo {
            components: model_components(&settings),
        },
    })
}

fn model_components(settings: &ForecastSettings) -> Vec<&'static str> {
    let mut components = vec!["tendência"];
    if settings.daily_seasonality {
        components.push("sazonalidade_diária");
    }
    if settings.weekly_seasonality {
        components.push("sazonalidade_semanal");
    }
    if settings.yearly_seasonality {
        components.push("sazonalidade_anual");
    }
    components
}

// ---------------------------------------------------------------------------
// Energy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyBreakdown {
    #[serde(rename = "consumo_total_estimado_kwh")]
    pub total_kwh: f64,
    #[serde(rename = "custo_total_estimado_brl")]
    pub total_cost: f64,
    #[serde(rename = "custo_medio_diario_brl")]
    pub daily_cost: f64,
    #[serde(rename = "horas_periodo_critico")]
    pub critical_count: usize,
    #[serde(rename = "percentual_critico")]
    pub critical_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "temperatura_alvo")]
    pub target_temp: f64,
    #[serde(rename = "analise_energetica")]
    pub energy: EnergyBreakdown,
    #[serde(rename = "recomendacoes")]
    pub recommendations: Vec<String>,
}

/// Climate-control cost estimate: 0.1 kWh per degree of deviation per reading.
pub fn energy_analysis(
    series: &ReadingSeries,
    days: u32,
    target_temp: f64,
    cost_per_kwh: f64,
) -> Result<EnergyReport, AnalyticsError> {
    let temperatures = series.values(Quantity::Temperature);
    require("energy", ENERGY_MIN_READINGS, temperatures.len())?;

    let deltas: Vec<f64> = temperatures.iter().map(|t| (t - target_temp).abs()).collect();
    let total_kwh: f64 = deltas.iter().map(|d| d * KWH_PER_DEGREE_HOUR).sum();
    let total_cost: f64 = deltas
        .iter()
        .map(|d| d * KWH_PER_DEGREE_HOUR * cost_per_kwh)
        .sum();
    let critical_count = deltas.iter().filter(|&&d| d > CRITICAL_DELTA_C).count();
    let critical_ratio = critical_count as f64 / deltas.len() as f64;

    Ok(EnergyReport {
        device_id: series.device_id().to_string(),
        days,
        target_temp,
        energy: EnergyBreakdown {
            total_kwh: round_to(total_kwh, 2),
            total_cost: round_to(total_cost, 2),
            daily_cost: round_to(total_cost / f64::from(days.max(1)), 2),
            critical_count,
            critical_percent: round_to(critical_ratio * 100.0, 2),
        },
        recommendations: energy_recommendations(
            stats::mean(&deltas).unwrap_or(0.0),
            critical_ratio,
        ),
    })
}

fn energy_recommendations(mean_delta: f64, critical_ratio: f64) -> Vec<String> {
    let mut out = Vec::new();
    if mean_delta > 5.0 {
        out.push("Alta diferença média de temperatura. Considere melhorar isolamento térmico.");
    }
    if critical_ratio > 0.3 {
        out.push("Mais de 30% do tempo em período crítico. Avalie sistema de climatização.");
    }
    if mean_delta < 2.0 {
        out.push("Temperatura mantida próxima ao alvo. Ótimo controle térmico!");
    }
    out.push("Use cortinas/persianas para reduzir ganho térmico solar.");
    out.into_iter().map(String::from).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;

    /// Repeats the last value with a ±1 band.
    struct NaiveForecaster;

    impl SeasonalForecaster for NaiveForecaster {
        fn fit_and_predict(
            &self,
            points: &[(DateTime<Utc>, f64)],
            _settings: &ForecastSettings,
            horizon_steps: usize,
            step: Duration,
        ) -> Result<Vec<ForecastPoint>, AnalyticsError> {
            let &(last_ts, last) = points
                .last()
                .ok_or_else(|| AnalyticsError::computation("naive", "no points"))?;
            Ok((1..=horizon_steps)
                .map(|k| ForecastPoint {
                    timestamp: last_ts + step * k as i32,
                    value: last + 0.004,
                    lower: last - 1.0,
                    upper: last + 1.0,
                })
                .collect())
        }
    }

    // --- Patterns -----------------------------------------------------------

    #[test]
    fn test_patterns_find_diurnal_peak() {
        let report = analyze_patterns(&diurnal_series(7), 7).expect("168 readings");
        let temp = &report.patterns.temperature;

        assert_eq!(temp.peak_hour, 14);
        assert_eq!(temp.trough_hour, 2);
        assert_eq!(report.patterns.humidity.peak_hour, 2);
        assert_eq!(temp.hourly.len(), 24);
        assert_eq!(temp.weekly.len(), 7);
        assert_eq!(report.insights[0], "Temperatura mais alta às 14h");
    }

    #[test]
    fn test_patterns_report_missing_hours_as_none() {
        // Readings only at even hours
        let series = spaced_series(120, Duration::hours(2), |i| (20.0 + (i % 12) as f64, 50.0 + (i % 3) as f64));
        let report = analyze_patterns(&series, 10).expect("120 readings");
        let hourly = &report.patterns.temperature.hourly;

        assert_eq!(hourly.len(), 24);
        assert!(hourly[1].mean.is_none());
        assert!(hourly[1].std_dev.is_none());
        assert!(hourly[2].mean.is_some());
    }

    #[test]
    fn test_patterns_drop_incomplete_rows_before_threshold() {
        let mut points: Vec<(i64, Option<f64>, Option<f64>)> =
            (0..100).map(|h| (h, Some(20.0), Some(50.0))).collect();
        points[10].2 = None;
        let err = analyze_patterns(&series_at_hours(&points), 7).unwrap_err();
        assert_eq!(err, AnalyticsError::insufficient("patterns", 100, 99));
    }

    // --- Forecast -----------------------------------------------------------

    #[test]
    fn test_forecast_without_capability_is_unavailable() {
        let err = forecast(&diurnal_series(7), Quantity::Temperature, 1, None).unwrap_err();
        assert_eq!(err, AnalyticsError::CapabilityUnavailable("forecast"));
    }

    #[test]
    fn test_forecast_horizon_and_rounding() {
        let series = constant_series(120, 21.0, 55.0);
        let report = forecast(&series, Quantity::Humidity, 2, Some(&NaiveForecaster)).expect("forecast");

        assert_eq!(report.points.len(), 48);
        assert_eq!(report.points[0].value, 55.0);
        assert_eq!(report.points[0].timestamp, series.last_timestamp().unwrap() + Duration::hours(1));
        assert_eq!(report.quantity, Quantity::Humidity);
        assert_eq!(
            report.model.components,
            vec!["tendência", "sazonalidade_diária", "sazonalidade_semanal"]
        );
    }

    #[test]
    fn test_forecast_requires_100_points() {
        let series = constant_series(99, 21.0, 55.0);
        assert!(matches!(
            forecast(&series, Quantity::Temperature, 1, Some(&NaiveForecaster)),
            Err(AnalyticsError::InsufficientData { required: 100, available: 99, .. })
        ));
    }

    // --- Energy -------------------------------------------------------------

    #[test]
    fn test_energy_totals() {
        // delta 8 per reading -> 0.8 kWh each
        let series = constant_series(100, 30.0, 50.0);
        let report = energy_analysis(&series, 5, 22.0, 1.0).expect("energy");

        assert_eq!(report.energy.total_kwh, 80.0);
        assert_eq!(report.energy.total_cost, 80.0);
        assert_eq!(report.energy.daily_cost, 16.0);
        assert_eq!(report.energy.critical_count, 100);
        assert_eq!(report.energy.critical_percent, 100.0);
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(
            report.recommendations.last().map(String::as_str),
            Some("Use cortinas/persianas para reduzir ganho térmico solar.")
        );
    }

    #[test]
    fn test_energy_near_target_praised() {
        let report = energy_analysis(&constant_series(100, 22.5, 50.0), 7, 22.0, 0.85).expect("energy");
        assert!(report.recommendations[0].starts_with("Temperatura mantida"));
        assert_eq!(report.recommendations.len(), 2);
    }

}
