/// Storage-quality indicators for grain silos.
///
/// - thermal amplitude: daily max - min temperature and a stability band
/// - humidity rate: ΔU/Δt between consecutive readings, filtered for
///   near-zero intervals and implausible jumps
/// - fungus risk index (IRF): 0-100 score from temperature above 30 °C and
///   humidity above 75 %
/// - critical time: readings above 35 °C and their contiguous runs

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::analysis::analytics::Direction;
use crate::analysis::stats::{self, round_to};
use crate::error::{require, AnalyticsError};
use crate::model::{Quantity, ReadingSeries};

pub const AMPLITUDE_MIN_READINGS: usize = 24;
pub const HUMIDITY_RATE_MIN_READINGS: usize = 10;

/// Five minutes, in hours.
pub const MIN_RATE_INTERVAL_HOURS: f64 = 0.083;
/// Humidity cannot plausibly move faster than this, in %/h.
pub const MAX_PLAUSIBLE_RATE: f64 = 50.0;

pub const CRITICAL_TEMPERATURE_C: f64 = 35.0;
const MAX_REPORTED_RUNS: usize = 5;

// ---------------------------------------------------------------------------
// Thermal amplitude
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stability {
    #[serde(rename = "baixa")]
    Low,
    #[serde(rename = "moderada")]
    Moderate,
    #[serde(rename = "alta")]
    High,
}

impl Stability {
    fn from_mean_amplitude(mean: f64) -> (Self, &'static str) {
        if mean > 10.0 {
            (Stability::Low, "Alta variação térmica - pode afetar qualidade")
        } else if mean > 5.0 {
            (Stability::Moderate, "Variação normal - monitorar")
        } else {
            (Stability::High, "Ótima estabilidade térmica")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAmplitude {
    #[serde(rename = "data")]
    pub date: NaiveDate,
    #[serde(rename = "temp_minima")]
    pub min: f64,
    #[serde(rename = "temp_maxima")]
    pub max: f64,
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmplitudeReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "amplitude_media")]
    pub mean: f64,
    #[serde(rename = "amplitude_maxima")]
    pub max: f64,
    #[serde(rename = "amplitude_minima")]
    pub min: f64,
    #[serde(rename = "estabilidade")]
    pub stability: Stability,
    #[serde(rename = "alerta")]
    pub alert: String,
    /// Ascending by date (UTC calendar days).
    #[serde(rename = "historico_diario")]
    pub daily: Vec<DailyAmplitude>,
}

pub fn thermal_amplitude(series: &ReadingSeries, days: u32) -> Result<AmplitudeReport, AnalyticsError> {
    require("thermal_amplitude", AMPLITUDE_MIN_READINGS, series.len())?;

    let mut by_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for (timestamp, t) in series.points(Quantity::Temperature) {
        by_day
            .entry(timestamp.date_naive())
            .and_modify(|(lo, hi)| {
                *lo = lo.min(t);
                *hi = hi.max(t);
            })
            .or_insert((t, t));
    }
    require("thermal_amplitude", 1, by_day.len())?;

    let amplitudes: Vec<f64> = by_day.values().map(|(lo, hi)| hi - lo).collect();
    let mean = stats::mean(&amplitudes).unwrap_or(0.0);
    let (stability, alert) = Stability::from_mean_amplitude(mean);

    let daily = by_day
        .into_iter()
        .map(|(date, (lo, hi))| DailyAmplitude {
            date,
            min: round_to(lo, 2),
            max: round_to(hi, 2),
            amplitude: round_to(hi - lo, 2),
        })
        .collect();

    Ok(AmplitudeReport {
        device_id: series.device_id().to_string(),
        days,
        mean: round_to(mean, 2),
        max: round_to(stats::max(&amplitudes).unwrap_or(0.0), 2),
        min: round_to(stats::min(&amplitudes).unwrap_or(0.0), 2),
        stability,
        alert: alert.to_string(),
        daily,
    })
}

// ---------------------------------------------------------------------------
// Humidity rate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    #[serde(rename = "alto")]
    High,
    #[serde(rename = "moderado")]
    Moderate,
    #[serde(rename = "baixo")]
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumidityRateReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "taxa_media_por_hora")]
    pub mean_per_hour: f64,
    #[serde(rename = "taxa_maxima_aumento_por_hora")]
    pub max_per_hour: f64,
    #[serde(rename = "taxa_maxima_diminuicao_por_hora")]
    pub min_per_hour: f64,
    #[serde(rename = "taxa_media_por_dia")]
    pub mean_per_day: f64,
    #[serde(rename = "taxa_abs_media")]
    pub mean_abs_per_hour: f64,
    #[serde(rename = "tendencia")]
    pub direction: Direction,
    #[serde(rename = "risco")]
    pub risk: RiskLevel,
    #[serde(rename = "alerta")]
    pub alert: String,
    #[serde(rename = "total_leituras_analisadas")]
    pub rates_analysed: usize,
}

/// Signed humidity rates (%/h) between consecutive readings that survive
/// the interval and plausibility filters, in that order.
pub fn filtered_humidity_rates(series: &ReadingSeries) -> Vec<f64> {
    series
        .readings()
        .windows(2)
        .filter_map(|pair| {
            let (prev, next) = (&pair[0], &pair[1]);
            let dh = next.humidity? - prev.humidity?;
            let hours = stats::elapsed_hours(prev.timestamp, next.timestamp);
            if hours < MIN_RATE_INTERVAL_HOURS {
                return None;
            }
            let rate = dh / hours;
            (rate.abs() <= MAX_PLAUSIBLE_RATE).then_some(rate)
        })
        .collect()
}

pub fn humidity_rate(series: &ReadingSeries, days: u32) -> Result<HumidityRateReport, AnalyticsError> {
    require("humidity_rate", HUMIDITY_RATE_MIN_READINGS, series.len())?;

    let rates = filtered_humidity_rates(series);
    if rates.is_empty() {
        log::debug!(
            "no humidity rate survived filtering for {} ({} readings)",
            series.device_id(),
            series.len()
        );
    }
    require("humidity_rate", 1, rates.len())?;

    let mean = stats::mean(&rates).unwrap_or(0.0);
    let abs_rates: Vec<f64> = rates.iter().map(|r| r.abs()).collect();
    let mean_abs = stats::mean(&abs_rates).unwrap_or(0.0);

    let (risk, alert) = if mean_abs > 2.0 {
        (RiskLevel::High, "Taxa de variação crítica - verificar vedação")
    } else if mean_abs > 1.0 {
        (RiskLevel::Moderate, "Taxa elevada - monitorar infiltração")
    } else {
        (RiskLevel::Low, "Taxa normal de variação")
    };

    Ok(HumidityRateReport {
        device_id: series.device_id().to_string(),
        days,
        mean_per_hour: round_to(mean, 3),
        max_per_hour: round_to(stats::max(&rates).unwrap_or(0.0), 3),
        min_per_hour: round_to(stats::min(&rates).unwrap_or(0.0), 3),
        mean_per_day: round_to(mean * 24.0, 2),
        mean_abs_per_hour: round_to(mean_abs, 3),
        direction: Direction::from_slope(mean),
        risk,
        alert: alert.to_string(),
        rates_analysed: rates.len(),
    })
}

// ---------------------------------------------------------------------------
// Fungus risk index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FungusLevel {
    #[serde(rename = "crítico")]
    Critical,
    #[serde(rename = "alerta")]
    Alert,
    #[serde(rename = "normal")]
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FungusReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "irf_medio")]
    pub mean_index: f64,
    #[serde(rename = "irf_maximo")]
    pub max_index: f64,
    #[serde(rename = "nivel_risco")]
    pub level: FungusLevel,
    #[serde(rename = "horas_criticas")]
    pub critical_count: usize,
    #[serde(rename = "horas_alerta")]
    pub alert_count: usize,
    #[serde(rename = "horas_normais")]
    pub normal_count: usize,
    #[serde(rename = "percentual_critico")]
    pub critical_percent: f64,
    #[serde(rename = "recomendacao")]
    pub recommendation: String,
}

/// IRF for one reading, in [0, 100].
pub fn fungus_index(temperature: f64, humidity: f64) -> f64 {
    let temp_risk = ((temperature - 30.0) / 10.0).clamp(0.0, 1.0) * 50.0;
    let humidity_risk = ((humidity - 75.0) / 25.0).clamp(0.0, 1.0) * 50.0;
    (temp_risk + humidity_risk).clamp(0.0, 100.0)
}

pub fn fungus_risk(series: &ReadingSeries, days: u32) -> Result<FungusReport, AnalyticsError> {
    let indices: Vec<f64> = series
        .complete()
        .filter_map(|r| r.pair())
        .map(|(t, h)| fungus_index(t, h))
        .collect();
    require("fungus_risk", 1, indices.len())?;

    let critical_count = indices.iter().filter(|&&i| i > 70.0).count();
    let alert_count = indices.iter().filter(|&&i| i > 40.0 && i <= 70.0).count();
    let normal_count = indices.len() - critical_count - alert_count;
    let mean = stats::mean(&indices).unwrap_or(0.0);

    let (level, recommendation) = if mean > 70.0 {
        (FungusLevel::Critical, "Ação urgente: ventilação e controle de umidade")
    } else if mean > 40.0 {
        (FungusLevel::Alert, "Monitorar de perto e melhorar ventilação")
    } else {
        (FungusLevel::Normal, "Condições adequadas")
    };

    Ok(FungusReport {
        device_id: series.device_id().to_string(),
        days,
        mean_index: round_to(mean, 2),
        max_index: round_to(stats::max(&indices).unwrap_or(0.0), 2),
        level,
        critical_count,
        alert_count,
        normal_count,
        critical_percent: round_to(critical_count as f64 / indices.len() as f64 * 100.0, 2),
        recommendation: recommendation.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Critical time above limit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalRun {
    #[serde(rename = "inicio")]
    pub start: DateTime<Utc>,
    #[serde(rename = "fim")]
    pub end: DateTime<Utc>,
    /// Length of the run in samples.
    #[serde(rename = "duracao_horas")]
    pub samples: usize,
    #[serde(rename = "temp_maxima")]
    pub peak_temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalTimeReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "horas_acima_35c")]
    pub critical_count: usize,
    #[serde(rename = "total_horas_analisadas")]
    pub analysed_count: usize,
    #[serde(rename = "percentual_critico")]
    pub critical_percent: f64,
    #[serde(rename = "temperatura_maxima_registrada")]
    pub max_temperature: f64,
    #[serde(rename = "nivel_risco")]
    pub risk: RiskLevel,
    #[serde(rename = "acao_recomendada")]
    pub action: String,
    /// Longest runs first, at most five.
    #[serde(rename = "periodos_criticos")]
    pub runs: Vec<CriticalRun>,
}

/// Maximal runs of consecutive readings above the critical temperature.
///
/// A missing temperature is not critical and ends the current run.
pub fn critical_runs(series: &ReadingSeries) -> Vec<CriticalRun> {
    let mut runs = Vec::new();
    let mut current: Option<CriticalRun> = None;

    for reading in series.readings() {
        match reading.temperature.filter(|t| *t > CRITICAL_TEMPERATURE_C) {
            Some(t) => match current.as_mut() {
                Some(run) => {
                    run.end = reading.timestamp;
                    run.samples += 1;
                    run.peak_temperature = run.peak_temperature.max(t);
                }
                None => {
                    current = Some(CriticalRun {
                        start: reading.timestamp,
                        end: reading.timestamp,
                        samples: 1,
                        peak_temperature: t,
                    })
                }
            },
            None => runs.extend(current.take()),
        }
    }
    runs.extend(current);

    for run in &mut runs {
        run.peak_temperature = round_to(run.peak_temperature, 2);
    }
    runs
}

pub fn critical_time(series: &ReadingSeries, days: u32) -> Result<CriticalTimeReport, AnalyticsError> {
    let temperatures = series.values(Quantity::Temperature);
    require("critical_time", 1, temperatures.len())?;

    let critical_count = temperatures
        .iter()
        .filter(|&&t| t > CRITICAL_TEMPERATURE_C)
        .count();

    let mut runs = critical_runs(series);
    runs.sort_by(|a, b| b.samples.cmp(&a.samples));
    runs.truncate(MAX_REPORTED_RUNS);

    let (risk, action) = if critical_count > 6 {
        (RiskLevel::High, "Ação urgente necessária")
    } else if critical_count > 3 {
        (RiskLevel::Moderate, "Monitorar e preparar ação")
    } else {
        (RiskLevel::Low, "Situação sob controle")
    };

    Ok(CriticalTimeReport {
        device_id: series.device_id().to_string(),
        days,
        critical_count,
        analysed_count: temperatures.len(),
        critical_percent: round_to(critical_count as f64 / temperatures.len() as f64 * 100.0, 2),
        max_temperature: round_to(stats::max(&temperatures).unwrap_or(0.0), 2),
        risk,
        action: action.to_string(),
        runs,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use chrono::Duration;

    // --- Thermal amplitude --------------------------------------------------

    #[test]
    fn test_amplitude_single_day() {
        // 24 hourly readings on one day; extremes 18 and 30
        let temps = [20.0, 25.0, 18.0, 30.0];
        let series = hourly_series(24, |i| (temps[i % 4], 50.0));
        let report = thermal_amplitude(&series, 1).expect("24 readings");

        assert_eq!(report.daily.len(), 1);
        assert_eq!(report.daily[0].amplitude, 12.0);
        assert_eq!(report.daily[0].min, 18.0);
        assert_eq!(report.daily[0].max, 30.0);
        assert_eq!(report.stability, Stability::Low);
        assert_eq!(report.alert, "Alta variação térmica - pode afetar qualidade");
    }

    #[test]
    fn test_amplitude_groups_by_calendar_day() {
        let series = diurnal_series(3);
        let report = thermal_amplitude(&series, 3).expect("72 readings");
        assert_eq!(report.daily.len(), 3);
        assert!(report.daily.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(report.stability, Stability::Moderate);
    }

    #[test]
    fn test_amplitude_requires_24_readings() {
        let err = thermal_amplitude(&constant_series(23, 20.0, 50.0), 1).unwrap_err();
        assert_eq!(err, AnalyticsError::insufficient("thermal_amplitude", 24, 23));
    }

    // --- Humidity rate ------------------------------------------------------

    #[test]
    fn test_humidity_rate_drops_short_intervals() {
        // Ten readings one minute apart: every interval is under five minutes
        let series = spaced_series(10, Duration::minutes(1), |i| (20.0, 50.0 + 10.0 * i as f64));
        assert!(filtered_humidity_rates(&series).is_empty());
        assert!(matches!(
            humidity_rate(&series, 1),
            Err(AnalyticsError::InsufficientData { report: "humidity_rate", .. })
        ));
    }

    #[test]
    fn test_humidity_rate_drops_implausible_jumps() {
        let series = hourly_series(10, |i| (20.0, if i == 5 { 120.0 } else { 50.0 + i as f64 }));
        let rates = filtered_humidity_rates(&series);
        // 4->5 (+66) and 5->6 (-64) are dropped
        assert_eq!(rates.len(), 7);
        assert!(rates.iter().all(|r| *r == 1.0));
    }

    #[test]
    fn test_humidity_rate_rising_moderate_risk() {
        let series = hourly_series(12, |i| (20.0, 40.0 + 1.5 * i as f64));
        let report = humidity_rate(&series, 1).expect("rates");

        assert_eq!(report.mean_per_hour, 1.5);
        assert_eq!(report.mean_per_day, 36.0);
        assert_eq!(report.direction, Direction::Increasing);
        assert_eq!(report.risk, RiskLevel::Moderate);
        assert_eq!(report.rates_analysed, 11);
    }

    #[test]
    fn test_humidity_rate_skips_pairs_with_missing_humidity() {
        let mut points: Vec<(i64, Option<f64>, Option<f64>)> =
            (0..10).map(|h| (h, Some(20.0), Some(50.0 + h as f64))).collect();
        points[4].2 = None;
        let series = series_at_hours(&points);
        assert_eq!(filtered_humidity_rates(&series).len(), 7);
    }

    // --- Fungus risk --------------------------------------------------------

    #[test]
    fn test_fungus_index_bounds() {
        assert_eq!(fungus_index(30.0, 75.0), 0.0);
        assert_eq!(fungus_index(40.0, 100.0), 100.0);
        assert_eq!(fungus_index(50.0, 120.0), 100.0);
        assert_eq!(fungus_index(35.0, 75.0), 25.0);
    }

    #[test]
    fn test_fungus_risk_buckets() {
        let series = hourly_series(4, |i| match i {
            0 => (40.0, 100.0), // 100 critical
            1 => (36.0, 90.0),  // 30 + 30 = 60 alert
            _ => (25.0, 60.0),  // 0 normal
        });
        let report = fungus_risk(&series, 1).expect("fungus");

        assert_eq!(report.critical_count, 1);
        assert_eq!(report.alert_count, 1);
        assert_eq!(report.normal_count, 2);
        assert_eq!(report.mean_index, 40.0);
        assert_eq!(report.level, FungusLevel::Normal);
        assert_eq!(report.critical_percent, 25.0);
    }

    // --- Critical time ------------------------------------------------------

    #[test]
    fn test_three_hot_readings_make_one_run() {
        let series = hourly_series(4, |i| (if i < 3 { 36.0 + i as f64 } else { 30.0 }, 50.0));
        let report = critical_time(&series, 1).expect("critical time");

        assert_eq!(report.critical_count, 3);
        assert_eq!(report.runs.len(), 1);
        assert_eq!(report.runs[0].samples, 3);
        assert_eq!(report.runs[0].peak_temperature, 38.0);
        assert_eq!(report.runs[0].start, base_time());
        assert_eq!(report.runs[0].end, base_time() + Duration::hours(2));
        assert_eq!(report.risk, RiskLevel::Low);
        assert_eq!(report.critical_percent, 75.0);
    }

    #[test]
    fn test_missing_temperature_breaks_run() {
        let series = series_at_hours(&[
            (0, Some(36.0), Some(50.0)),
            (1, None, Some(50.0)),
            (2, Some(37.0), Some(50.0)),
            (3, Some(37.5), Some(50.0)),
        ]);
        let runs = critical_runs(&series);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].samples, 2);
    }

    #[test]
    fn test_runs_ordered_longest_first_top_five() {
        // Runs of length 1,2,3,4,5,6 separated by a cool reading
        let mut temps = Vec::new();
        for len in 1..=6 {
            temps.extend(std::iter::repeat_n(40.0, len));
            temps.push(20.0);
        }
        let series = hourly_series(temps.len(), |i| (temps[i], 50.0));
        let report = critical_time(&series, 7).expect("critical time");

        let lengths: Vec<usize> = report.runs.iter().map(|r| r.samples).collect();
        assert_eq!(lengths, vec![6, 5, 4, 3, 2]);
        assert_eq!(report.critical_count, 21);
        assert_eq!(report.risk, RiskLevel::High);
    }
}
