/// General statistics over one device's series.
///
/// Descriptive statistics, Z-score anomaly detection, linear trends,
/// temperature/humidity correlation and the thermal comfort index. Every
/// function is pure over its `ReadingSeries` and returns a complete report
/// or an `AnalyticsError`; anomaly detection is the one report that degrades
/// to an empty result instead of failing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::stats::{self, round_to};
use crate::error::{require, AnalyticsError};
use crate::model::{Quantity, ReadingSeries};

pub const TREND_MIN_READINGS: usize = 10;
pub const CORRELATION_MIN_READINGS: usize = 10;
pub const ANOMALY_MIN_READINGS: usize = 3;
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 3.0;
const HIGH_SEVERITY_Z: f64 = 4.0;
const SIGNIFICANCE_LEVEL: f64 = 0.05;

// ---------------------------------------------------------------------------
// Descriptive statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    #[serde(rename = "inicio")]
    pub start: DateTime<Utc>,
    #[serde(rename = "fim")]
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quartiles {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityStatistics {
    #[serde(rename = "media")]
    pub mean: f64,
    #[serde(rename = "mediana")]
    pub median: f64,
    #[serde(rename = "desvio_padrao")]
    pub std_dev: f64,
    #[serde(rename = "minimo")]
    pub min: f64,
    #[serde(rename = "maximo")]
    pub max: f64,
    #[serde(rename = "quartis")]
    pub quartiles: Quartiles,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo")]
    pub period: Period,
    #[serde(rename = "temperatura")]
    pub temperature: QuantityStatistics,
    #[serde(rename = "umidade")]
    pub humidity: QuantityStatistics,
    #[serde(rename = "total_leituras")]
    pub reading_count: usize,
}

/// Mean, median, population std, extremes and quartiles per quantity.
pub fn basic_statistics(series: &ReadingSeries) -> Result<StatisticsReport, AnalyticsError> {
    require("basic_statistics", 1, series.len())?;
    let (Some(start), Some(end)) = (series.first_timestamp(), series.last_timestamp()) else {
        return Err(AnalyticsError::insufficient("basic_statistics", 1, 0));
    };

    Ok(StatisticsReport {
        device_id: series.device_id().to_string(),
        period: Period { start, end },
        temperature: quantity_statistics(&series.values(Quantity::Temperature))?,
        humidity: quantity_statistics(&series.values(Quantity::Humidity))?,
        reading_count: series.len(),
    })
}

fn quantity_statistics(values: &[f64]) -> Result<QuantityStatistics, AnalyticsError> {
    require("basic_statistics", 1, values.len())?;
    let sorted = stats::sorted(values);
    let q = |p: f64| round_to(stats::quantile_sorted(&sorted, p).unwrap_or(0.0), 2);

    Ok(QuantityStatistics {
        mean: round_to(stats::mean(values).unwrap_or(0.0), 2),
        median: q(0.5),
        std_dev: round_to(stats::std_dev(values).unwrap_or(0.0), 2),
        min: round_to(sorted[0], 2),
        max: round_to(sorted[sorted.len() - 1], 2),
        quartiles: Quartiles {
            q1: q(0.25),
            q2: q(0.5),
            q3: q(0.75),
        },
    })
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    #[serde(rename = "alta")]
    High,
    #[serde(rename = "moderada")]
    Moderate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "tipo")]
    pub quantity: Quantity,
    #[serde(rename = "valor")]
    pub value: f64,
    /// Absolute Z-score.
    #[serde(rename = "zscore")]
    pub z_score: f64,
    #[serde(rename = "gravidade")]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_horas")]
    pub hours: u32,
    #[serde(rename = "total_anomalias")]
    pub count: usize,
    /// Most recent first.
    #[serde(rename = "anomalias")]
    pub anomalies: Vec<Anomaly>,
}

/// Flags readings whose `|z| > threshold`, per quantity.
///
/// Never fails: short series and degenerate variance give an empty report.
pub fn detect_anomalies(series: &ReadingSeries, hours: u32, threshold: f64) -> AnomalyReport {
    let mut anomalies = Vec::new();

    if series.len() >= ANOMALY_MIN_READINGS {
        for quantity in Quantity::ALL {
            match quantity_anomalies(series, quantity, threshold) {
                Ok(found) => anomalies.extend(found),
                Err(e) => log::warn!(
                    "anomaly detection skipped {} for {}: {}",
                    quantity.label(),
                    series.device_id(),
                    e
                ),
            }
        }
    }

    anomalies.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    AnomalyReport {
        device_id: series.device_id().to_string(),
        hours,
        count: anomalies.len(),
        anomalies,
    }
}

fn quantity_anomalies(
    series: &ReadingSeries,
    quantity: Quantity,
    threshold: f64,
) -> Result<Vec<Anomaly>, AnalyticsError> {
    let points = series.points(quantity);
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let z = stats::zscores(&values)?;

    Ok(points
        .iter()
        .zip(z)
        .map(|(&(timestamp, value), z)| (timestamp, value, z.abs()))
        .filter(|&(_, _, z)| z > threshold)
        .map(|(timestamp, value, z)| Anomaly {
            timestamp,
            quantity,
            value: round_to(value, 2),
            z_score: round_to(z, 2),
            severity: if z > HIGH_SEVERITY_Z {
                Severity::High
            } else {
                Severity::Moderate
            },
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "aumentando")]
    Increasing,
    #[serde(rename = "diminuindo")]
    Decreasing,
    #[serde(rename = "estável")]
    Stable,
}

impl Direction {
    pub fn from_slope(slope: f64) -> Self {
        if slope > 0.0 {
            Direction::Increasing
        } else if slope < 0.0 {
            Direction::Decreasing
        } else {
            Direction::Stable
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Increasing => "aumentando",
            Direction::Decreasing => "diminuindo",
            Direction::Stable => "estável",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reliability {
    #[serde(rename = "alta")]
    High,
    #[serde(rename = "moderada")]
    Moderate,
    #[serde(rename = "baixa")]
    Low,
}

impl Reliability {
    pub fn from_r_squared(r2: f64) -> Self {
        if r2 > 0.7 {
            Reliability::High
        } else if r2 > 0.4 {
            Reliability::Moderate
        } else {
            Reliability::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityTrend {
    #[serde(rename = "tendencia")]
    pub direction: Direction,
    #[serde(rename = "variacao_por_hora")]
    pub change_per_hour: f64,
    #[serde(rename = "variacao_por_dia")]
    pub change_per_day: f64,
    pub r_squared: f64,
    #[serde(rename = "confiabilidade")]
    pub reliability: Reliability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "temperatura")]
    pub temperature: QuantityTrend,
    #[serde(rename = "umidade")]
    pub humidity: QuantityTrend,
}

/// OLS of each quantity against seconds elapsed since the first reading.
pub fn trends(series: &ReadingSeries, days: u32) -> Result<TrendReport, AnalyticsError> {
    require("trends", TREND_MIN_READINGS, series.len())?;
    let Some(origin) = series.first_timestamp() else {
        return Err(AnalyticsError::insufficient("trends", TREND_MIN_READINGS, 0));
    };

    let trend_of = |quantity: Quantity| -> Result<QuantityTrend, AnalyticsError> {
        let points = series.points(quantity);
        let xs: Vec<f64> = points
            .iter()
            .map(|(t, _)| stats::elapsed_seconds(origin, *t))
            .collect();
        let ys: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let fit = if xs.len() >= 2 && xs.windows(2).all(|w| w[0] == w[1]) {
            stats::level_fit(&ys)
        } else {
            stats::linear_fit(&xs, &ys)?
        };
        let per_hour = fit.slope * 3600.0;

        log::debug!(
            "{} trend for {}: slope {:.6}/s, r2 {:.4}",
            quantity.label(),
            series.device_id(),
            fit.slope,
            fit.r_squared
        );

        Ok(QuantityTrend {
            direction: Direction::from_slope(fit.slope),
            change_per_hour: round_to(per_hour, 4),
            change_per_day: round_to(per_hour * 24.0, 2),
            r_squared: round_to(fit.r_squared, 4),
            reliability: Reliability::from_r_squared(fit.r_squared),
        })
    };

    Ok(TrendReport {
        device_id: series.device_id().to_string(),
        days,
        temperature: trend_of(Quantity::Temperature)?,
        humidity: trend_of(Quantity::Humidity)?,
    })
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationSummary {
    #[serde(rename = "coeficiente")]
    pub coefficient: f64,
    #[serde(rename = "p_valor")]
    pub p_value: f64,
    #[serde(rename = "significativo")]
    pub significant: bool,
    #[serde(rename = "interpretacao")]
    pub interpretation: String,
}

impl CorrelationSummary {
    fn from_result(c: stats::Correlation) -> Self {
        Self {
            coefficient: round_to(c.coefficient, 4),
            p_value: round_to(c.p_value, 6),
            significant: c.p_value < SIGNIFICANCE_LEVEL,
            interpretation: interpret_correlation(c.coefficient),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_dias")]
    pub days: u32,
    #[serde(rename = "correlacao_pearson")]
    pub pearson: CorrelationSummary,
    #[serde(rename = "correlacao_spearman")]
    pub spearman: CorrelationSummary,
}

/// Pearson and Spearman between temperature and humidity on complete rows.
pub fn correlation(series: &ReadingSeries, days: u32) -> Result<CorrelationReport, AnalyticsError> {
    require("correlation", CORRELATION_MIN_READINGS, series.len())?;

    let (temps, hums): (Vec<f64>, Vec<f64>) = series.complete().filter_map(|r| r.pair()).unzip();
    require("correlation", 3, temps.len())?;

    Ok(CorrelationReport {
        device_id: series.device_id().to_string(),
        days,
        pearson: CorrelationSummary::from_result(stats::pearson(&temps, &hums)?),
        spearman: CorrelationSummary::from_result(stats::spearman(&temps, &hums)?),
    })
}

pub fn interpret_correlation(coefficient: f64) -> String {
    let strength = coefficient.abs();
    let direction = if coefficient < 0.0 { "negativa" } else { "positiva" };

    let band = if strength >= 0.9 {
        "muito forte"
    } else if strength >= 0.7 {
        "forte"
    } else if strength >= 0.5 {
        "moderada"
    } else if strength >= 0.3 {
        "fraca"
    } else {
        return "Correlação muito fraca ou inexistente".to_string();
    };
    format!("Correlação {direction} {band}")
}

// ---------------------------------------------------------------------------
// Comfort
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ComfortLevel {
    #[serde(rename = "muito confortável")]
    VeryComfortable,
    #[serde(rename = "confortável")]
    Comfortable,
    #[serde(rename = "levemente desconfortável")]
    SlightlyUncomfortable,
    #[serde(rename = "desconfortável")]
    Uncomfortable,
    #[serde(rename = "muito desconfortável")]
    VeryUncomfortable,
}

impl ComfortLevel {
    pub fn classify(index: f64) -> Self {
        if index < 24.0 {
            ComfortLevel::VeryComfortable
        } else if index < 27.0 {
            ComfortLevel::Comfortable
        } else if index < 30.0 {
            ComfortLevel::SlightlyUncomfortable
        } else if index < 33.0 {
            ComfortLevel::Uncomfortable
        } else {
            ComfortLevel::VeryUncomfortable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComfortReport {
    #[serde(rename = "dispositivo")]
    pub device_id: String,
    #[serde(rename = "periodo_horas")]
    pub hours: u32,
    #[serde(rename = "indice_medio")]
    pub mean_index: f64,
    #[serde(rename = "distribuicao_conforto")]
    pub distribution: BTreeMap<ComfortLevel, usize>,
    #[serde(rename = "percentual_confortavel")]
    pub comfortable_percent: f64,
    #[serde(rename = "recomendacoes")]
    pub recommendations: Vec<String>,
}

/// Simplified heat index from temperature (°C) and relative humidity (%).
pub fn discomfort_index(temperature: f64, humidity: f64) -> f64 {
    let vapour = 6.11 * (5417.7530 * (1.0 / 273.16 - 1.0 / (temperature + 273.15))).exp();
    temperature + 0.5555 * (vapour * (humidity / 100.0) - 10.0)
}

pub fn comfort(series: &ReadingSeries, hours: u32) -> Result<ComfortReport, AnalyticsError> {
    let indices: Vec<f64> = series
        .complete()
        .filter_map(|r| r.pair())
        .map(|(t, h)| discomfort_index(t, h))
        .collect();
    require("comfort", 1, indices.len())?;

    let mut distribution = BTreeMap::new();
    for &index in &indices {
        *distribution.entry(ComfortLevel::classify(index)).or_insert(0) += 1;
    }
    let comfortable = distribution
        .get(&ComfortLevel::Comfortable)
        .copied()
        .unwrap_or(0);

    Ok(ComfortReport {
        device_id: series.device_id().to_string(),
        hours,
        mean_index: round_to(stats::mean(&indices).unwrap_or(0.0), 2),
        comfortable_percent: round_to(comfortable as f64 / indices.len() as f64 * 100.0, 2),
        distribution,
        recommendations: comfort_recommendations(
            stats::mean(&series.values(Quantity::Temperature)),
            stats::mean(&series.values(Quantity::Humidity)),
        ),
    })
}

fn comfort_recommendations(mean_temp: Option<f64>, mean_humidity: Option<f64>) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(t) = mean_temp {
        if t > 26.0 {
            out.push("Temperatura acima do ideal. Considere melhorar a ventilação ou climatização.");
        }
        if t < 18.0 {
            out.push("Temperatura abaixo do ideal. Considere aquecimento do ambiente.");
        }
    }
    if let Some(h) = mean_humidity {
        if h > 70.0 {
            out.push("Umidade alta. Considere uso de desumidificador.");
        }
        if h < 30.0 {
            out.push("Umidade baixa. Considere uso de umidificador.");
        }
    }
    if out.is_empty() {
        out.push("Condições ambientais dentro dos parâmetros ideais.");
    }

    out.into_iter().map(String::from).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
