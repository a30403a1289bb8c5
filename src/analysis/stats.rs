/// Numeric primitives shared by the report engines.
///
/// Everything here operates on plain `f64` slices and knows nothing about
/// devices or readings. The first half holds the general-purpose helpers
/// (moving average, peaks, variability, smoothing, outliers, decomposition,
/// entropy, autocorrelation); the second half holds the statistical
/// capabilities the reports delegate to (Z-score, OLS fit, Pearson and
/// Spearman correlation with two-sided p-values).

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{require, AnalyticsError};

// ---------------------------------------------------------------------------
// Basic moments
// ---------------------------------------------------------------------------

/// Rounds half-to-even at the given number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        None
    } else {
        Some(data.iter().sum::<f64>() / data.len() as f64)
    }
}

/// Population variance (divides by n).
pub fn variance(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    Some(data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    variance(data).map(f64::sqrt)
}

/// Sample standard deviation (divides by n - 1); `None` below two samples.
pub fn sample_std_dev(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let m = mean(data)?;
    let ss = data.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    Some((ss / (data.len() - 1) as f64).sqrt())
}

pub fn min(data: &[f64]) -> Option<f64> {
    data.iter().copied().min_by(f64::total_cmp)
}

pub fn max(data: &[f64]) -> Option<f64> {
    data.iter().copied().max_by(f64::total_cmp)
}

pub fn sorted(data: &[f64]) -> Vec<f64> {
    let mut v = data.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Quantile of already-sorted data with linear interpolation between
/// closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

pub fn quantile(data: &[f64], q: f64) -> Option<f64> {
    quantile_sorted(&sorted(data), q)
}

pub fn median(data: &[f64]) -> Option<f64> {
    quantile(data, 0.5)
}

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

/// Sliding-window mean over full windows only.
///
/// Returns the input unchanged when it is shorter than the window.
pub fn moving_average(data: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || data.len() < window {
        return data.to_vec();
    }
    data.windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

/// `s[0] = x[0]; s[i] = alpha * x[i] + (1 - alpha) * s[i - 1]`
pub fn exponential_smoothing(data: &[f64], alpha: f64) -> Vec<f64> {
    let mut smoothed = Vec::with_capacity(data.len());
    for &x in data {
        let next = match smoothed.last() {
            Some(&prev) => alpha * x + (1.0 - alpha) * prev,
            None => x,
        };
        smoothed.push(next);
    }
    smoothed
}

// ---------------------------------------------------------------------------
// Peaks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakReport {
    #[serde(rename = "picos_maximos")]
    pub peaks: Vec<usize>,
    #[serde(rename = "picos_minimos")]
    pub troughs: Vec<usize>,
    #[serde(rename = "total_picos")]
    pub peak_count: usize,
    #[serde(rename = "total_vales")]
    pub trough_count: usize,
}

/// Local maxima and minima whose prominence is at least `prominence`.
pub fn detect_peaks(data: &[f64], prominence: f64) -> PeakReport {
    let peaks = prominent_maxima(data, prominence);
    let negated: Vec<f64> = data.iter().map(|x| -x).collect();
    let troughs = prominent_maxima(&negated, prominence);

    PeakReport {
        peak_count: peaks.len(),
        trough_count: troughs.len(),
        peaks,
        troughs,
    }
}

fn prominent_maxima(data: &[f64], min_prominence: f64) -> Vec<usize> {
    local_maxima(data)
        .into_iter()
        .filter(|&p| prominence(data, p) >= min_prominence)
        .collect()
}

/// Indices of strict local maxima; flat tops report their middle sample.
fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut found = Vec::new();
    if data.len() < 3 {
        return found;
    }
    let last = data.len() - 1;
    let mut i = 1;
    while i < last {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < last && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                found.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    found
}

/// Height of a peak above the higher of its two surrounding bases.
fn prominence(data: &[f64], peak: usize) -> f64 {
    let height = data[peak];

    let mut left_min = height;
    for &x in data[..=peak].iter().rev() {
        if x > height {
            break;
        }
        left_min = left_min.min(x);
    }

    let mut right_min = height;
    for &x in &data[peak..] {
        if x > height {
            break;
        }
        right_min = right_min.min(x);
    }

    height - left_min.max(right_min)
}

// ---------------------------------------------------------------------------
// Variability and outliers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variability {
    #[serde(rename = "variancia")]
    pub variance: f64,
    #[serde(rename = "desvio_padrao")]
    pub std_dev: f64,
    /// Percent; 0 when the mean is 0.
    #[serde(rename = "coeficiente_variacao")]
    pub coefficient_of_variation: f64,
    #[serde(rename = "amplitude")]
    pub range: f64,
    #[serde(rename = "intervalo_interquartil")]
    pub iqr: f64,
}

pub fn variability(data: &[f64]) -> Result<Variability, AnalyticsError> {
    require("variability", 1, data.len())?;

    let sorted = sorted(data);
    let m = mean(data).unwrap_or(0.0);
    let variance = variance(data).unwrap_or(0.0);
    let std_dev = variance.sqrt();
    let q1 = quantile_sorted(&sorted, 0.25).unwrap_or(0.0);
    let q3 = quantile_sorted(&sorted, 0.75).unwrap_or(0.0);

    Ok(Variability {
        variance,
        std_dev,
        coefficient_of_variation: if m != 0.0 { std_dev / m * 100.0 } else { 0.0 },
        range: sorted[sorted.len() - 1] - sorted[0],
        iqr: q3 - q1,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    #[serde(rename = "limite_inferior")]
    pub lower_bound: f64,
    #[serde(rename = "limite_superior")]
    pub upper_bound: f64,
    #[serde(rename = "indices_outliers")]
    pub indices: Vec<usize>,
    #[serde(rename = "total_outliers")]
    pub count: usize,
    #[serde(rename = "valores_outliers")]
    pub values: Vec<f64>,
}

/// Tukey fences: outside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`.
pub fn iqr_outliers(data: &[f64]) -> Result<OutlierReport, AnalyticsError> {
    require("iqr_outliers", 1, data.len())?;

    let sorted = sorted(data);
    let q1 = quantile_sorted(&sorted, 0.25).unwrap_or(0.0);
    let q3 = quantile_sorted(&sorted, 0.75).unwrap_or(0.0);
    let iqr = q3 - q1;
    let lower_bound = q1 - 1.5 * iqr;
    let upper_bound = q3 + 1.5 * iqr;

    let indices: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, x)| **x < lower_bound || **x > upper_bound)
        .map(|(i, _)| i)
        .collect();
    let values = indices.iter().map(|&i| data[i]).collect();

    Ok(OutlierReport {
        lower_bound,
        upper_bound,
        count: indices.len(),
        indices,
        values,
    })
}

// ---------------------------------------------------------------------------
// Rate of change
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSummary {
    #[serde(rename = "taxa_media")]
    pub mean: f64,
    #[serde(rename = "taxa_maxima")]
    pub max: f64,
    #[serde(rename = "taxa_minima")]
    pub min: f64,
    #[serde(rename = "taxa_desvio_padrao")]
    pub std_dev: f64,
}

/// Signed per-hour rates between consecutive samples.
///
/// Pairs with a non-positive time delta are skipped.
pub fn hourly_rates(values: &[f64], timestamps: &[DateTime<Utc>]) -> Vec<f64> {
    values
        .windows(2)
        .zip(timestamps.windows(2))
        .filter_map(|(v, t)| {
            let hours = elapsed_hours(t[0], t[1]);
            (hours > 0.0).then(|| (v[1] - v[0]) / hours)
        })
        .collect()
}

pub fn rate_of_change(
    values: &[f64],
    timestamps: &[DateTime<Utc>],
) -> Result<RateSummary, AnalyticsError> {
    if values.len() != timestamps.len() {
        return Err(AnalyticsError::invalid(
            "timestamps",
            format!("{} values but {} timestamps", values.len(), timestamps.len()),
        ));
    }
    require("rate_of_change", 2, values.len())?;

    let rates = hourly_rates(values, timestamps);
    require("rate_of_change", 1, rates.len())?;

    Ok(RateSummary {
        mean: mean(&rates).unwrap_or(0.0),
        max: max(&rates).unwrap_or(0.0),
        min: min(&rates).unwrap_or(0.0),
        std_dev: std_dev(&rates).unwrap_or(0.0),
    })
}

pub fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    elapsed_seconds(from, to) / 3600.0
}

pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

// ---------------------------------------------------------------------------
// Seasonal decomposition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decomposition {
    #[serde(rename = "tendencia_media")]
    pub trend_mean: f64,
    #[serde(rename = "sazonalidade_amplitude")]
    pub seasonal_amplitude: f64,
    #[serde(rename = "residuo_std")]
    pub residual_std: f64,
}

/// Classical additive decomposition with a centred moving-average trend.
///
/// Trend is undefined for the first and last `period / 2` samples; those
/// positions are excluded from every summary statistic.
pub fn seasonal_decompose(data: &[f64], period: usize) -> Result<Decomposition, AnalyticsError> {
    if period < 2 {
        return Err(AnalyticsError::invalid("period", "must be at least 2"));
    }
    require("seasonal_decompose", period * 2, data.len())?;

    let half = period / 2;
    let even = period % 2 == 0;
    let n = data.len();

    let mut trend = vec![None; n];
    for (i, slot) in trend.iter_mut().enumerate().take(n - half).skip(half) {
        let mut acc = 0.0;
        for k in 0..=(2 * half) {
            let w = if even && (k == 0 || k == 2 * half) { 0.5 } else { 1.0 };
            acc += w * data[i + k - half];
        }
        *slot = Some(acc / period as f64);
    }

    let mut phase_sum = vec![0.0; period];
    let mut phase_count = vec![0usize; period];
    for (i, t) in trend.iter().enumerate() {
        if let Some(t) = t {
            phase_sum[i % period] += data[i] - t;
            phase_count[i % period] += 1;
        }
    }
    let mut phase_avg: Vec<f64> = phase_sum
        .iter()
        .zip(&phase_count)
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();
    let centre = mean(&phase_avg).unwrap_or(0.0);
    for v in &mut phase_avg {
        *v -= centre;
    }

    let trend_values: Vec<f64> = trend.iter().flatten().copied().collect();
    let residuals: Vec<f64> = trend
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.map(|t| data[i] - t - phase_avg[i % period]))
        .collect();

    Ok(Decomposition {
        trend_mean: mean(&trend_values).unwrap_or(0.0),
        seasonal_amplitude: max(&phase_avg).unwrap_or(0.0) - min(&phase_avg).unwrap_or(0.0),
        residual_std: sample_std_dev(&residuals).unwrap_or(0.0),
    })
}

// ---------------------------------------------------------------------------
// Entropy and autocorrelation
// ---------------------------------------------------------------------------

/// Entropy (bits) of the density-normalised histogram.
///
/// Uses bin densities, not probabilities, so the value depends on the data
/// range. A constant series is binned over `[x - 0.5, x + 0.5]`.
pub fn histogram_entropy(data: &[f64], bins: usize) -> f64 {
    if data.is_empty() || bins == 0 {
        return 0.0;
    }
    let (mut lo, mut hi) = (min(data).unwrap_or(0.0), max(data).unwrap_or(0.0));
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &x in data {
        let idx = (((x - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let n = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let density = c as f64 / (n * width);
            -density * density.log2()
        })
        .sum()
}

/// Lag-k autocorrelation; 0 for constant or too-short input.
pub fn autocorrelation(data: &[f64], lag: usize) -> f64 {
    if data.len() <= lag {
        return 0.0;
    }
    let m = mean(data).unwrap_or(0.0);
    let c0: f64 = data.iter().map(|x| (x - m).powi(2)).sum();
    if c0 == 0.0 {
        return 0.0;
    }
    let c_lag: f64 = data
        .iter()
        .zip(&data[lag..])
        .map(|(a, b)| (a - m) * (b - m))
        .sum();
    c_lag / c0
}

// ---------------------------------------------------------------------------
// Statistical capabilities
// ---------------------------------------------------------------------------

/// Population Z-scores.
///
/// Fails with `Computation` when the standard deviation is zero or not
/// finite.
pub fn zscores(data: &[f64]) -> Result<Vec<f64>, AnalyticsError> {
    let (Some(m), Some(sd)) = (mean(data), std_dev(data)) else {
        return Err(AnalyticsError::computation("zscore", "empty input"));
    };
    if !(sd.is_finite() && sd > 0.0) {
        return Err(AnalyticsError::computation(
            "zscore",
            format!("degenerate standard deviation {sd}"),
        ));
    }
    Ok(data.iter().map(|x| (x - m) / sd).collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Ordinary least squares of `ys` on `xs`.
///
/// A perfectly flat response has R² = 1.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Result<LinearFit, AnalyticsError> {
    if xs.len() != ys.len() {
        return Err(AnalyticsError::computation("linear_fit", "length mismatch"));
    }
    require("linear_fit", 2, xs.len())?;

    let mx = mean(xs).unwrap_or(0.0);
    let my = mean(ys).unwrap_or(0.0);
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();

    if sxx == 0.0 {
        return Err(AnalyticsError::computation(
            "linear_fit",
            "regressor has zero variance",
        ));
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;

    let ss_tot: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Fit for a response observed at a single regressor value: no slope, and
/// R² = 1 only when the response is flat.
pub fn level_fit(ys: &[f64]) -> LinearFit {
    let flat = ys.windows(2).all(|w| w[0] == w[1]);
    LinearFit {
        slope: 0.0,
        intercept: mean(ys).unwrap_or(0.0),
        r_squared: if flat { 1.0 } else { 0.0 },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub coefficient: f64,
    /// Two-sided p-value of the t-test with n - 2 degrees of freedom.
    pub p_value: f64,
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> Result<Correlation, AnalyticsError> {
    if xs.len() != ys.len() {
        return Err(AnalyticsError::computation("pearson", "length mismatch"));
    }
    require("pearson", 3, xs.len())?;

    let mx = mean(xs).unwrap_or(0.0);
    let my = mean(ys).unwrap_or(0.0);
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let syy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();

    if sxx == 0.0 || syy == 0.0 {
        return Err(AnalyticsError::computation(
            "pearson",
            "input has zero variance",
        ));
    }

    let r = (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0);
    Ok(Correlation {
        coefficient: r,
        p_value: correlation_p_value(r, xs.len())?,
    })
}

/// Pearson correlation of average ranks.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Result<Correlation, AnalyticsError> {
    if xs.len() != ys.len() {
        return Err(AnalyticsError::computation("spearman", "length mismatch"));
    }
    pearson(&ranks(xs), &ranks(ys)).map_err(|e| match e {
        AnalyticsError::Computation { reason, .. } => AnalyticsError::computation("spearman", reason),
        other => other,
    })
}

/// 1-based ranks; ties share the average of their positions.
pub fn ranks(data: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..data.len()).collect();
    order.sort_by(|&a, &b| data[a].total_cmp(&data[b]));

    let mut ranks = vec![0.0; data.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && data[order[j + 1]] == data[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

fn correlation_p_value(r: f64, n: usize) -> Result<f64, AnalyticsError> {
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return Ok(0.0);
    }
    let t = r * (df / denom).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| AnalyticsError::computation("correlation_p_value", e.to_string()))?;
    Ok((2.0 * dist.cdf(-t.abs())).min(1.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
