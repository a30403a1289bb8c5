/// Built-in `SeasonalForecaster`: penalised least squares over a
/// piecewise-linear trend and Fourier seasonal terms.
///
/// Model, with `s` the time scaled to [0, 1] over the history:
///
/// ```text
/// y(s) = k + m*s + Σ δ_j * max(0, s - c_j)        trend
///      + Σ a_n sin(2πnt/P) + b_n cos(2πnt/P)      per enabled season
/// ```
///
/// Changepoints `c_j` sit at evenly spaced observations across the first
/// 80% of the history. Their rate adjustments `δ_j` carry an L2 penalty of
/// `1 / (2 * changepoint_prior_scale²)`, so a small prior scale keeps the
/// trend close to a straight line. Values are scaled by their maximum
/// magnitude before fitting. The uncertainty band is `yhat ± z * σ` where
/// σ is the residual standard deviation and `z` the two-sided normal
/// quantile of `interval_width`.

use chrono::{DateTime, Duration, Utc};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::analysis::forecast::{ForecastPoint, ForecastSettings, SeasonalForecaster};
use crate::analysis::stats;
use crate::error::{require, AnalyticsError};

const N_CHANGEPOINTS: usize = 25;
const CHANGEPOINT_RANGE: f64 = 0.8;
const SEASONALITY_PRIOR_SCALE: f64 = 10.0;
const YEARLY_FOURIER_ORDER: usize = 10;

const DAY_SECONDS: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicForecaster {
    pub daily_order: usize,
    pub weekly_order: usize,
    pub interval_width: f64,
}

impl Default for HarmonicForecaster {
    fn default() -> Self {
        Self {
            daily_order: 4,
            weekly_order: 3,
            interval_width: 0.8,
        }
    }
}

/// Period in days and Fourier order of one seasonal component.
#[derive(Debug, Clone, Copy)]
struct Season {
    period_days: f64,
    order: usize,
}

/// Column layout shared by fitting and prediction.
struct Design {
    origin: DateTime<Utc>,
    span_secs: f64,
    changepoints: Vec<f64>,
    seasons: Vec<Season>,
}

impl Design {
    fn width(&self) -> usize {
        2 + self.changepoints.len() + self.seasons.iter().map(|s| 2 * s.order).sum::<usize>()
    }

    fn row(&self, ts: DateTime<Utc>) -> Vec<f64> {
        let s = stats::elapsed_seconds(self.origin, ts) / self.span_secs;
        let t_days = ts.timestamp() as f64 / DAY_SECONDS;

        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.push(s);
        row.extend(self.changepoints.iter().map(|c| (s - c).max(0.0)));
        for season in &self.seasons {
            for n in 1..=season.order {
                let angle = std::f64::consts::TAU * n as f64 * t_days / season.period_days;
                row.push(angle.sin());
                row.push(angle.cos());
            }
        }
        row
    }
}

impl HarmonicForecaster {
    pub fn new(daily_order: usize, weekly_order: usize, interval_width: f64) -> Self {
        Self {
            daily_order,
            weekly_order,
            interval_width,
        }
    }

    fn seasons(&self, settings: &ForecastSettings) -> Vec<Season> {
        let mut seasons = Vec::new();
        if settings.daily_seasonality && self.daily_order > 0 {
            seasons.push(Season { period_days: 1.0, order: self.daily_order });
        }
        if settings.weekly_seasonality && self.weekly_order > 0 {
            seasons.push(Season { period_days: 7.0, order: self.weekly_order });
        }
        if settings.yearly_seasonality {
            seasons.push(Season { period_days: 365.25, order: YEARLY_FOURIER_ORDER });
        }
        seasons
    }

    fn interval_z(&self) -> Result<f64, AnalyticsError> {
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(AnalyticsError::invalid(
                "interval_width",
                format!("{} is outside (0, 1)", self.interval_width),
            ));
        }
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalyticsError::computation("harmonic_forecast", e.to_string()))?;
        Ok(normal.inverse_cdf((1.0 + self.interval_width) / 2.0))
    }
}

/// Scaled positions of the changepoints among the first 80% of samples.
fn changepoint_positions(scaled: &[f64]) -> Vec<f64> {
    let history = (scaled.len() as f64 * CHANGEPOINT_RANGE).floor() as usize;
    if history < 2 {
        return Vec::new();
    }
    let count = N_CHANGEPOINTS.min(history - 1);
    (1..=count)
        .map(|j| {
            let idx = (j as f64 * (history - 1) as f64 / count as f64).round() as usize;
            scaled[idx]
        })
        .collect()
}

impl SeasonalForecaster for HarmonicForecaster {
    fn fit_and_predict(
        &self,
        points: &[(DateTime<Utc>, f64)],
        settings: &ForecastSettings,
        horizon_steps: usize,
        step: Duration,
    ) -> Result<Vec<ForecastPoint>, AnalyticsError> {
        require("harmonic_forecast", 2, points.len())?;
        let z = self.interval_z()?;

        let origin = points[0].0;
        let last = points[points.len() - 1].0;
        let span_secs = stats::elapsed_seconds(origin, last);
        if span_secs <= 0.0 {
            return Err(AnalyticsError::computation(
                "harmonic_forecast",
                "history spans no time",
            ));
        }

        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let y_scale = values
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
            .max(f64::MIN_POSITIVE);

        let scaled_times: Vec<f64> = points
            .iter()
            .map(|(ts, _)| stats::elapsed_seconds(origin, *ts) / span_secs)
            .collect();

        let design = Design {
            origin,
            span_secs,
            changepoints: changepoint_positions(&scaled_times),
            seasons: self.seasons(settings),
        };
        let width = design.width();

        let mut x = DMatrix::<f64>::zeros(points.len(), width);
        for (i, (ts, _)) in points.iter().enumerate() {
            for (j, v) in design.row(*ts).into_iter().enumerate() {
                x[(i, j)] = v;
            }
        }
        let y = DVector::from_iterator(values.len(), values.iter().map(|v| v / y_scale));

        // Penalties: tiny ridge on the base trend, prior-scale ridge on the
        // changepoint deltas and seasonal coefficients
        let delta_penalty = 1.0 / (2.0 * settings.changepoint_prior_scale.powi(2));
        let season_penalty = 1.0 / (2.0 * SEASONALITY_PRIOR_SCALE.powi(2));
        let n_cp = design.changepoints.len();

        let mut normal = x.transpose() * &x;
        for j in 0..width {
            normal[(j, j)] += match j {
                0 | 1 => 1e-9,
                j if j < 2 + n_cp => delta_penalty,
                _ => season_penalty,
            };
        }
        let rhs = x.transpose() * &y;

        let beta = normal
            .cholesky()
            .ok_or_else(|| {
                AnalyticsError::computation("harmonic_forecast", "normal equations not positive definite")
            })?
            .solve(&rhs);

        let fitted = &x * &beta;
        let residuals: Vec<f64> = fitted
            .iter()
            .zip(&values)
            .map(|(f, v)| v - f * y_scale)
            .collect();
        let sigma = stats::std_dev(&residuals).unwrap_or(0.0);

        log::debug!(
            "harmonic fit: {} observations, {} columns, residual sd {:.4}",
            points.len(),
            width,
            sigma
        );

        let mut out = Vec::with_capacity(horizon_steps);
        for k in 1..=horizon_steps {
            let ts = last + step * k as i32;
            let row = DVector::from_vec(design.row(ts));
            let value = row.dot(&beta) * y_scale;
            if !value.is_finite() {
                return Err(AnalyticsError::computation(
                    "harmonic_forecast",
                    "prediction is not finite",
                ));
            }
            out.push(ForecastPoint {
                timestamp: ts,
                value,
                lower: value - z * sigma,
                upper: value + z * sigma,
            });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::model::Quantity;
    use chrono::Timelike;

    #[test]
    fn test_recovers_daily_cycle() {
        let series = diurnal_series(14);
        let points = series.points(Quantity::Temperature);
        let forecast = HarmonicForecaster::default()
            .fit_and_predict(&points, &ForecastSettings::SENSOR, 24, Duration::hours(1))
            .expect("fit");

        assert_eq!(forecast.len(), 24);
        let peak = forecast
            .iter()
            .find(|p| p.timestamp.hour() == 14)
            .expect("14:00 is within the horizon");
        assert!((peak.value - 29.0).abs() < 0.3, "peak {}", peak.value);
        let trough = forecast
            .iter()
            .find(|p| p.timestamp.hour() == 2)
            .expect("02:00 is within the horizon");
        assert!((trough.value - 21.0).abs() < 0.3, "trough {}", trough.value);
    }

    #[test]
    fn test_band_brackets_prediction() {
        let series = hourly_series(200, |i| (20.0 + 0.01 * i as f64 + if i % 2 == 0 { 0.3 } else { -0.3 }, 50.0));
        let points = series.points(Quantity::Temperature);
        let forecast = HarmonicForecaster::default()
            .fit_and_predict(&points, &ForecastSettings::SENSOR, 5, Duration::hours(1))
            .expect("fit");

        for p in &forecast {
            assert!(p.lower < p.value && p.value < p.upper);
        }
        assert_eq!(forecast[0].timestamp, points[199].0 + Duration::hours(1));
    }

    #[test]
    fn test_single_instant_history_fails() {
        let t = base_time();
        let points = vec![(t, 1.0), (t, 2.0)];
        assert!(matches!(
            HarmonicForecaster::default().fit_and_predict(&points, &ForecastSettings::SENSOR, 3, Duration::hours(1)),
            Err(AnalyticsError::Computation { .. })
        ));
    }

    #[test]
    fn test_invalid_interval_width() {
        let forecaster = HarmonicForecaster::new(4, 3, 1.5);
        let points = constant_series(10, 20.0, 50.0).points(Quantity::Temperature);
        assert!(matches!(
            forecaster.fit_and_predict(&points, &ForecastSettings::SENSOR, 1, Duration::hours(1)),
            Err(AnalyticsError::InvalidParameter { name: "interval_width", .. })
        ));
    }

    #[test]
    fn test_changepoints_stay_in_first_80_percent() {
        let scaled: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let cps = changepoint_positions(&scaled);
        assert_eq!(cps.len(), 25);
        assert!(cps.iter().all(|c| *c <= 0.8));
    }
}
