#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Linear trend fitting over recent case counts.
//!
//! Fits an ordinary least-squares line to a short window of `(date, count)`
//! observations and projects it one day past the last observation. The model
//! is ephemeral: recomputed per forecast request, never persisted.

use chrono::NaiveDate;

/// Errors from trend fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ForecastError {
    /// Fewer than two observations in the window; a line is undefined.
    #[error("insufficient history: {got} observations, need at least 2")]
    InsufficientHistory {
        /// Number of observations that were available.
        got: usize,
    },

    /// All observations share a single date, so the slope is undefined.
    #[error("degenerate series: all observations share one date")]
    DegenerateSeries,
}

/// A fitted linear trend `count = slope * day_index + intercept`.
///
/// Day indexes are 0-based days since the first observation in the fitting
/// window; gaps in the series keep their true day offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendModel {
    /// Fitted cases-per-day slope.
    pub slope: f64,
    /// Fitted count at day index 0.
    pub intercept: f64,
}

impl TrendModel {
    /// Fits an ordinary least-squares line to date-ordered observations.
    ///
    /// # Errors
    ///
    /// [`ForecastError::InsufficientHistory`] below two observations;
    /// [`ForecastError::DegenerateSeries`] when every observation falls on
    /// the same date.
    pub fn fit(observations: &[(NaiveDate, u32)]) -> Result<Self, ForecastError> {
        if observations.len() < 2 {
            return Err(ForecastError::InsufficientHistory {
                got: observations.len(),
            });
        }

        let first = observations[0].0;
        let points: Vec<(f64, f64)> = observations
            .iter()
            .map(|&(date, count)| {
                #[allow(clippy::cast_precision_loss)]
                let x = (date - first).num_days() as f64;
                (x, f64::from(count))
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        let sum_x: f64 = points.iter().map(|&(x, _)| x).sum();
        let sum_y: f64 = points.iter().map(|&(_, y)| y).sum();
        let sum_xx: f64 = points.iter().map(|&(x, _)| x * x).sum();
        let sum_xy: f64 = points.iter().map(|&(x, y)| x * y).sum();

        let denominator = n.mul_add(sum_xx, -(sum_x * sum_x));
        if denominator.abs() < f64::EPSILON {
            return Err(ForecastError::DegenerateSeries);
        }

        let slope = n.mul_add(sum_xy, -(sum_x * sum_y)) / denominator;
        let intercept = (sum_y - slope * sum_x) / n;

        Ok(Self { slope, intercept })
    }

    /// Evaluates the fitted line at a day index.
    #[must_use]
    pub fn predict(&self, day_index: f64) -> f64 {
        self.slope.mul_add(day_index, self.intercept)
    }
}

/// Forecasts the count one day past the last observation.
///
/// Fits on the trailing `window` observations of the date-ordered
/// `history`, evaluates one day beyond the last observed date, and clamps
/// negative projections to zero — case counts cannot be negative.
///
/// # Errors
///
/// Propagates [`TrendModel::fit`] errors; an over-long window is clamped to
/// the available history rather than failing.
pub fn forecast(history: &[(NaiveDate, u32)], window: usize) -> Result<f64, ForecastError> {
    let start = history.len().saturating_sub(window);
    let recent = &history[start..];

    let model = TrendModel::fit(recent)?;

    let first = recent[0].0;
    let last = recent[recent.len() - 1].0;
    #[allow(clippy::cast_precision_loss)]
    let next_index = ((last - first).num_days() + 1) as f64;

    let predicted = model.predict(next_index);
    if predicted < 0.0 {
        log::debug!("Clamping negative forecast {predicted:.2} to 0");
        return Ok(0.0);
    }
    Ok(predicted)
}
