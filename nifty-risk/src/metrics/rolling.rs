//! Rolling-window kernels over aligned series.
//!
//! All series are `&[Option<f64>]` aligned to the panel calendar. A window
//! ending at index `t` covers the trailing `window` observations
//! `t + 1 - window ..= t`; it is evaluated only when every value in it is
//! defined, so the first `window - 1` outputs are always `None`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Variances at or below this are treated as zero.
pub const DEFAULT_EPSILON: f64 = 1e-12;

/// Result of a moment-based estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimate {
    Defined(f64),
    /// A denominator variance was at or below epsilon.
    Degenerate,
    /// Too few observations.
    Insufficient,
}

impl Estimate {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Defined(v) => Some(v),
            _ => None,
        }
    }
}

/// Kind of rolling metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Volatility,
    Beta,
    Correlation,
}

impl MetricKind {
    /// Short tag used in column names.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Volatility => "Vol",
            Self::Beta => "Beta",
            Self::Correlation => "Corr",
        }
    }
}

/// One defined rolling value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingMetric {
    pub date: NaiveDate,
    pub sector: String,
    pub kind: MetricKind,
    pub window_size: usize,
    pub value: f64,
}

/// A rolling metric for one series, aligned to the panel calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingSeries {
    pub series: String,
    pub kind: MetricKind,
    pub window: usize,
    pub values: Vec<Option<f64>>,
    /// Indices left undefined because the window was degenerate.
    pub degenerate: Vec<usize>,
    /// Indices cleared by a plausibility bound.
    pub masked: Vec<usize>,
}

impl RollingSeries {
    /// Master-table column name, e.g. `NIFTY_IT_Vol_30d`.
    pub fn column_name(&self) -> String {
        format!("{}_{}_{}d", self.series, self.kind.tag(), self.window)
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Index of the first defined value.
    pub fn first_defined(&self) -> Option<usize> {
        self.values.iter().position(|v| v.is_some())
    }

    /// Clear every defined value failing `keep`, recording its index in
    /// `masked`.
    pub fn mask(&mut self, keep: impl Fn(f64) -> bool) {
        for (i, v) in self.values.iter_mut().enumerate() {
            if v.is_some_and(|x| !keep(x)) {
                *v = None;
                self.masked.push(i);
            }
        }
    }

    /// Expand into per-date records, skipping undefined values.
    pub fn records(&self, dates: &[NaiveDate]) -> Vec<RollingMetric> {
        dates
            .iter()
            .zip(&self.values)
            .filter_map(|(date, v)| {
                v.map(|value| RollingMetric {
                    date: *date,
                    sector: self.series.clone(),
                    kind: self.kind,
                    window_size: self.window,
                    value,
                })
            })
            .collect()
    }
}

pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1 denominator).
pub fn sample_variance(xs: &[f64]) -> Option<f64> {
    sample_covariance(xs, xs)
}

/// Sample covariance (n - 1 denominator).
pub fn sample_covariance(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs);
    let my = mean(ys);
    let sum: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    Some(sum / (n - 1) as f64)
}

/// Sample standard deviation.
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    sample_variance(xs).map(|v| v.max(0.0).sqrt())
}

/// Pearson correlation of paired observations.
pub fn pearson(xs: &[f64], ys: &[f64], epsilon: f64) -> Estimate {
    let (Some(cov), Some(vx), Some(vy)) = (
        sample_covariance(xs, ys),
        sample_variance(xs),
        sample_variance(ys),
    ) else {
        return Estimate::Insufficient;
    };

    if vx <= epsilon || vy <= epsilon {
        return Estimate::Degenerate;
    }

    Estimate::Defined((cov / (vx * vy).sqrt()).clamp(-1.0, 1.0))
}

/// Trailing window ending at `end`, if fully defined.
pub fn window_at(values: &[Option<f64>], end: usize, window: usize) -> Option<Vec<f64>> {
    if window == 0 || end + 1 < window || end >= values.len() {
        return None;
    }
    values[end + 1 - window..=end].iter().copied().collect()
}

/// Apply a single-series statistic over every trailing window.
pub fn rolling_apply(
    values: &[Option<f64>],
    window: usize,
    f: impl Fn(&[f64]) -> Estimate,
) -> (Vec<Option<f64>>, Vec<usize>) {
    let mut out = Vec::with_capacity(values.len());
    let mut degenerate = Vec::new();

    for t in 0..values.len() {
        let estimate = window_at(values, t, window)
            .map(|w| f(&w))
            .unwrap_or(Estimate::Insufficient);
        if estimate == Estimate::Degenerate {
            degenerate.push(t);
        }
        out.push(estimate.value());
    }
    (out, degenerate)
}

/// Apply a paired statistic over every trailing window of two series.
///
/// A window is evaluated only when both series are fully defined in it.
pub fn rolling_apply_pair(
    a: &[Option<f64>],
    b: &[Option<f64>],
    window: usize,
    f: impl Fn(&[f64], &[f64]) -> Estimate,
) -> (Vec<Option<f64>>, Vec<usize>) {
    let n = a.len().min(b.len());
    let mut out = Vec::with_capacity(n);
    let mut degenerate = Vec::new();

    for t in 0..n {
        let estimate = match (window_at(a, t, window), window_at(b, t, window)) {
            (Some(wa), Some(wb)) => f(&wa, &wb),
            _ => Estimate::Insufficient,
        };
        if estimate == Estimate::Degenerate {
            degenerate.push(t);
        }
        out.push(estimate.value());
    }
    (out, degenerate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_moments() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&xs) - 5.0).abs() < 1e-12);
        assert!((sample_variance(&xs).unwrap() - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[1.0]), None);
    }

    #[test]
    fn test_pearson_perfect_and_degenerate() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        let neg = [8.0, 6.0, 4.0, 2.0];
        let flat = [3.0, 3.0, 3.0, 3.0];

        assert!((pearson(&xs, &ys, DEFAULT_EPSILON).value().unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&xs, &neg, DEFAULT_EPSILON).value().unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&xs, &flat, DEFAULT_EPSILON), Estimate::Degenerate);
        assert_eq!(pearson(&xs[..1], &ys[..1], DEFAULT_EPSILON), Estimate::Insufficient);
    }

    #[test]
    fn test_window_requires_full_coverage() {
        let values = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)];
        assert_eq!(window_at(&values, 1, 2), None);
        assert_eq!(window_at(&values, 3, 2), Some(vec![3.0, 4.0]));
        assert_eq!(window_at(&values, 0, 2), None);
        assert_eq!(window_at(&values, 4, 6), None);
    }

    #[test]
    fn test_rolling_apply_prefix_undefined() {
        let values: Vec<Option<f64>> = (0..6).map(|i| Some(i as f64)).collect();
        let (out, degenerate) = rolling_apply(&values, 3, |w| Estimate::Defined(mean(w)));

        assert_eq!(out[..2], [None::<f64>, None]);
        assert_eq!(out[2], Some(1.0));
        assert_eq!(out[5], Some(4.0));
        assert!(degenerate.is_empty());
    }

    #[test]
    fn test_records_skip_undefined() {
        let dates: Vec<NaiveDate> = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2022, 6, d).unwrap())
            .collect();
        let series = RollingSeries {
            series: "NIFTY_IT".to_string(),
            kind: MetricKind::Beta,
            window: 2,
            values: vec![None, Some(1.1), Some(0.9)],
            degenerate: vec![],
            masked: vec![],
        };

        let records = series.records(&dates);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, dates[1]);
        assert_eq!(series.column_name(), "NIFTY_IT_Beta_2d");
        assert_eq!(series.first_defined(), Some(1));
    }

    #[test]
    fn test_mask_clears_out_of_range() {
        let mut series = RollingSeries {
            series: "NIFTY_METAL".to_string(),
            kind: MetricKind::Beta,
            window: 2,
            values: vec![None, Some(0.5), Some(7.0), Some(-3.0)],
            degenerate: vec![],
            masked: vec![],
        };

        series.mask(|b| (-2.0..=3.0).contains(&b));
        assert_eq!(series.values, vec![None, Some(0.5), None, None]);
        assert_eq!(series.masked, vec![2, 3]);
    }
}
