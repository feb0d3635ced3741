//! Rolling and full-sample correlation.

use serde::{Deserialize, Serialize};

use super::rolling::{pearson, rolling_apply_pair, Estimate, MetricKind, RollingSeries};

/// Rolling Pearson correlation of `a` against `b`.
pub fn rolling_correlation(
    series: &str,
    a: &[Option<f64>],
    b: &[Option<f64>],
    window: usize,
    epsilon: f64,
) -> RollingSeries {
    let (values, degenerate) = rolling_apply_pair(a, b, window, |x, y| pearson(x, y, epsilon));
    RollingSeries {
        series: series.to_string(),
        kind: MetricKind::Correlation,
        window,
        values,
        degenerate,
        masked: Vec::new(),
    }
}

/// Pairs where both values are defined.
pub fn pairwise_complete(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip()
}

/// Symmetric matrix of pairwise correlations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    /// Row-major, `labels.len()` squared.
    pub values: Vec<Option<f64>>,
    /// Pairs left undefined by a near-zero variance.
    pub degenerate: Vec<(String, String)>,
}

impl CorrelationMatrix {
    /// Pairwise-complete correlations of named series.
    pub fn compute(series: &[(&str, &[Option<f64>])], epsilon: f64) -> Self {
        let n = series.len();
        let mut values = vec![None; n * n];
        let mut degenerate = Vec::new();

        for i in 0..n {
            for j in i..n {
                let value = if i == j {
                    Some(1.0)
                } else {
                    let (x, y) = pairwise_complete(series[i].1, series[j].1);
                    let estimate = pearson(&x, &y, epsilon);
                    if estimate == Estimate::Degenerate {
                        degenerate.push((series[i].0.to_string(), series[j].0.to_string()));
                    }
                    estimate.value()
                };
                values[i * n + j] = value;
                values[j * n + i] = value;
            }
        }

        Self {
            labels: series.iter().map(|(name, _)| name.to_string()).collect(),
            values,
            degenerate,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        self.values[i * self.len() + j]
    }

    /// Formatted table for terminal output.
    pub fn format_table(&self) -> String {
        let width = self.labels.iter().map(|l| l.len()).max().unwrap_or(0).max(6);
        let mut out = format!("{:width$}", "");
        for label in &self.labels {
            out.push_str(&format!(" {:>width$}", label));
        }
        out.push('\n');

        for (i, label) in self.labels.iter().enumerate() {
            out.push_str(&format!("{:width$}", label));
            for j in 0..self.len() {
                match self.values[i * self.len() + j] {
                    Some(v) => out.push_str(&format!(" {:>width$.3}", v)),
                    None => out.push_str(&format!(" {:>width$}", "-")),
                }
            }
            out.push('\n');
        }
        out
    }
}
