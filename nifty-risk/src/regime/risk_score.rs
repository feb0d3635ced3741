//! Composite market risk score.
//!
//! `score = clip(50 + 12 * z(benchmark vol) - 6 * z(FII net), 0, 100)`
//! where `z` standardises over the series' own defined values. The score
//! is bucketed into a risk regime with the same Low/Medium/High rule as
//! the volatility classifier.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::classifier::{Regime, RegimeThresholds};
use crate::metrics::rolling::{mean, sample_std, DEFAULT_EPSILON};

/// Risk score configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskScoreConfig {
    /// Benchmark rolling volatility window used as the vol input.
    pub vol_window: usize,
    pub base: f64,
    pub vol_weight: f64,
    pub flow_weight: f64,
    /// Scores at or below this are Low.
    pub low: f64,
    /// Scores at or below this (and above `low`) are Medium.
    pub high: f64,
    pub epsilon: f64,
}

impl Default for RiskScoreConfig {
    fn default() -> Self {
        Self {
            vol_window: 30,
            base: 50.0,
            vol_weight: 12.0,
            flow_weight: 6.0,
            low: 40.0,
            high: 60.0,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Standardised series.
#[derive(Debug, Clone, PartialEq)]
pub enum ZScores {
    Defined(Vec<Option<f64>>),
    /// Standard deviation at or below epsilon.
    Degenerate,
    /// Fewer than two defined values.
    Insufficient,
}

/// Z-scores against the sample mean and standard deviation of the defined
/// values.
pub fn zscores(values: &[Option<f64>], epsilon: f64) -> ZScores {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    let Some(sd) = sample_std(&defined) else {
        return ZScores::Insufficient;
    };
    if sd <= epsilon {
        return ZScores::Degenerate;
    }
    let mu = mean(&defined);
    ZScores::Defined(values.iter().map(|v| v.map(|x| (x - mu) / sd)).collect())
}

/// Risk score and regime per session.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScoreSeries {
    pub scores: Vec<Option<f64>>,
    pub regimes: Vec<Option<Regime>>,
    /// Inputs whose z-score was degenerate.
    pub degenerate_inputs: Vec<String>,
}

impl RiskScoreSeries {
    pub fn latest(&self) -> Option<(usize, f64, Regime)> {
        self.scores
            .iter()
            .zip(&self.regimes)
            .enumerate()
            .rev()
            .find_map(|(i, (s, r))| Some((i, (*s)?, (*r)?)))
    }
}

/// Computes the composite score.
pub struct RiskScorer {
    config: RiskScoreConfig,
}

impl RiskScorer {
    pub fn new(config: RiskScoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskScoreConfig {
        &self.config
    }

    pub fn regime_for(&self, score: f64) -> Regime {
        Regime::from_value(
            score,
            &RegimeThresholds {
                low: self.config.low,
                high: self.config.high,
            },
        )
    }

    /// Score each session. Without a flow series the flow term is zero.
    pub fn score(&self, benchmark_vol: &[Option<f64>], fii_net: Option<&[Option<f64>]>) -> RiskScoreSeries {
        let n = benchmark_vol.len();
        let mut degenerate_inputs = Vec::new();
        let undefined = || vec![None; n];

        let vol_z = match zscores(benchmark_vol, self.config.epsilon) {
            ZScores::Defined(z) => z,
            ZScores::Degenerate => {
                degenerate_inputs.push("benchmark_vol".to_string());
                undefined()
            }
            ZScores::Insufficient => {
                warn!(input = "benchmark_vol", "fewer than two defined values, risk score undefined");
                undefined()
            }
        };

        let flow_z = match fii_net {
            None => vec![Some(0.0); n],
            Some(flow) => match zscores(flow, self.config.epsilon) {
                ZScores::Defined(z) => z,
                ZScores::Degenerate => {
                    degenerate_inputs.push("FII_Net".to_string());
                    undefined()
                }
                ZScores::Insufficient => {
                    warn!(input = "FII_Net", "fewer than two defined values, risk score undefined");
                    undefined()
                }
            },
        };

        let scores: Vec<Option<f64>> = (0..n)
            .map(|i| {
                let v = vol_z[i]?;
                let f = flow_z.get(i).copied().flatten()?;
                let raw = self.config.base + self.config.vol_weight * v - self.config.flow_weight * f;
                Some(raw.clamp(0.0, 100.0))
            })
            .collect();

        let regimes = scores.iter().map(|s| s.map(|v| self.regime_for(v))).collect();

        RiskScoreSeries {
            scores,
            regimes,
            degenerate_inputs,
        }
    }
}
