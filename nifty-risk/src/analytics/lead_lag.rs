//! Lead-lag analysis of institutional flows against sector returns.
//!
//! For each lag `k` in `[-max_lag, max_lag]` the flow at session `t - k`
//! is paired with the return at session `t`, so a positive lag means the
//! flow leads the return. Only sessions where both sides are defined
//! contribute.
//!
//! # Usage
//!
//! ```ignore
//! let analyzer = LeadLagAnalyzer::new(LeadLagConfig::default());
//! let report = analyzer.analyze("NIFTY_BANK", InvestorClass::Fii, &flows, &returns);
//! if let Some(best) = report.best {
//!     println!("peak at lag {} (r = {:.3})", best.lag, best.correlation.unwrap_or(0.0));
//! }
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::data::types::InvestorClass;
use crate::metrics::rolling::{pearson, Estimate, DEFAULT_EPSILON};

/// Configuration for lead-lag analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadLagConfig {
    /// Lags tested are `-max_lag..=max_lag` sessions.
    pub max_lag: usize,
    /// Coefficients with fewer paired observations are undefined.
    pub min_observations: usize,
    pub epsilon: f64,
    /// Sectors to analyze. Empty means every non-benchmark series.
    pub sectors: Vec<String>,
}

impl Default for LeadLagConfig {
    fn default() -> Self {
        Self {
            max_lag: 10,
            min_observations: 20,
            epsilon: DEFAULT_EPSILON,
            sectors: Vec::new(),
        }
    }
}

/// Correlation at one lag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LagCorrelation {
    pub lag: i64,
    pub correlation: Option<f64>,
    /// Paired observations used.
    pub observations: usize,
    /// Two-sided p-value against zero correlation.
    pub p_value: Option<f64>,
    /// Undefined because one side had near-zero variance.
    #[serde(default)]
    pub degenerate: bool,
}

/// Lead-lag profile of one sector against one investor class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadLagReport {
    pub sector: String,
    pub investor_class: InvestorClass,
    pub profile: Vec<LagCorrelation>,
    /// Lag with the largest absolute correlation.
    pub best: Option<LagCorrelation>,
}

impl LeadLagReport {
    pub fn at_lag(&self, lag: i64) -> Option<&LagCorrelation> {
        self.profile.iter().find(|c| c.lag == lag)
    }

    /// Lags whose coefficient was left undefined by a flat input.
    pub fn degenerate_lags(&self) -> Vec<i64> {
        self.profile.iter().filter(|c| c.degenerate).map(|c| c.lag).collect()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        match self.best {
            Some(LagCorrelation {
                lag,
                correlation: Some(r),
                observations,
                p_value,
                ..
            }) => format!(
                "{:<20} {} peak lag {:+3}  r = {:+.3}  n = {:<5} p = {}",
                self.sector,
                self.investor_class.as_str(),
                lag,
                r,
                observations,
                p_value.map(|p| format!("{:.4}", p)).unwrap_or_else(|| "-".to_string()),
            ),
            _ => format!(
                "{:<20} {} no defined correlation",
                self.sector,
                self.investor_class.as_str()
            ),
        }
    }
}

/// Pearson correlation across a range of lags.
pub struct LeadLagAnalyzer {
    config: LeadLagConfig,
}

impl LeadLagAnalyzer {
    pub fn new(config: LeadLagConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LeadLagConfig {
        &self.config
    }

    /// Correlation of `flow[t - lag]` with `returns[t]`.
    pub fn correlation_at_lag(&self, flow: &[Option<f64>], returns: &[Option<f64>], lag: i64) -> LagCorrelation {
        let n = flow.len().min(returns.len()) as i64;
        let mut xs = Vec::new();
        let mut ys = Vec::new();

        for t in 0..n {
            let s = t - lag;
            if s < 0 || s >= n {
                continue;
            }
            if let (Some(f), Some(r)) = (flow[s as usize], returns[t as usize]) {
                xs.push(f);
                ys.push(r);
            }
        }

        let observations = xs.len();
        let estimate = if observations < self.config.min_observations.max(3) {
            Estimate::Insufficient
        } else {
            pearson(&xs, &ys, self.config.epsilon)
        };
        let correlation = estimate.value();

        LagCorrelation {
            lag,
            correlation,
            observations,
            p_value: correlation.and_then(|r| correlation_p_value(r, observations)),
            degenerate: estimate == Estimate::Degenerate,
        }
    }

    /// Correlation profile over every lag and its peak.
    pub fn analyze(
        &self,
        sector: &str,
        investor_class: InvestorClass,
        flow: &[Option<f64>],
        returns: &[Option<f64>],
    ) -> LeadLagReport {
        let max_lag = self.config.max_lag as i64;
        let profile: Vec<LagCorrelation> = (-max_lag..=max_lag)
            .map(|lag| self.correlation_at_lag(flow, returns, lag))
            .collect();
        let best = select_peak(&profile);

        LeadLagReport {
            sector: sector.to_string(),
            investor_class,
            profile,
            best,
        }
    }
}

/// Peak of a lag profile by absolute correlation.
///
/// Ties go to the smallest absolute lag, then to the positive lag.
pub fn select_peak(profile: &[LagCorrelation]) -> Option<LagCorrelation> {
    profile
        .iter()
        .filter(|c| c.correlation.is_some())
        .copied()
        .max_by(|a, b| {
            let ra = a.correlation.unwrap_or(0.0).abs();
            let rb = b.correlation.unwrap_or(0.0).abs();
            ra.partial_cmp(&rb)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.lag.abs().cmp(&a.lag.abs()))
                .then_with(|| a.lag.cmp(&b.lag))
        })
}

/// Two-sided p-value of a Pearson coefficient from Student's t with
/// `n - 2` degrees of freedom.
pub fn correlation_p_value(r: f64, n: usize) -> Option<f64> {
    if n < 3 {
        return None;
    }
    if r.abs() >= 1.0 {
        return Some(0.0);
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> f64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            (self.0 % 10_000) as f64 / 10_000.0 - 0.5
        }
    }

    fn noise(n: usize, seed: u64) -> Vec<Option<f64>> {
        let mut rng = XorShift(seed);
        (0..n).map(|_| Some(rng.next())).collect()
    }

    fn lagged(flow: &[Option<f64>], k: i64) -> Vec<Option<f64>> {
        (0..flow.len() as i64)
            .map(|t| {
                let s = t - k;
                if s >= 0 && (s as usize) < flow.len() {
                    flow[s as usize]
                } else {
                    None
                }
            })
            .collect()
    }

    fn lc(lag: i64, r: Option<f64>) -> LagCorrelation {
        LagCorrelation {
            lag,
            correlation: r,
            observations: 50,
            p_value: None,
            degenerate: false,
        }
    }

    #[test]
    fn test_recovers_positive_lead() {
        let flow = noise(300, 0x9E37_79B9_7F4A_7C15);
        let returns = lagged(&flow, 3);
        let report = LeadLagAnalyzer::new(LeadLagConfig::default()).analyze(
            "NIFTY_BANK",
            InvestorClass::Fii,
            &flow,
            &returns,
        );

        let best = report.best.unwrap();
        assert_eq!(best.lag, 3);
        assert!((best.correlation.unwrap() - 1.0).abs() < 1e-9);
        assert!(best.p_value.unwrap() < 1e-12);
        assert_eq!(report.profile.len(), 21);
        assert!(report.at_lag(0).unwrap().correlation.unwrap().abs() < 0.3);
    }

    #[test]
    fn test_recovers_negative_lag() {
        let flow = noise(200, 42);
        let returns = lagged(&flow, -2);
        let report = LeadLagAnalyzer::new(LeadLagConfig::default()).analyze(
            "NIFTY_IT",
            InvestorClass::Dii,
            &flow,
            &returns,
        );
        assert_eq!(report.best.unwrap().lag, -2);
    }

    #[test]
    fn test_min_observations() {
        let flow = noise(15, 7);
        let returns = lagged(&flow, 0);
        let analyzer = LeadLagAnalyzer::new(LeadLagConfig::default());
        let c = analyzer.correlation_at_lag(&flow, &returns, 0);

        assert_eq!(c.observations, 15);
        assert_eq!(c.correlation, None);
        assert_eq!(c.p_value, None);
    }

    #[test]
    fn test_observation_count_skips_undefined() {
        let mut flow = noise(40, 11);
        flow[5] = None;
        let mut returns = noise(40, 13);
        returns[0] = None;
        let analyzer = LeadLagAnalyzer::new(LeadLagConfig::default());

        assert_eq!(analyzer.correlation_at_lag(&flow, &returns, 0).observations, 38);
        // lag 1 pairs flow[0..39] with returns[1..40]; flow[5] drops one pair
        assert_eq!(analyzer.correlation_at_lag(&flow, &returns, 1).observations, 38);
    }

    #[test]
    fn test_peak_tie_break() {
        let profile = vec![
            lc(-2, Some(0.5)),
            lc(-1, Some(-0.5)),
            lc(0, Some(0.1)),
            lc(1, Some(0.5)),
            lc(2, None),
        ];
        assert_eq!(select_peak(&profile).unwrap().lag, 1);

        let profile = vec![lc(-3, Some(0.4)), lc(3, Some(-0.4)), lc(5, Some(0.4))];
        assert_eq!(select_peak(&profile).unwrap().lag, 3);

        assert_eq!(select_peak(&[lc(0, None)]), None);
    }

    #[test]
    fn test_p_value() {
        assert_eq!(correlation_p_value(0.5, 2), None);
        let p = correlation_p_value(0.0, 30).unwrap();
        assert!((p - 1.0).abs() < 1e-9);
        let strong = correlation_p_value(0.8, 30).unwrap();
        assert!(strong < 1e-4);
    }

    #[test]
    fn test_flat_flow_marks_lags_degenerate() {
        let flow = vec![Some(250.0); 60];
        let returns = noise(60, 5);
        let report = LeadLagAnalyzer::new(LeadLagConfig::default()).analyze(
            "NIFTY_FMCG",
            InvestorClass::Fii,
            &flow,
            &returns,
        );

        assert_eq!(report.best, None);
        assert_eq!(report.degenerate_lags().len(), 21);
        assert!(report.profile.iter().all(|c| c.correlation.is_none()));

        // too few pairs is not a degeneracy
        let short = LeadLagAnalyzer::new(LeadLagConfig::default()).correlation_at_lag(&flow[..10], &returns[..10], 0);
        assert!(!short.degenerate);
    }
}
