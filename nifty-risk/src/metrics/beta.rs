//! Rolling beta of a sector against the benchmark.

use serde::{Deserialize, Serialize};

use super::rolling::{
    rolling_apply_pair, sample_covariance, sample_variance, Estimate, MetricKind, RollingSeries,
    DEFAULT_EPSILON,
};

/// Rolling beta configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaConfig {
    pub window: usize,
    /// Benchmark variance at or below this leaves beta undefined.
    pub epsilon: f64,
    /// Betas outside `[low, high]` are masked. `None` keeps everything.
    pub bounds: Option<(f64, f64)>,
}

impl Default for BetaConfig {
    fn default() -> Self {
        Self {
            window: 30,
            epsilon: DEFAULT_EPSILON,
            bounds: Some((-2.0, 3.0)),
        }
    }
}

/// Estimates `Cov(r_s, r_b) / Var(r_b)` over a trailing window.
pub struct BetaEstimator {
    config: BetaConfig,
}

impl BetaEstimator {
    pub fn new(config: BetaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BetaConfig {
        &self.config
    }

    /// Beta of a single window.
    pub fn beta(&self, sector: &[f64], benchmark: &[f64]) -> Estimate {
        let (Some(cov), Some(var)) = (sample_covariance(sector, benchmark), sample_variance(benchmark)) else {
            return Estimate::Insufficient;
        };
        if var <= self.config.epsilon {
            return Estimate::Degenerate;
        }
        Estimate::Defined(cov / var)
    }

    /// Rolling beta aligned to the input returns.
    ///
    /// Windows with a flat benchmark are left undefined and their indices
    /// reported in `degenerate`. Out-of-bounds betas land in `masked`.
    pub fn rolling_beta(
        &self,
        sector: &str,
        sector_returns: &[Option<f64>],
        benchmark_returns: &[Option<f64>],
    ) -> RollingSeries {
        let (values, degenerate) = rolling_apply_pair(
            sector_returns,
            benchmark_returns,
            self.config.window,
            |s, b| self.beta(s, b),
        );

        let mut out = RollingSeries {
            series: sector.to_string(),
            kind: MetricKind::Beta,
            window: self.config.window,
            values,
            degenerate,
            masked: Vec::new(),
        };
        if let Some((low, high)) = self.config.bounds {
            out.mask(|b| (low..=high).contains(&b));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(n: usize) -> Vec<Option<f64>> {
        (0..n).map(|i| Some(((i * 7919) % 13) as f64 / 1000.0 - 0.006)).collect()
    }

    #[test]
    fn test_defined_length() {
        let b = bench(100);
        let s: Vec<Option<f64>> = b.iter().map(|r| r.map(|x| 1.5 * x + 0.001)).collect();
        let beta = BetaEstimator::new(BetaConfig::default()).rolling_beta("NIFTY_BANK", &s, &b);

        assert_eq!(beta.values.len(), 100);
        assert_eq!(beta.defined_count(), 100 - 29);
        assert_eq!(beta.first_defined(), Some(29));
        for v in beta.values.iter().flatten() {
            assert!((v - 1.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_defined_length_with_leading_undefined_return() {
        let mut b = bench(60);
        b[0] = None;
        let s = b.clone();
        let beta = BetaEstimator::new(BetaConfig::default()).rolling_beta("X", &s, &b);
        // 59 defined returns -> 59 - 29 betas
        assert_eq!(beta.defined_count(), 30);
    }

    #[test]
    fn test_zero_variance_benchmark_is_undefined() {
        let b = vec![Some(0.001); 40];
        let s = bench(40);
        let beta = BetaEstimator::new(BetaConfig::default()).rolling_beta("X", &s, &b);

        assert_eq!(beta.defined_count(), 0);
        assert_eq!(beta.degenerate.len(), 40 - 29);
        assert!(beta.values.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_out_of_bounds_beta_is_masked() {
        let b = bench(50);
        let s: Vec<Option<f64>> = b.iter().map(|r| r.map(|x| 4.0 * x)).collect();

        let beta = BetaEstimator::new(BetaConfig::default()).rolling_beta("NIFTY_REALTY", &s, &b);
        assert_eq!(beta.defined_count(), 0);
        assert_eq!(beta.masked.len(), 50 - 29);
        assert!(beta.degenerate.is_empty());

        let open = BetaEstimator::new(BetaConfig {
            bounds: None,
            ..Default::default()
        })
        .rolling_beta("NIFTY_REALTY", &s, &b);
        assert_eq!(open.defined_count(), 50 - 29);
        assert!((open.values[49].unwrap() - 4.0).abs() < 1e-9);
    }
}
