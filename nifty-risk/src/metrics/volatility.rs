//! Multi-horizon rolling volatility.
//!
//! Volatility over window `w` is the sample standard deviation of the
//! trailing `w` returns, optionally annualized by `sqrt(periods_per_year)`.
//! A flat window has volatility zero; that is a real value, not a
//! degeneracy. Values whose annualized level exceeds
//! `max_annualized_vol` are treated as data glitches and cleared.

use serde::{Deserialize, Serialize};

use super::returns::ReturnKind;
use super::rolling::{rolling_apply, sample_std, Estimate, MetricKind, RollingSeries};

/// Volatility engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    /// Rolling windows in sessions.
    pub windows: Vec<usize>,
    /// Scale by sqrt(periods_per_year).
    pub annualize: bool,
    pub periods_per_year: f64,
    pub return_kind: ReturnKind,
    /// Annualized volatility above this is masked. `None` keeps everything.
    pub max_annualized_vol: Option<f64>,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            windows: vec![10, 30, 90],
            annualize: true,
            periods_per_year: 252.0,
            return_kind: ReturnKind::Log,
            max_annualized_vol: Some(1.0),
        }
    }
}

/// Computes rolling volatility for each configured window.
pub struct VolatilityEngine {
    config: VolatilityConfig,
}

impl VolatilityEngine {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    /// Multiplier applied to the raw standard deviation.
    pub fn annualization_factor(&self) -> f64 {
        if self.config.annualize {
            self.config.periods_per_year.sqrt()
        } else {
            1.0
        }
    }

    /// Rolling volatility of one return series over one window.
    pub fn rolling_volatility(&self, series: &str, returns: &[Option<f64>], window: usize) -> RollingSeries {
        let scale = self.annualization_factor();
        let (values, degenerate) = rolling_apply(returns, window, |w| match sample_std(w) {
            Some(sd) => Estimate::Defined(sd * scale),
            None => Estimate::Insufficient,
        });

        let mut out = RollingSeries {
            series: series.to_string(),
            kind: MetricKind::Volatility,
            window,
            values,
            degenerate,
            masked: Vec::new(),
        };
        if let Some(max) = self.config.max_annualized_vol {
            let to_annual = self.config.periods_per_year.sqrt() / scale;
            out.mask(|v| v * to_annual <= max);
        }
        out
    }

    /// Rolling volatility for every configured window, in config order.
    pub fn volatility_surface(&self, series: &str, returns: &[Option<f64>]) -> Vec<RollingSeries> {
        self.config
            .windows
            .iter()
            .map(|&w| self.rolling_volatility(series, returns, w))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn returns(n: usize) -> Vec<Option<f64>> {
        (0..n).map(|i| Some(((i * 37) % 11) as f64 / 100.0 - 0.05)).collect()
    }

    #[test]
    fn test_undefined_for_first_window_minus_one() {
        let engine = VolatilityEngine::new(VolatilityConfig::default());
        let r = returns(120);

        for series in engine.volatility_surface("NIFTY_BANK", &r) {
            let w = series.window;
            assert!(series.values[..w - 1].iter().all(|v| v.is_none()));
            assert!(series.values[w - 1..].iter().all(|v| v.is_some()));
            assert_eq!(series.defined_count(), r.len() - (w - 1));
        }
    }

    #[test]
    fn test_annualization() {
        let r = vec![Some(0.01), Some(-0.01), Some(0.01), Some(-0.01)];
        let raw = VolatilityEngine::new(VolatilityConfig {
            annualize: false,
            ..Default::default()
        })
        .rolling_volatility("X", &r, 4);
        let annual = VolatilityEngine::new(VolatilityConfig::default()).rolling_volatility("X", &r, 4);

        let raw_v = raw.values[3].unwrap();
        let ann_v = annual.values[3].unwrap();
        assert!((ann_v / raw_v - 252f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_flat_window_is_zero_not_undefined() {
        let r = vec![Some(0.0); 5];
        let v = VolatilityEngine::new(VolatilityConfig::default()).rolling_volatility("X", &r, 3);
        assert_eq!(v.values[4], Some(0.0));
        assert!(v.degenerate.is_empty());
    }

    #[test]
    fn test_gap_in_returns_propagates() {
        let mut r = returns(20);
        r[10] = None;
        let v = VolatilityEngine::new(VolatilityConfig::default()).rolling_volatility("X", &r, 5);
        assert!(v.values[10..15].iter().all(|x| x.is_none()));
        assert!(v.values[15].is_some());
    }

    #[test]
    fn test_glitch_volatility_is_masked() {
        // 20% daily swings annualize far above 100%
        let mut r = vec![Some(0.001), Some(-0.002), Some(0.001), Some(0.0), Some(0.002)];
        r.extend([Some(0.2), Some(-0.2), Some(0.2)]);
        let engine = VolatilityEngine::new(VolatilityConfig::default());
        let v = engine.rolling_volatility("NIFTY_MEDIA", &r, 3);

        assert!(v.values[4].is_some());
        assert_eq!(v.masked, vec![5, 6, 7]);
        assert!(v.values[5..].iter().all(|x| x.is_none()));

        // the bound applies to the annualized level even when output is raw
        let raw = VolatilityEngine::new(VolatilityConfig {
            annualize: false,
            ..Default::default()
        })
        .rolling_volatility("NIFTY_MEDIA", &r, 3);
        assert_eq!(raw.masked, v.masked);

        let unmasked = VolatilityEngine::new(VolatilityConfig {
            max_annualized_vol: None,
            ..Default::default()
        })
        .rolling_volatility("NIFTY_MEDIA", &r, 3);
        assert!(unmasked.masked.is_empty());
        assert!(unmasked.values[7].unwrap() > 1.0);
    }
}
