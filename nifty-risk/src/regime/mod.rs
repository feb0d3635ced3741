//! Regime classification module.
//!
//! Labels market conditions from rolling statistics:
//! - Volatility regimes: Low / Medium / High per series, fixed or
//!   quantile thresholds, optional persistence band
//! - Composite risk score: benchmark volatility vs. FII flow z-scores,
//!   bucketed at 40 / 60

pub mod classifier;
pub mod risk_score;

pub use classifier::{
    Regime, RegimeAnalysis, RegimeClassifier, RegimeClassifierConfig, RegimeLabel, RegimeStats,
    RegimeThresholds, RegimeTransition, ThresholdMethod,
};
pub use risk_score::{RiskScoreConfig, RiskScoreSeries, RiskScorer};
