//! Return and rolling risk metrics.
//!
//! Provides:
//! - Log/simple daily returns and horizon (momentum) returns
//! - Multi-window rolling volatility
//! - Rolling beta and rolling correlation against the benchmark
//! - Full-sample correlation matrix
//! - Drawdown analysis

pub mod beta;
pub mod correlation;
pub mod drawdown;
pub mod returns;
pub mod rolling;
pub mod volatility;

pub use beta::{BetaConfig, BetaEstimator};
pub use correlation::{rolling_correlation, CorrelationMatrix};
pub use drawdown::{analyze_drawdown, DrawdownAnalysis};
pub use returns::{compute_returns, horizon_returns, ReturnKind};
pub use rolling::{Estimate, MetricKind, RollingMetric, RollingSeries, DEFAULT_EPSILON};
pub use volatility::{VolatilityConfig, VolatilityEngine};
