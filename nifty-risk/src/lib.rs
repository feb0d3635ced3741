pub mod analytics;
pub mod data;
pub mod metrics;
pub mod pipeline;
pub mod regime;
pub mod validation;

// Re-export commonly used types
pub use data::{AlignedPanel, DataIntegrityError, DataLoader, FlowTable, InvestorClass, MasterTable, PriceSeries};
pub use validation::{DataIntegrityReport, DataIntegrityValidator};
pub use pipeline::{PipelineConfig, PipelineEngine, PipelineError, PipelineResult};
pub use analytics::{LeadLagAnalyzer, LeadLagReport, MomentumSnapshot};
pub use regime::{Regime, RegimeClassifier, RiskScorer};
pub use metrics::{BetaEstimator, RollingSeries, VolatilityEngine};
