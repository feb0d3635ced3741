//! Cross-series analytics.
//!
//! Provides:
//! - Lead-lag correlation of FII/DII flows against sector returns
//! - As-of sector momentum snapshot

pub mod lead_lag;
pub mod momentum;

pub use lead_lag::{LagCorrelation, LeadLagAnalyzer, LeadLagConfig, LeadLagReport};
pub use momentum::{MomentumConfig, MomentumSnapshot, SectorMomentum};
