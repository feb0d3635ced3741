//! Batch pipeline orchestration.
//!
//! Provides:
//! - `PipelineConfig`: every component's configuration, JSON load/save
//! - `PipelineEngine`: load, align, compute and collect in one pass
//! - `PipelineResult`: derived series, master table and summaries

pub mod engine;

pub use engine::{
    NumericDegeneracyWarning, PipelineConfig, PipelineEngine, PipelineError, PipelineResult,
    SeriesMetrics,
};
