//! Validation module for loaded market data.
//!
//! Provides a non-fatal, check-by-check integrity report over price and
//! flow inputs (continuity, value ranges, overlap, coverage).

pub mod data_integrity;

pub use data_integrity::{
    CheckResult, DataIntegrityReport, DataIntegrityValidator, IntegrityConfig, ValidationError,
    ValidationResult,
};
