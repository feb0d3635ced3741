//! Data integrity validation for loaded price and flow inputs.
//!
//! Validates:
//! - Benchmark presence
//! - Date continuity (no multi-week gaps in any series)
//! - Price validity (closes strictly positive)
//! - Benchmark overlap per sector
//! - Load quality (skipped and duplicate rows)
//! - Flow coverage of the benchmark calendar
//! - Extreme daily moves
//!
//! Unlike the loader, nothing here is fatal: every check reports pass or
//! fail and the caller decides what to do.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::loader::{DataIntegrityError, DataLoader, LoaderConfig, RawInputs};
use crate::data::types::{InvestorClass, PriceSeries};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Loader error: {0}")]
    Loader(#[from] DataIntegrityError),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Thresholds for the integrity checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Calendar gaps longer than this fail continuity.
    pub max_gap_days: i64,
    /// Absolute simple daily return above which a move is flagged.
    pub max_abs_return: f64,
    /// Minimum share of benchmark sessions with an FII record.
    pub min_flow_coverage: f64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            max_gap_days: 7,
            max_abs_return: 0.20,
            min_flow_coverage: 0.5,
        }
    }
}

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete data integrity report for one set of inputs.
#[derive(Debug)]
pub struct DataIntegrityReport {
    pub benchmark: String,
    pub series_count: usize,
    pub price_rows: usize,
    pub flow_rows: usize,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// One line per check, with failure details indented beneath.
    pub fn format_checks(&self) -> String {
        let mut out = String::new();
        for check in &self.checks {
            let marker = if check.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("[{}] {:<24} {}\n", marker, check.name, check.message));
            if let (false, Some(details)) = (check.passed, &check.details) {
                for line in details.lines() {
                    out.push_str(&format!("       {}\n", line));
                }
            }
        }
        out
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let total = self.checks.len();
        format!(
            "{} ({} series, {} price rows, {} flow rows): {}/{} checks passed",
            self.benchmark, self.series_count, self.price_rows, self.flow_rows, passed, total
        )
    }
}

/// Validator for loaded market data.
pub struct DataIntegrityValidator {
    loader: DataLoader,
    benchmark: String,
    config: IntegrityConfig,
}

impl DataIntegrityValidator {
    pub fn new(loader: LoaderConfig, benchmark: &str, config: IntegrityConfig) -> Self {
        Self {
            loader: DataLoader::new(loader),
            benchmark: benchmark.to_string(),
            config,
        }
    }

    /// Load files and run every check.
    pub fn validate_files(&self, prices: &Path, flows: Option<&Path>) -> ValidationResult<DataIntegrityReport> {
        let inputs = self.loader.load(prices, flows)?;
        Ok(self.validate(&inputs))
    }

    /// Run all validation checks on loaded inputs.
    pub fn validate(&self, inputs: &RawInputs) -> DataIntegrityReport {
        let benchmark = inputs.series(&self.benchmark);

        let checks = vec![
            self.check_benchmark(benchmark),
            self.check_date_continuity(&inputs.prices),
            self.check_price_validity(&inputs.prices),
            self.check_benchmark_overlap(inputs, benchmark),
            self.check_load_quality(inputs),
            self.check_flow_coverage(inputs, benchmark),
            self.check_extreme_returns(&inputs.prices),
        ];

        DataIntegrityReport {
            benchmark: self.benchmark.clone(),
            series_count: inputs.prices.len(),
            price_rows: inputs.stats.price_rows,
            flow_rows: inputs.stats.flow_rows,
            checks,
        }
    }

    fn check_benchmark(&self, benchmark: Option<&PriceSeries>) -> CheckResult {
        match benchmark {
            Some(series) => CheckResult::pass(
                "benchmark_present",
                &format!(
                    "{} has {} sessions ({} to {})",
                    series.sector,
                    series.len(),
                    fmt_date(series.first_date()),
                    fmt_date(series.last_date())
                ),
            ),
            None => CheckResult::fail(
                "benchmark_present",
                &format!("Benchmark {} not found", self.benchmark),
                None,
            ),
        }
    }

    /// Check that trading days are continuous (no unexpected gaps).
    fn check_date_continuity(&self, prices: &[PriceSeries]) -> CheckResult {
        let mut gaps = Vec::new();
        let mut missing_weekdays = 0;

        for series in prices {
            let dates: Vec<NaiveDate> = series.dates().collect();
            for window in dates.windows(2) {
                let (prev, curr) = (window[0], window[1]);
                missing_weekdays += weekdays_between(prev, curr);

                let gap_days = (curr - prev).num_days();
                if gap_days > self.config.max_gap_days {
                    gaps.push(format!("{}: {} to {} ({} days)", series.sector, prev, curr, gap_days));
                }
            }
        }

        if gaps.is_empty() {
            CheckResult::pass(
                "date_continuity",
                &format!("No major gaps ({} missing weekdays, holidays included)", missing_weekdays),
            )
        } else {
            CheckResult::fail(
                "date_continuity",
                &format!("{} major gaps found", gaps.len()),
                Some(gaps.join(", ")),
            )
        }
    }

    /// Check that every close is strictly positive.
    fn check_price_validity(&self, prices: &[PriceSeries]) -> CheckResult {
        let issues: Vec<String> = prices
            .iter()
            .filter_map(|s| {
                let bad = s.points().iter().filter(|p| p.close <= 0.0).count();
                (bad > 0).then(|| format!("{}: {} non-positive closes", s.sector, bad))
            })
            .collect();

        if issues.is_empty() {
            CheckResult::pass("price_validity", "All closes positive")
        } else {
            CheckResult::fail("price_validity", "Non-positive closes", Some(issues.join("; ")))
        }
    }

    /// Share of each sector's sessions that the benchmark also has.
    fn check_benchmark_overlap(&self, inputs: &RawInputs, benchmark: Option<&PriceSeries>) -> CheckResult {
        let Some(benchmark) = benchmark else {
            return CheckResult::fail("benchmark_overlap", "No benchmark to compare against", None);
        };
        let bench_dates: BTreeSet<NaiveDate> = benchmark.dates().collect();

        let mut disjoint = Vec::new();
        let mut min_coverage: Option<(f64, &str)> = None;

        for series in inputs.prices.iter().filter(|s| s.sector != benchmark.sector) {
            if series.is_empty() {
                continue;
            }
            let shared = series.dates().filter(|d| bench_dates.contains(d)).count();
            if shared == 0 {
                disjoint.push(series.sector.clone());
            }
            let coverage = shared as f64 / series.len() as f64;
            if min_coverage.map_or(true, |(c, _)| coverage < c) {
                min_coverage = Some((coverage, series.sector.as_str()));
            }
        }

        if !disjoint.is_empty() {
            return CheckResult::fail(
                "benchmark_overlap",
                &format!("{} series share no dates with {}", disjoint.len(), benchmark.sector),
                Some(disjoint.join(", ")),
            );
        }

        match min_coverage {
            Some((coverage, sector)) => CheckResult::pass(
                "benchmark_overlap",
                &format!("Lowest overlap {:.1}% ({})", coverage * 100.0, sector),
            ),
            None => CheckResult::pass("benchmark_overlap", "No sector series loaded"),
        }
    }

    fn check_load_quality(&self, inputs: &RawInputs) -> CheckResult {
        let stats = &inputs.stats;
        if stats.skipped_rows == 0 && stats.duplicate_rows == 0 {
            CheckResult::pass(
                "load_quality",
                &format!("{} price rows, {} flow rows, none skipped", stats.price_rows, stats.flow_rows),
            )
        } else {
            CheckResult::fail(
                "load_quality",
                &format!(
                    "{} malformed rows skipped, {} duplicates replaced",
                    stats.skipped_rows, stats.duplicate_rows
                ),
                None,
            )
        }
    }

    /// Share of benchmark sessions with an FII record.
    fn check_flow_coverage(&self, inputs: &RawInputs, benchmark: Option<&PriceSeries>) -> CheckResult {
        if inputs.flows.is_empty() {
            return CheckResult::pass("flow_coverage", "No flow data loaded");
        }
        let Some(benchmark) = benchmark else {
            return CheckResult::fail("flow_coverage", "No benchmark calendar", None);
        };
        if benchmark.is_empty() {
            return CheckResult::fail("flow_coverage", "Empty benchmark calendar", None);
        }

        let covered = benchmark
            .dates()
            .filter(|d| inputs.flows.get(*d, InvestorClass::Fii).is_some())
            .count();
        let coverage = covered as f64 / benchmark.len() as f64;
        let message = format!(
            "{}/{} benchmark sessions have FII flows ({:.1}%)",
            covered,
            benchmark.len(),
            coverage * 100.0
        );

        if coverage >= self.config.min_flow_coverage {
            CheckResult::pass("flow_coverage", &message)
        } else {
            CheckResult::fail("flow_coverage", &message, None)
        }
    }

    /// Flag consecutive-row moves beyond `max_abs_return`.
    fn check_extreme_returns(&self, prices: &[PriceSeries]) -> CheckResult {
        let mut flagged = Vec::new();

        for series in prices {
            for w in series.points().windows(2) {
                if w[0].close <= 0.0 {
                    continue;
                }
                let r = w[1].close / w[0].close - 1.0;
                if r.abs() > self.config.max_abs_return {
                    flagged.push(format!("{} {} ({:+.1}%)", series.sector, w[1].date, r * 100.0));
                }
            }
        }

        if flagged.is_empty() {
            CheckResult::pass(
                "extreme_returns",
                &format!("No daily move beyond {:.0}%", self.config.max_abs_return * 100.0),
            )
        } else {
            CheckResult::fail(
                "extreme_returns",
                &format!("{} extreme daily moves", flagged.len()),
                Some(flagged.join(", ")),
            )
        }
    }
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Get the next expected trading day (skip weekends).
fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += Duration::days(1);
    }
    next
}

/// Weekdays strictly between two sessions.
fn weekdays_between(prev: NaiveDate, curr: NaiveDate) -> usize {
    let mut count = 0;
    let mut day = next_trading_day(prev);
    while day < curr {
        count += 1;
        day = next_trading_day(day);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::LoadStats;
    use crate::data::types::{FlowRecord, FlowTable, PricePoint};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn series(name: &str, points: &[(NaiveDate, f64)]) -> PriceSeries {
        PriceSeries::from_points(
            name,
            points.iter().map(|&(date, close)| PricePoint { date, close }).collect(),
        )
        .0
    }

    fn validator() -> DataIntegrityValidator {
        DataIntegrityValidator::new(LoaderConfig::default(), "NIFTY_50", IntegrityConfig::default())
    }

    fn clean_inputs() -> RawInputs {
        let days = [d(1, 1), d(1, 2), d(1, 3), d(1, 4), d(1, 5)];
        let bench: Vec<_> = days.iter().enumerate().map(|(i, d)| (*d, 100.0 + i as f64)).collect();
        let bank: Vec<_> = days.iter().enumerate().map(|(i, d)| (*d, 50.0 + i as f64)).collect();
        let (flows, _) = FlowTable::from_records(
            days.iter()
                .map(|date| FlowRecord { date: *date, investor_class: InvestorClass::Fii, net_flow: 1.0 })
                .collect(),
        );
        RawInputs {
            prices: vec![series("NIFTY_50", &bench), series("NIFTY_BANK", &bank)],
            flows,
            stats: LoadStats { price_rows: 10, flow_rows: 5, ..Default::default() },
        }
    }

    #[test]
    fn test_next_trading_day() {
        // Friday -> Monday
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let monday = next_trading_day(friday);
        assert_eq!(monday, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());

        // Monday -> Tuesday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let tuesday = next_trading_day(monday);
        assert_eq!(tuesday, NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
    }

    #[test]
    fn test_weekdays_between() {
        // Fri 5th -> Mon 8th: none missing
        assert_eq!(weekdays_between(d(1, 5), d(1, 8)), 0);
        // Mon 8th -> Thu 11th: Tue and Wed missing
        assert_eq!(weekdays_between(d(1, 8), d(1, 11)), 2);
    }

    #[test]
    fn test_check_result() {
        let pass = CheckResult::pass("test", "passed");
        assert!(pass.passed);

        let fail = CheckResult::fail("test", "failed", Some("details".to_string()));
        assert!(!fail.passed);
        assert_eq!(fail.details, Some("details".to_string()));
    }

    #[test]
    fn test_clean_inputs_pass() {
        let report = validator().validate(&clean_inputs());
        assert!(report.all_passed(), "{:?}", report.failed_checks());
        assert_eq!(report.checks.len(), 7);
        assert!(report.summary().contains("7/7"));
    }

    #[test]
    fn test_detects_problems() {
        let mut inputs = clean_inputs();
        inputs.prices.push(series("NIFTY_METAL", &[(d(3, 1), 10.0), (d(3, 20), 15.0), (d(3, 21), -1.0)]));
        inputs.stats.skipped_rows = 2;

        let report = validator().validate(&inputs);
        assert!(!report.all_passed());

        for name in ["date_continuity", "price_validity", "benchmark_overlap", "load_quality", "extreme_returns"] {
            assert!(!report.check(name).unwrap().passed, "{name} should fail");
        }
        assert!(report.check("flow_coverage").unwrap().passed);
    }

    #[test]
    fn test_missing_benchmark() {
        let mut inputs = clean_inputs();
        inputs.prices.remove(0);
        let report = validator().validate(&inputs);
        assert!(!report.check("benchmark_present").unwrap().passed);
        assert!(!report.check("benchmark_overlap").unwrap().passed);
    }

    #[test]
    fn test_low_flow_coverage() {
        let mut inputs = clean_inputs();
        let (flows, _) = FlowTable::from_records(vec![FlowRecord {
            date: d(1, 1),
            investor_class: InvestorClass::Fii,
            net_flow: -3.0,
        }]);
        inputs.flows = flows;
        let report = validator().validate(&inputs);
        assert!(!report.check("flow_coverage").unwrap().passed);
    }

    #[test]
    fn test_format_checks_lists_every_check() {
        let report = DataIntegrityReport {
            benchmark: "NIFTY_50".to_string(),
            series_count: 2,
            price_rows: 10,
            flow_rows: 5,
            checks: vec![
                CheckResult::pass("benchmark_present", "NIFTY_50 found"),
                CheckResult::fail(
                    "price_continuity",
                    "2 gaps over 7 days",
                    Some("NIFTY_IT: 2024-01-05 -> 2024-01-20\nNIFTY_IT: 2024-02-01 -> 2024-02-12".to_string()),
                ),
            ],
        };

        let text = report.format_checks();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("[PASS] benchmark_present"));
        assert!(lines[1].starts_with("[FAIL] price_continuity"));
        assert!(lines[1].ends_with("2 gaps over 7 days"));
        assert_eq!(lines[2].trim(), "NIFTY_IT: 2024-01-05 -> 2024-01-20");
        assert!(lines[3].starts_with("       NIFTY_IT"));
    }
}
