//! Core pipeline engine.
//!
//! Runs the batch analysis:
//! 1. Load price and flow files
//! 2. Align onto one trading calendar (fill or drop per policy)
//! 3. Returns, horizon returns and rolling volatility per series
//! 4. Rolling beta and correlation of each sector against the benchmark
//! 5. Volatility regimes per series
//! 6. Lead-lag of each investor class against sector returns
//! 7. Composite risk score, drawdown, correlation matrix, momentum
//!
//! Everything is recomputed from the inputs on each run; the master table
//! is the only persisted output.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analytics::lead_lag::{LeadLagAnalyzer, LeadLagConfig, LeadLagReport};
use crate::analytics::momentum::{MomentumConfig, MomentumSnapshot};
use crate::data::align::{align, AlignedPanel, AlignedSeries, AlignmentConfig};
use crate::data::loader::{DataIntegrityError, DataLoader, LoadStats, LoaderConfig, RawInputs};
use crate::data::master::{write_csv_replacing, MasterTable};
use crate::data::types::InvestorClass;
use crate::metrics::beta::{BetaConfig, BetaEstimator};
use crate::metrics::correlation::{rolling_correlation, CorrelationMatrix};
use crate::metrics::drawdown::{analyze_drawdown, DrawdownAnalysis};
use crate::metrics::returns::{compute_returns, horizon_returns};
use crate::metrics::rolling::{RollingMetric, RollingSeries};
use crate::metrics::volatility::{VolatilityConfig, VolatilityEngine};
use crate::regime::classifier::{
    RegimeAnalysis, RegimeClassifier, RegimeClassifierConfig, RegimeLabel, ThresholdMethod,
};
use crate::regime::risk_score::{RiskScoreConfig, RiskScoreSeries, RiskScorer};
use crate::validation::data_integrity::IntegrityConfig;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data integrity error: {0}")]
    Integrity(#[from] DataIntegrityError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upper bound on the momentum lookback, in calendar days.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub alignment: AlignmentConfig,
    pub volatility: VolatilityConfig,
    /// Also sets the rolling correlation window.
    pub beta: BetaConfig,
    pub lead_lag: LeadLagConfig,
    pub regime: RegimeClassifierConfig,
    pub risk_score: RiskScoreConfig,
    pub momentum: MomentumConfig,
    pub integrity: IntegrityConfig,
}

impl PipelineConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no run could honour.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| -> Result<(), PipelineError> { Err(PipelineError::InvalidConfig(msg)) };

        if self.alignment.benchmark.trim().is_empty() {
            return invalid("alignment.benchmark is empty".to_string());
        }
        if self.volatility.windows.is_empty() {
            return invalid("volatility.windows is empty".to_string());
        }
        if let Some(w) = self.volatility.windows.iter().find(|w| **w < 2) {
            return invalid(format!("volatility window {} is below 2", w));
        }
        if self.volatility.periods_per_year <= 0.0 {
            return invalid("volatility.periods_per_year must be positive".to_string());
        }
        if let Some(max) = self.volatility.max_annualized_vol {
            if max <= 0.0 {
                return invalid(format!("volatility.max_annualized_vol must be positive (got {})", max));
            }
        }
        if self.beta.window < 2 {
            return invalid(format!("beta.window {} is below 2", self.beta.window));
        }
        if let Some((low, high)) = self.beta.bounds {
            if low >= high {
                return invalid(format!("beta.bounds need low < high (got {} / {})", low, high));
            }
        }
        for (name, epsilon) in [
            ("beta.epsilon", self.beta.epsilon),
            ("lead_lag.epsilon", self.lead_lag.epsilon),
            ("risk_score.epsilon", self.risk_score.epsilon),
        ] {
            if epsilon < 0.0 {
                return invalid(format!("{} must be non-negative (got {})", name, epsilon));
            }
        }
        if self.regime.window < 2 {
            return invalid(format!("regime.window {} is below 2", self.regime.window));
        }
        if self.risk_score.vol_window < 2 {
            return invalid(format!("risk_score.vol_window {} is below 2", self.risk_score.vol_window));
        }
        match self.regime.method {
            ThresholdMethod::Fixed { low, high } if low >= high => {
                return invalid(format!("fixed thresholds need low < high (got {} / {})", low, high));
            }
            ThresholdMethod::Quantile { low, high } if !(0.0 < low && low < high && high < 1.0) => {
                return invalid(format!("quantile thresholds need 0 < low < high < 1 (got {} / {})", low, high));
            }
            _ => {}
        }
        if self.regime.persistence_band < 0.0 {
            return invalid("regime.persistence_band must be non-negative".to_string());
        }
        if self.risk_score.low >= self.risk_score.high {
            return invalid("risk_score.low must be below risk_score.high".to_string());
        }
        if self.lead_lag.min_observations < 3 {
            return invalid("lead_lag.min_observations must be at least 3".to_string());
        }
        if self.momentum.horizon_sessions == 0 {
            return invalid("momentum.horizon_sessions must be positive".to_string());
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.momentum.lookback_days) {
            return invalid(format!(
                "momentum.lookback_days must be in 1..={} (got {})",
                MAX_LOOKBACK_DAYS, self.momentum.lookback_days
            ));
        }
        Ok(())
    }
}

/// A near-zero variance in a rolling window or z-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericDegeneracyWarning {
    pub series: String,
    /// Metric name, e.g. `Beta_30d` or `risk_score`.
    pub metric: String,
    pub window: Option<usize>,
    pub date: Option<NaiveDate>,
}

/// Derived series for one index.
#[derive(Debug, Clone)]
pub struct SeriesMetrics {
    pub name: String,
    pub is_benchmark: bool,
    pub closes: Vec<Option<f64>>,
    pub returns: Vec<Option<f64>>,
    pub horizon_returns: Vec<Option<f64>>,
    /// One per configured window, in config order.
    pub volatility: Vec<RollingSeries>,
    /// Sectors only.
    pub beta: Option<RollingSeries>,
    /// Sectors only.
    pub correlation: Option<RollingSeries>,
    pub regime: RegimeAnalysis,
}

impl SeriesMetrics {
    pub fn volatility_at(&self, window: usize) -> Option<&RollingSeries> {
        self.volatility.iter().find(|v| v.window == window)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Configuration used.
    pub config: PipelineConfig,
    pub panel: AlignedPanel,
    /// Benchmark first, then sectors sorted by name.
    pub series: Vec<SeriesMetrics>,
    pub lead_lag: Vec<LeadLagReport>,
    pub risk_score: RiskScoreSeries,
    pub drawdown: DrawdownAnalysis,
    pub correlation_matrix: CorrelationMatrix,
    pub momentum: Option<MomentumSnapshot>,
    pub warnings: Vec<NumericDegeneracyWarning>,
    pub load_stats: LoadStats,
}

impl PipelineResult {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.panel.dates
    }

    pub fn benchmark(&self) -> &SeriesMetrics {
        &self.series[0]
    }

    pub fn sectors(&self) -> &[SeriesMetrics] {
        &self.series[1..]
    }

    pub fn series(&self, name: &str) -> Option<&SeriesMetrics> {
        self.series.iter().find(|s| s.name == name)
    }

    /// Momentum snapshot at another as-of date.
    pub fn momentum_at(&self, as_of: Option<NaiveDate>) -> Option<MomentumSnapshot> {
        MomentumSnapshot::compute(&self.panel, as_of, self.config.momentum.lookback_days)
    }

    /// Volatility and beta values cleared by the plausibility bounds.
    pub fn masked_count(&self) -> usize {
        self.series
            .iter()
            .flat_map(|s| s.volatility.iter().chain(s.beta.iter()))
            .map(|r| r.masked.len())
            .sum()
    }

    /// Every labelled (date, series, regime).
    pub fn regime_labels(&self) -> Vec<RegimeLabel> {
        self.series
            .iter()
            .flat_map(|s| s.regime.records(&self.panel.dates))
            .collect()
    }

    /// Every defined rolling value (volatility, beta, correlation).
    pub fn rolling_metrics(&self) -> Vec<RollingMetric> {
        self.series
            .iter()
            .flat_map(|s| s.volatility.iter().chain(s.beta.as_ref()).chain(s.correlation.as_ref()))
            .flat_map(|r| r.records(&self.panel.dates))
            .collect()
    }

    /// Build the date-aligned master table.
    pub fn master_table(&self) -> MasterTable {
        let mut table = MasterTable::new(self.panel.dates.clone());
        let horizon = self.config.momentum.horizon_sessions;

        for s in &self.series {
            table.push_numeric(format!("{}_Close", s.name), s.closes.clone());
            table.push_numeric(format!("{}_Return", s.name), s.returns.clone());
            table.push_numeric(format!("{}_{}dRet", s.name, horizon), s.horizon_returns.clone());
            for vol in &s.volatility {
                table.push_numeric(vol.column_name(), vol.values.clone());
            }
            for rolling in s.beta.iter().chain(s.correlation.iter()) {
                table.push_numeric(rolling.column_name(), rolling.values.clone());
            }
            table.push_labels(
                format!("{}_Regime", s.name),
                s.regime.labels.iter().map(|l| l.map(|r| r.as_str().to_string())).collect(),
            );
        }

        for (class, values) in &self.panel.flows {
            table.push_numeric(class.net_column(), values.clone());
        }

        table.push_numeric("Risk_Score", self.risk_score.scores.clone());
        table.push_labels(
            "Risk_Regime",
            self.risk_score.regimes.iter().map(|r| r.map(|r| r.as_str().to_string())).collect(),
        );

        table
    }

    /// Write the master CSV.
    pub fn write_master_csv(&self, path: &Path) -> Result<(), PipelineError> {
        self.master_table().write_csv(path)?;
        Ok(())
    }

    /// Write every lead-lag coefficient as CSV.
    pub fn write_lead_lag_csv(&self, path: &Path) -> Result<(), PipelineError> {
        let rows: Vec<(&LeadLagReport, _)> = self
            .lead_lag
            .iter()
            .flat_map(|r| r.profile.iter().map(move |c| (r, c)))
            .collect();

        let sectors: Vec<&str> = rows.iter().map(|(r, _)| r.sector.as_str()).collect();
        let classes: Vec<&str> = rows.iter().map(|(r, _)| r.investor_class.as_str()).collect();
        let lags: Vec<i64> = rows.iter().map(|(_, c)| c.lag).collect();
        let corr: Vec<Option<f64>> = rows.iter().map(|(_, c)| c.correlation).collect();
        let obs: Vec<u64> = rows.iter().map(|(_, c)| c.observations as u64).collect();
        let p: Vec<Option<f64>> = rows.iter().map(|(_, c)| c.p_value).collect();

        let mut df = DataFrame::new(vec![
            Column::new("sector".into(), sectors),
            Column::new("investor_class".into(), classes),
            Column::new("lag".into(), lags),
            Column::new("correlation".into(), corr),
            Column::new("observations".into(), obs),
            Column::new("p_value".into(), p),
        ])?;

        write_csv_replacing(&mut df, path)?;

        info!(path = %path.display(), rows = df.height(), "wrote lead-lag table");
        Ok(())
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let dates = self.dates();
        let bench = self.benchmark();
        let vol_window = self.config.regime.window;

        let mut out = format!(
            "Pipeline Results ({} to {})\n\
             ----------------------------------------\n\
             Sessions: {} ({} filled cells, {} dropped rows)\n\
             Series: {} ({} sectors)\n\
             Flow classes: {}\n\
             Skipped rows: {}, duplicates: {}\n\
             \n\
             Benchmark {} max drawdown: {:.2}% ({} to {})\n",
            fmt_date(dates.first().copied()),
            fmt_date(dates.last().copied()),
            dates.len(),
            self.panel.filled_cells,
            self.panel.dropped_rows,
            self.series.len(),
            self.sectors().len(),
            self.panel
                .flows
                .keys()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.load_stats.skipped_rows,
            self.load_stats.duplicate_rows,
            bench.name,
            self.drawdown.max_drawdown_pct,
            fmt_date(self.drawdown.peak_date),
            fmt_date(self.drawdown.trough_date),
        );

        out.push_str(&format!("\nLatest volatility regime ({}d):\n", vol_window));
        for s in &self.series {
            let latest = s
                .regime
                .labels
                .iter()
                .rev()
                .flatten()
                .next()
                .map(|r| r.as_str())
                .unwrap_or("-");
            let beta = s
                .beta
                .as_ref()
                .and_then(|b| b.values.iter().rev().flatten().next().copied())
                .map(|b| format!("beta {:.2}", b))
                .unwrap_or_default();
            out.push_str(&format!(
                "  {:<20} {:<7} transitions {:<4} {}\n",
                s.name,
                latest,
                s.regime.transitions.len(),
                beta
            ));
        }

        match self.risk_score.latest() {
            Some((i, score, regime)) => out.push_str(&format!(
                "\nRisk score on {}: {:.1} ({})\n",
                dates[i],
                score,
                regime.as_str()
            )),
            None => out.push_str("\nRisk score: undefined\n"),
        }

        if !self.lead_lag.is_empty() {
            out.push_str("\nLead-lag peaks:\n");
            for report in &self.lead_lag {
                out.push_str(&format!("  {}\n", report.summary()));
            }
        }

        if !self.warnings.is_empty() {
            out.push_str(&format!("\nNumeric degeneracy warnings: {}\n", self.warnings.len()));
        }
        let masked = self.masked_count();
        if masked > 0 {
            out.push_str(&format!("Out-of-range values masked: {}\n", masked));
        }

        out
    }
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

/// The batch analysis engine.
pub struct PipelineEngine {
    config: PipelineConfig,
}

impl PipelineEngine {
    /// Create an engine, rejecting invalid configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load inputs from disk and run.
    pub fn run_files(&self, prices: &Path, flows: Option<&Path>) -> Result<PipelineResult, PipelineError> {
        let inputs = DataLoader::new(self.config.loader.clone()).load(prices, flows)?;
        self.run(&inputs)
    }

    /// Run on already-loaded inputs.
    pub fn run(&self, inputs: &RawInputs) -> Result<PipelineResult, PipelineError> {
        let panel = align(inputs, &self.config.alignment)?;
        let dates = panel.dates.clone();

        let vol_engine = VolatilityEngine::new(self.config.volatility.clone());
        let beta_estimator = BetaEstimator::new(self.config.beta.clone());
        let return_kind = self.config.volatility.return_kind;

        let bench_returns = compute_returns(&panel.benchmark.closes, return_kind);

        let mut series = Vec::with_capacity(panel.sectors.len() + 1);
        for (aligned, is_benchmark) in
            std::iter::once((&panel.benchmark, true)).chain(panel.sectors.iter().map(|s| (s, false)))
        {
            let metrics = self.series_metrics(aligned, is_benchmark, &bench_returns, &vol_engine, &beta_estimator, &dates);
            series.push(metrics);
        }

        let lead_lag = self.lead_lag(&panel, &series);

        let bench = &series[0];
        let bench_vol = volatility_for(
            &bench.volatility,
            &vol_engine,
            &bench.name,
            &bench.returns,
            self.config.risk_score.vol_window,
        );
        let risk_score = RiskScorer::new(self.config.risk_score.clone())
            .score(&bench_vol, panel.flow(InvestorClass::Fii));

        let drawdown = analyze_drawdown(&dates, &panel.benchmark.closes);

        let named: Vec<(&str, &[Option<f64>])> = series
            .iter()
            .map(|s| (s.name.as_str(), s.returns.as_slice()))
            .collect();
        let correlation_matrix = CorrelationMatrix::compute(&named, self.config.beta.epsilon);

        let momentum = MomentumSnapshot::compute(&panel, None, self.config.momentum.lookback_days);

        let warnings = collect_warnings(&series, &lead_lag, &correlation_matrix, &risk_score, &dates);
        summarise_warnings(&warnings);
        log_masked(&series);

        info!(
            sessions = dates.len(),
            series = series.len(),
            lead_lag_reports = lead_lag.len(),
            warnings = warnings.len(),
            "pipeline complete"
        );

        Ok(PipelineResult {
            config: self.config.clone(),
            panel,
            series,
            lead_lag,
            risk_score,
            drawdown,
            correlation_matrix,
            momentum,
            warnings,
            load_stats: inputs.stats.clone(),
        })
    }

    fn series_metrics(
        &self,
        aligned: &AlignedSeries,
        is_benchmark: bool,
        bench_returns: &[Option<f64>],
        vol_engine: &VolatilityEngine,
        beta_estimator: &BetaEstimator,
        dates: &[NaiveDate],
    ) -> SeriesMetrics {
        let returns = compute_returns(&aligned.closes, self.config.volatility.return_kind);
        let horizon = horizon_returns(&aligned.closes, self.config.momentum.horizon_sessions);
        let volatility = vol_engine.volatility_surface(&aligned.name, &returns);

        let (beta, correlation) = if is_benchmark {
            (None, None)
        } else {
            (
                Some(beta_estimator.rolling_beta(&aligned.name, &returns, bench_returns)),
                Some(rolling_correlation(
                    &aligned.name,
                    &returns,
                    bench_returns,
                    self.config.beta.window,
                    self.config.beta.epsilon,
                )),
            )
        };

        let regime_vol = volatility_for(&volatility, vol_engine, &aligned.name, &returns, self.config.regime.window);
        let regime = RegimeClassifier::new(self.config.regime.clone()).analyze(&aligned.name, dates, &regime_vol);

        let metrics = SeriesMetrics {
            name: aligned.name.clone(),
            is_benchmark,
            closes: aligned.closes.clone(),
            returns,
            horizon_returns: horizon,
            volatility,
            beta,
            correlation,
            regime,
        };

        debug!(
            series = %metrics.name,
            defined_returns = metrics.returns.iter().flatten().count(),
            transitions = metrics.regime.transitions.len(),
            "computed series metrics"
        );
        metrics
    }

    fn lead_lag(&self, panel: &AlignedPanel, series: &[SeriesMetrics]) -> Vec<LeadLagReport> {
        let analyzer = LeadLagAnalyzer::new(self.config.lead_lag.clone());
        let wanted = &self.config.lead_lag.sectors;

        for name in wanted {
            if !series.iter().any(|s| &s.name == name) {
                warn!(sector = %name, "lead-lag sector not found in price data, skipping");
            }
        }

        let targets: Vec<&SeriesMetrics> = series
            .iter()
            .filter(|s| {
                if wanted.is_empty() {
                    !s.is_benchmark
                } else {
                    wanted.contains(&s.name)
                }
            })
            .collect();

        let mut reports = Vec::new();
        for (class, flow) in &panel.flows {
            for target in &targets {
                let report = analyzer.analyze(&target.name, *class, flow, &target.returns);
                debug!(summary = %report.summary(), "lead-lag");
                reports.push(report);
            }
        }
        reports
    }
}

/// Volatility at `window`, reusing the configured surface when possible.
fn volatility_for(
    surface: &[RollingSeries],
    vol_engine: &VolatilityEngine,
    name: &str,
    returns: &[Option<f64>],
    window: usize,
) -> Vec<Option<f64>> {
    match surface.iter().find(|v| v.window == window) {
        Some(v) => v.values.clone(),
        None => vol_engine.rolling_volatility(name, returns, window).values,
    }
}

fn collect_warnings(
    series: &[SeriesMetrics],
    lead_lag: &[LeadLagReport],
    correlation_matrix: &CorrelationMatrix,
    risk_score: &RiskScoreSeries,
    dates: &[NaiveDate],
) -> Vec<NumericDegeneracyWarning> {
    let mut warnings = Vec::new();

    for s in series {
        for rolling in s.volatility.iter().chain(s.beta.iter()).chain(s.correlation.iter()) {
            for &idx in &rolling.degenerate {
                warnings.push(NumericDegeneracyWarning {
                    series: s.name.clone(),
                    metric: format!("{}_{}d", rolling.kind.tag(), rolling.window),
                    window: Some(rolling.window),
                    date: dates.get(idx).copied(),
                });
            }
        }
    }

    for report in lead_lag {
        for _ in report.degenerate_lags() {
            warnings.push(NumericDegeneracyWarning {
                series: report.sector.clone(),
                metric: format!("LeadLag_{}", report.investor_class.as_str()),
                window: None,
                date: None,
            });
        }
    }

    for (a, b) in &correlation_matrix.degenerate {
        warnings.push(NumericDegeneracyWarning {
            series: format!("{}/{}", a, b),
            metric: "Corr_matrix".to_string(),
            window: None,
            date: None,
        });
    }

    for input in &risk_score.degenerate_inputs {
        warnings.push(NumericDegeneracyWarning {
            series: input.clone(),
            metric: "risk_score".to_string(),
            window: None,
            date: None,
        });
    }

    warnings
}

/// One warn! per rolling series with masked values.
fn log_masked(series: &[SeriesMetrics]) {
    for s in series {
        for rolling in s.volatility.iter().chain(s.beta.iter()) {
            if !rolling.masked.is_empty() {
                warn!(
                    series = %s.name,
                    metric = %format!("{}_{}d", rolling.kind.tag(), rolling.window),
                    count = rolling.masked.len(),
                    "out-of-range values masked"
                );
            }
        }
    }
}

/// One warn! per (series, metric).
fn summarise_warnings(warnings: &[NumericDegeneracyWarning]) {
    let mut grouped: BTreeMap<(&str, &str), (usize, Option<NaiveDate>)> = BTreeMap::new();
    for w in warnings {
        let entry = grouped.entry((w.series.as_str(), w.metric.as_str())).or_insert((0, w.date));
        entry.0 += 1;
    }
    for ((series, metric), (count, first)) in grouped {
        warn!(
            series,
            metric,
            count,
            first = %fmt_date(first),
            "near-zero variance, values left undefined"
        );
    }
}
