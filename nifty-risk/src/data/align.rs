//! Calendar alignment of price series and flows.
//!
//! The shared calendar is the union of all price dates (outer join). How
//! missing sessions are treated is governed by [`FillPolicy`]; the choice
//! shapes every downstream statistic, so it is always explicit:
//!
//! - `ForwardFill { limit }`: a missing close repeats the last observed
//!   close of that series for at most `limit` consecutive sessions. Leading
//!   gaps are never back-filled. A filled session carries a zero return.
//! - `Drop`: sessions where the benchmark or any sector is missing are
//!   removed from the calendar.
//!
//! Flows are joined onto the price calendar and never filled; flow-only
//! dates (e.g. weekend reporting) are ignored.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::loader::{DataIntegrityError, LoaderResult, RawInputs};
use super::types::{InvestorClass, PriceSeries};

/// Missing-session policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillPolicy {
    /// Carry the last close forward for up to `limit` sessions.
    ForwardFill { limit: usize },
    /// Remove sessions with any missing close.
    Drop,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self::ForwardFill { limit: 5 }
    }
}

/// Alignment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Name of the benchmark series.
    pub benchmark: String,
    pub fill_policy: FillPolicy,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            benchmark: "NIFTY_50".to_string(),
            fill_policy: FillPolicy::default(),
        }
    }
}

/// A close column aligned to the panel calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    pub name: String,
    pub closes: Vec<Option<f64>>,
}

/// Date-aligned closes and flows on a single shared calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPanel {
    pub dates: Vec<NaiveDate>,
    pub benchmark: AlignedSeries,
    /// Non-benchmark series, sorted by name.
    pub sectors: Vec<AlignedSeries>,
    /// Net flow per investor class (only classes present in the input).
    pub flows: BTreeMap<InvestorClass, Vec<Option<f64>>>,
    /// Cells filled by forward-fill.
    pub filled_cells: usize,
    /// Sessions removed by the drop policy.
    pub dropped_rows: usize,
}

impl AlignedPanel {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn sector(&self, name: &str) -> Option<&AlignedSeries> {
        self.sectors.iter().find(|s| s.name == name)
    }

    /// Benchmark first, then sectors.
    pub fn all_series(&self) -> impl Iterator<Item = &AlignedSeries> {
        std::iter::once(&self.benchmark).chain(self.sectors.iter())
    }

    pub fn flow(&self, class: InvestorClass) -> Option<&[Option<f64>]> {
        self.flows.get(&class).map(|v| v.as_slice())
    }
}

/// Align raw inputs onto one calendar.
///
/// Fails if the benchmark is missing, any sector shares no date with it,
/// or a loaded flow class matches no session of the calendar.
pub fn align(inputs: &RawInputs, config: &AlignmentConfig) -> LoaderResult<AlignedPanel> {
    let benchmark = inputs
        .series(&config.benchmark)
        .ok_or_else(|| DataIntegrityError::MissingBenchmark(config.benchmark.clone()))?;

    let benchmark_dates: BTreeSet<NaiveDate> = benchmark.dates().collect();
    let sectors: Vec<&PriceSeries> = inputs
        .prices
        .iter()
        .filter(|s| s.sector != config.benchmark)
        .collect();

    for sector in &sectors {
        if !sector.dates().any(|d| benchmark_dates.contains(&d)) {
            return Err(DataIntegrityError::NoOverlap {
                sector: sector.sector.clone(),
                benchmark: config.benchmark.clone(),
            });
        }
    }

    let calendar: Vec<NaiveDate> = inputs
        .prices
        .iter()
        .flat_map(|s| s.dates())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let raw = |series: &PriceSeries| AlignedSeries {
        name: series.sector.clone(),
        closes: calendar.iter().map(|d| series.close_on(*d)).collect(),
    };

    let mut bench = raw(benchmark);
    let mut sector_cols: Vec<AlignedSeries> = sectors.iter().map(|&s| raw(s)).collect();
    sector_cols.sort_by(|a, b| a.name.cmp(&b.name));

    let mut dates = calendar;
    let mut filled_cells = 0;
    let mut dropped_rows = 0;

    match config.fill_policy {
        FillPolicy::ForwardFill { limit } => {
            filled_cells += forward_fill(&mut bench.closes, limit);
            for col in &mut sector_cols {
                filled_cells += forward_fill(&mut col.closes, limit);
            }
        }
        FillPolicy::Drop => {
            let keep: Vec<bool> = (0..dates.len())
                .map(|i| bench.closes[i].is_some() && sector_cols.iter().all(|c| c.closes[i].is_some()))
                .collect();
            dropped_rows = keep.iter().filter(|k| !**k).count();

            dates = retain_by(&dates, &keep);
            bench.closes = retain_by(&bench.closes, &keep);
            for col in &mut sector_cols {
                col.closes = retain_by(&col.closes, &keep);
            }
        }
    }

    if dates.is_empty() {
        return Err(DataIntegrityError::EmptyInput(
            "aligned calendar has no sessions".to_string(),
        ));
    }

    let flows: BTreeMap<InvestorClass, Vec<Option<f64>>> = inputs
        .flows
        .classes()
        .into_iter()
        .map(|class| (class, inputs.flows.aligned(class, &dates)))
        .collect();

    for (class, values) in &flows {
        let matched = values.iter().filter(|v| v.is_some()).count();
        debug!(class = class.as_str(), matched, sessions = dates.len(), "joined flows");
        if matched == 0 {
            return Err(DataIntegrityError::NoFlowOverlap {
                column: class.net_column(),
                first: dates[0],
                last: dates[dates.len() - 1],
            });
        }
    }

    info!(
        sessions = dates.len(),
        sectors = sector_cols.len(),
        filled_cells,
        dropped_rows,
        policy = ?config.fill_policy,
        "aligned trading calendar"
    );

    Ok(AlignedPanel {
        dates,
        benchmark: bench,
        sectors: sector_cols,
        flows,
        filled_cells,
        dropped_rows,
    })
}

/// Forward-fill gaps of at most `limit` consecutive sessions.
///
/// Returns the number of filled cells. Gaps longer than `limit` are filled
/// only for their first `limit` sessions.
pub fn forward_fill(values: &mut [Option<f64>], limit: usize) -> usize {
    let mut last: Option<f64> = None;
    let mut run = 0;
    let mut filled = 0;

    for v in values.iter_mut() {
        match v {
            Some(x) => {
                last = Some(*x);
                run = 0;
            }
            None => {
                run += 1;
                if run <= limit {
                    if let Some(prev) = last {
                        *v = Some(prev);
                        filled += 1;
                    }
                }
            }
        }
    }
    filled
}

fn retain_by<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(v, _)| v.clone())
        .collect()
}
