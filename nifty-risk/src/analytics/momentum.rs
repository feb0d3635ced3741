//! Sector momentum snapshot.
//!
//! Compares each series between the session nearest an as-of date and the
//! session nearest `lookback_days` calendar days earlier.

use std::cmp::Ordering;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::align::AlignedPanel;

/// Momentum configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// Sessions in the `<S>_<h>dRet` master column.
    pub horizon_sessions: usize,
    /// Calendar days covered by the snapshot.
    pub lookback_days: i64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            horizon_sessions: 30,
            lookback_days: 30,
        }
    }
}

/// Return of one series over the snapshot window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorMomentum {
    pub name: String,
    pub return_pct: Option<f64>,
}

/// Ranked momentum at an as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumSnapshot {
    pub as_of: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub benchmark: SectorMomentum,
    /// Sectors by descending return; undefined returns last.
    pub ranked: Vec<SectorMomentum>,
}

impl MomentumSnapshot {
    /// Build a snapshot. `as_of` defaults to the last session.
    ///
    /// `None` for an empty panel or a lookback that is not positive or
    /// leaves the representable date range.
    pub fn compute(panel: &AlignedPanel, as_of: Option<NaiveDate>, lookback_days: i64) -> Option<Self> {
        if lookback_days <= 0 {
            return None;
        }
        let as_of = as_of.or_else(|| panel.dates.last().copied())?;
        let end = nearest_index(&panel.dates, as_of)?;
        let from = as_of.checked_sub_signed(Duration::try_days(lookback_days)?)?;
        let start = nearest_index(&panel.dates, from)?;

        let momentum = |name: &str, closes: &[Option<f64>]| SectorMomentum {
            name: name.to_string(),
            return_pct: match (closes[start], closes[end]) {
                (Some(s), Some(e)) if s > 0.0 => Some((e - s) / s * 100.0),
                _ => None,
            },
        };

        let benchmark = momentum(&panel.benchmark.name, &panel.benchmark.closes);
        let mut ranked: Vec<SectorMomentum> = panel
            .sectors
            .iter()
            .map(|s| momentum(&s.name, &s.closes))
            .collect();
        ranked.sort_by(|a, b| match (a.return_pct, b.return_pct) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });

        Some(Self {
            as_of,
            start_date: panel.dates[start],
            end_date: panel.dates[end],
            benchmark,
            ranked,
        })
    }

    /// Sectors beating the benchmark.
    pub fn outperformers(&self) -> Vec<&SectorMomentum> {
        let Some(bench) = self.benchmark.return_pct else {
            return Vec::new();
        };
        self.ranked
            .iter()
            .filter(|s| s.return_pct.is_some_and(|r| r > bench))
            .collect()
    }
}

/// Index of the session closest to `target`; ties go to the earlier one.
pub fn nearest_index(dates: &[NaiveDate], target: NaiveDate) -> Option<usize> {
    dates
        .iter()
        .enumerate()
        .min_by_key(|(i, d)| ((**d - target).num_days().abs(), *i))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::align::AlignedSeries;
    use std::collections::BTreeMap;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn panel() -> AlignedPanel {
        AlignedPanel {
            dates: vec![d(10, 17), d(10, 20), d(11, 14), d(11, 18)],
            benchmark: AlignedSeries {
                name: "NIFTY_50".to_string(),
                closes: vec![Some(100.0), Some(101.0), Some(103.0), Some(104.0)],
            },
            sectors: vec![
                AlignedSeries {
                    name: "NIFTY_BANK".to_string(),
                    closes: vec![Some(50.0), Some(50.0), Some(52.0), Some(55.0)],
                },
                AlignedSeries {
                    name: "NIFTY_IT".to_string(),
                    closes: vec![Some(200.0), Some(198.0), Some(190.0), Some(196.0)],
                },
                AlignedSeries {
                    name: "NIFTY_METAL".to_string(),
                    closes: vec![None, Some(10.0), Some(10.0), Some(10.0)],
                },
            ],
            flows: BTreeMap::new(),
            filled_cells: 0,
            dropped_rows: 0,
        }
    }

    #[test]
    fn test_nearest_index() {
        let dates = vec![d(1, 1), d(1, 5), d(1, 9)];
        assert_eq!(nearest_index(&dates, d(1, 3)), Some(0));
        assert_eq!(nearest_index(&dates, d(1, 4)), Some(1));
        assert_eq!(nearest_index(&dates, d(2, 1)), Some(2));
        assert_eq!(nearest_index(&[], d(1, 1)), None);
    }

    #[test]
    fn test_snapshot_ranking() {
        let snap = MomentumSnapshot::compute(&panel(), None, 30).unwrap();

        assert_eq!(snap.end_date, d(11, 18));
        // as-of minus 30 days is 10-19, one day from 10-20
        assert_eq!(snap.start_date, d(10, 20));
        assert!((snap.benchmark.return_pct.unwrap() - 100.0 * 3.0 / 101.0).abs() < 1e-9);

        let names: Vec<&str> = snap.ranked.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["NIFTY_BANK", "NIFTY_METAL", "NIFTY_IT"]);
        assert_eq!(snap.outperformers().len(), 1);
    }

    #[test]
    fn test_snapshot_explicit_as_of() {
        let snap = MomentumSnapshot::compute(&panel(), Some(d(11, 15)), 30).unwrap();
        assert_eq!(snap.end_date, d(11, 14));
        assert_eq!(snap.start_date, d(10, 17));
        assert_eq!(snap.ranked.iter().find(|s| s.name == "NIFTY_METAL").unwrap().return_pct, None);
        assert_eq!(snap.ranked.last().unwrap().name, "NIFTY_METAL");
    }

    #[test]
    fn test_snapshot_rejects_bad_lookback() {
        assert_eq!(MomentumSnapshot::compute(&panel(), None, 0), None);
        assert_eq!(MomentumSnapshot::compute(&panel(), None, -30), None);
        assert_eq!(MomentumSnapshot::compute(&panel(), None, i64::MAX), None);
    }
}
