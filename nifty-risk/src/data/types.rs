//! Core data types for sector price and institutional flow analysis.
//!
//! These types represent the raw inputs of the pipeline: one close-price
//! series per index (benchmark or sector) and daily net flows per
//! investor class.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Institutional investor class (FII or DII).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvestorClass {
    /// Foreign institutional investors (FII/FPI).
    Fii,
    /// Domestic institutional investors.
    Dii,
}

impl InvestorClass {
    pub const ALL: [InvestorClass; 2] = [InvestorClass::Fii, InvestorClass::Dii];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "FII" | "FPI" | "FII/FPI" | "FII_FPI" => Some(Self::Fii),
            "DII" => Some(Self::Dii),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fii => "FII",
            Self::Dii => "DII",
        }
    }

    /// Column name used for this class in the master table.
    pub fn net_column(&self) -> String {
        format!("{}_Net", self.as_str())
    }
}

/// A single close observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Close-price history for one index.
///
/// Dates are strictly increasing with no duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    /// Series identifier (e.g., "NIFTY_BANK")
    pub sector: String,

    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from points in any order.
    ///
    /// Returns the series and the number of duplicate dates that were
    /// collapsed. The last occurrence of a date wins.
    pub fn from_points(sector: impl Into<String>, points: Vec<PricePoint>) -> (Self, usize) {
        let total = points.len();
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for p in points {
            by_date.insert(p.date, p.close);
        }
        let duplicates = total - by_date.len();

        let points = by_date
            .into_iter()
            .map(|(date, close)| PricePoint { date, close })
            .collect();

        (
            Self {
                sector: sector.into(),
                points,
            },
            duplicates,
        )
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Close on an exact date.
    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].close)
    }
}

/// One day of net institutional flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub date: NaiveDate,
    pub investor_class: InvestorClass,
    /// Net buy minus sell (INR crore in NSE reports)
    pub net_flow: f64,
}

/// Flow records keyed by (date, investor class).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowTable {
    records: BTreeMap<(NaiveDate, InvestorClass), f64>,
}

impl FlowTable {
    /// Build a table from records; later duplicates replace earlier ones.
    ///
    /// Returns the table and the number of replaced duplicates.
    pub fn from_records(records: Vec<FlowRecord>) -> (Self, usize) {
        let total = records.len();
        let mut map = BTreeMap::new();
        for r in records {
            map.insert((r.date, r.investor_class), r.net_flow);
        }
        let duplicates = total - map.len();
        (Self { records: map }, duplicates)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, date: NaiveDate, class: InvestorClass) -> Option<f64> {
        self.records.get(&(date, class)).copied()
    }

    /// Investor classes with at least one record.
    pub fn classes(&self) -> Vec<InvestorClass> {
        InvestorClass::ALL
            .into_iter()
            .filter(|c| self.records.keys().any(|(_, class)| class == c))
            .collect()
    }

    /// Flow values aligned to a date index (`None` where absent).
    pub fn aligned(&self, class: InvestorClass, dates: &[NaiveDate]) -> Vec<Option<f64>> {
        dates.iter().map(|d| self.get(*d, class)).collect()
    }

    pub fn records(&self) -> impl Iterator<Item = FlowRecord> + '_ {
        self.records
            .iter()
            .map(|(&(date, investor_class), &net_flow)| FlowRecord {
                date,
                investor_class,
                net_flow,
            })
    }
}
