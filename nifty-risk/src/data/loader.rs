//! Data loader for sector price and institutional flow CSV files.
//!
//! Loads raw exports into the type system before calendar alignment.
//!
//! Price inputs come in one of two layouts:
//! - a long file with one row per (date, sector): `date, sector, close_price`
//! - a directory of per-index files (`NIFTY_BANK.csv`, ...) each with a
//!   date column and a close column; the file stem names the series
//!
//! Flow inputs are either long (`date, investor_class, net_flow`) or the
//! wide NSE "FII/DII trading activity" export with buy/sell/net columns
//! per investor class.
//!
//! Every cell is read as text and parsed by [`super::parse`]. Rows that
//! fail to parse are skipped with a warning; structural problems (missing
//! file, empty file, missing column) are fatal.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::parse::{parse_date, parse_number};
use super::types::{FlowRecord, FlowTable, InvestorClass, PricePoint, PriceSeries};

/// Required columns of the long price layout.
pub const PRICE_COLUMNS: &[&str] = &["date", "sector", "close_price"];

/// Required columns of the long flow layout.
pub const FLOW_COLUMNS: &[&str] = &["date", "investor_class", "net_flow"];

#[derive(Error, Debug)]
pub enum DataIntegrityError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No usable data in {0}")]
    EmptyInput(String),

    #[error("Missing column '{column}' in {file}")]
    MissingColumn { file: String, column: String },

    #[error("Benchmark series '{0}' not found in price data")]
    MissingBenchmark(String),

    #[error("Series {sector} has no dates overlapping benchmark {benchmark}")]
    NoOverlap { sector: String, benchmark: String },

    #[error("Flow column {column} has no dates on the price calendar ({first} to {last})")]
    NoFlowOverlap { column: String, first: NaiveDate, last: NaiveDate },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LoaderResult<T> = Result<T, DataIntegrityError>;

/// Loader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// File name prefix for the per-index directory layout.
    pub file_prefix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            file_prefix: "NIFTY_".to_string(),
        }
    }
}

/// Row accounting for one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub price_rows: usize,
    pub flow_rows: usize,
    /// Rows skipped because a cell could not be parsed.
    pub skipped_rows: usize,
    /// Rows replaced by a later row with the same key.
    pub duplicate_rows: usize,
}

/// Everything read from disk for one pipeline run.
#[derive(Debug, Clone)]
pub struct RawInputs {
    /// One series per index, sorted by name.
    pub prices: Vec<PriceSeries>,
    pub flows: FlowTable,
    pub stats: LoadStats,
}

impl RawInputs {
    pub fn series(&self, name: &str) -> Option<&PriceSeries> {
        self.prices.iter().find(|s| s.sector == name)
    }
}

/// CSV loader for price and flow exports.
pub struct DataLoader {
    config: LoaderConfig,
}

impl DataLoader {
    /// Create a new loader.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load prices and (optionally) flows.
    pub fn load(&self, prices: &Path, flows: Option<&Path>) -> LoaderResult<RawInputs> {
        let mut stats = LoadStats::default();

        let prices = self.load_prices(prices, &mut stats)?;
        let flows = match flows {
            Some(path) => self.load_flows(path, &mut stats)?,
            None => FlowTable::default(),
        };

        info!(
            series = prices.len(),
            price_rows = stats.price_rows,
            flow_rows = stats.flow_rows,
            skipped = stats.skipped_rows,
            duplicates = stats.duplicate_rows,
            "loaded raw inputs"
        );

        Ok(RawInputs {
            prices,
            flows,
            stats,
        })
    }

    /// Load price series from a long CSV file or a per-index directory.
    pub fn load_prices(&self, path: &Path, stats: &mut LoadStats) -> LoaderResult<Vec<PriceSeries>> {
        if path.is_dir() {
            self.load_price_dir(path, stats)
        } else {
            self.load_price_file(path, stats)
        }
    }

    /// Load the long `date, sector, close_price` layout.
    pub fn load_price_file(&self, path: &Path, stats: &mut LoadStats) -> LoaderResult<Vec<PriceSeries>> {
        let df = read_raw_csv(path)?;
        let file = path.display().to_string();

        let date_col = require_column(&df, &file, "date", |c| c == "date")?;
        let sector_col = require_column(&df, &file, "sector", |c| c == "sector")?;
        let close_col = require_column(&df, &file, "close_price", |c| {
            c == "close_price" || c == "close"
        })?;

        let dates = df.column(&date_col)?.str()?;
        let sectors = df.column(&sector_col)?.str()?;
        let closes = df.column(&close_col)?.str()?;

        let mut grouped: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();

        for (idx, ((date, sector), close)) in dates
            .into_iter()
            .zip(sectors.into_iter())
            .zip(closes.into_iter())
            .enumerate()
        {
            let sector = sector.map(str::trim).filter(|s| !s.is_empty());
            match (sector, date.and_then(parse_date), close.and_then(parse_number)) {
                (Some(sector), Some(date), Some(close)) => {
                    grouped
                        .entry(sector.to_string())
                        .or_default()
                        .push(PricePoint { date, close });
                }
                _ => {
                    warn!(file = %file, row = idx + 1, ?date, ?sector, ?close, "skipping malformed price row");
                    stats.skipped_rows += 1;
                }
            }
        }

        let series = collect_series(grouped, stats);
        if series.is_empty() {
            return Err(DataIntegrityError::EmptyInput(file));
        }
        Ok(series)
    }

    /// Load a directory of per-index files (`<prefix>*.csv`).
    pub fn load_price_dir(&self, dir: &Path, stats: &mut LoadStats) -> LoaderResult<Vec<PriceSeries>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.starts_with(&self.config.file_prefix) && name.ends_with(".csv") {
                files.push(entry.path());
            }
        }
        files.sort();

        debug!(dir = %dir.display(), files = files.len(), "scanning price directory");

        let mut grouped: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();

        for path in files {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            let df = match read_raw_csv(&path) {
                Ok(df) => df,
                Err(DataIntegrityError::EmptyInput(file)) => {
                    warn!(file = %file, "skipping empty price file");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (Some(date_col), Some(close_col)) = (
                find_column(&df, |c| c.contains("date")),
                find_column(&df, |c| c.contains("close")),
            ) else {
                warn!(file = %path.display(), "no date/close column, skipping file");
                continue;
            };

            let dates = df.column(&date_col)?.str()?;
            let closes = df.column(&close_col)?.str()?;
            let points = grouped.entry(name.clone()).or_default();

            for (idx, (date, close)) in dates.into_iter().zip(closes.into_iter()).enumerate() {
                match (date.and_then(parse_date), close.and_then(parse_number)) {
                    (Some(date), Some(close)) => points.push(PricePoint { date, close }),
                    _ => {
                        warn!(file = %path.display(), row = idx + 1, ?date, ?close, "skipping malformed price row");
                        stats.skipped_rows += 1;
                    }
                }
            }
        }

        let series = collect_series(grouped, stats);
        if series.is_empty() {
            return Err(DataIntegrityError::EmptyInput(dir.display().to_string()));
        }
        Ok(series)
    }

    /// Load flows from a long or wide (NSE export) file.
    pub fn load_flows(&self, path: &Path, stats: &mut LoadStats) -> LoaderResult<FlowTable> {
        let df = read_raw_csv(path)?;
        let file = path.display().to_string();

        let records = if find_column(&df, |c| c == "investor_class").is_some() {
            parse_long_flows(&df, &file, stats)?
        } else {
            parse_wide_flows(&df, &file, stats)?
        };

        if records.is_empty() {
            return Err(DataIntegrityError::EmptyInput(file));
        }

        let (table, duplicates) = FlowTable::from_records(records);
        if duplicates > 0 {
            warn!(file = %file, duplicates, "duplicate (date, investor_class) flow rows, keeping last");
        }
        stats.flow_rows += table.len();
        stats.duplicate_rows += duplicates;
        Ok(table)
    }
}

fn parse_long_flows(df: &DataFrame, file: &str, stats: &mut LoadStats) -> LoaderResult<Vec<FlowRecord>> {
    let date_col = require_column(df, file, "date", |c| c == "date")?;
    let class_col = require_column(df, file, "investor_class", |c| c == "investor_class")?;
    let net_col = require_column(df, file, "net_flow", |c| c == "net_flow")?;

    let dates = df.column(&date_col)?.str()?;
    let classes = df.column(&class_col)?.str()?;
    let nets = df.column(&net_col)?.str()?;

    let mut records = Vec::with_capacity(df.height());
    for (idx, ((date, class), net)) in dates
        .into_iter()
        .zip(classes.into_iter())
        .zip(nets.into_iter())
        .enumerate()
    {
        match (
            date.and_then(parse_date),
            class.and_then(InvestorClass::from_str),
            net.and_then(parse_number),
        ) {
            (Some(date), Some(investor_class), Some(net_flow)) => records.push(FlowRecord {
                date,
                investor_class,
                net_flow,
            }),
            _ => {
                warn!(file = %file, row = idx + 1, ?date, ?class, ?net, "skipping malformed flow row");
                stats.skipped_rows += 1;
            }
        }
    }
    Ok(records)
}

/// Parse the wide NSE layout: `Date, FII Buy, FII Sell, FII Net, DII ...`.
///
/// Net is taken from a net column when present, otherwise buy - sell.
fn parse_wide_flows(df: &DataFrame, file: &str, stats: &mut LoadStats) -> LoaderResult<Vec<FlowRecord>> {
    let date_col = require_column(df, file, "date", |c| c.contains("date"))?;
    let dates = df.column(&date_col)?.str()?;

    let mut per_class = Vec::new();
    for class in InvestorClass::ALL {
        let is_class = |c: &str| match class {
            InvestorClass::Fii => c.contains("fii") || c.contains("fpi"),
            InvestorClass::Dii => c.contains("dii"),
        };
        let net = find_column(df, |c| is_class(c) && c.contains("net"));
        let buy = find_column(df, |c| is_class(c) && c.contains("buy"));
        let sell = find_column(df, |c| is_class(c) && c.contains("sell"));

        match (net, buy, sell) {
            (Some(net), _, _) => per_class.push((class, df.column(&net)?.str()?, None)),
            (None, Some(buy), Some(sell)) => {
                per_class.push((class, df.column(&buy)?.str()?, Some(df.column(&sell)?.str()?)))
            }
            _ => debug!(file = %file, class = class.as_str(), "no flow columns for investor class"),
        }
    }

    if per_class.is_empty() {
        return Err(DataIntegrityError::MissingColumn {
            file: file.to_string(),
            column: "FII/DII net or buy/sell".to_string(),
        });
    }

    let mut records = Vec::with_capacity(df.height() * per_class.len());
    for idx in 0..df.height() {
        let Some(date) = dates.get(idx).and_then(parse_date) else {
            warn!(file = %file, row = idx + 1, raw = ?dates.get(idx), "skipping flow row with unparseable date");
            stats.skipped_rows += 1;
            continue;
        };

        for (class, primary, sell) in &per_class {
            let value = match sell {
                None => primary.get(idx).and_then(parse_number),
                Some(sell) => match (
                    primary.get(idx).and_then(parse_number),
                    sell.get(idx).and_then(parse_number),
                ) {
                    (Some(b), Some(s)) => Some(b - s),
                    _ => None,
                },
            };

            match value {
                Some(net_flow) => records.push(FlowRecord {
                    date,
                    investor_class: *class,
                    net_flow,
                }),
                None => debug!(file = %file, row = idx + 1, class = class.as_str(), "missing flow value"),
            }
        }
    }
    Ok(records)
}

/// Read a CSV with every column as text.
pub(crate) fn read_raw_csv(path: &Path) -> LoaderResult<DataFrame> {
    if !path.exists() {
        return Err(DataIntegrityError::FileNotFound(path.to_path_buf()));
    }
    if fs::metadata(path)?.len() == 0 {
        return Err(DataIntegrityError::EmptyInput(path.display().to_string()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    if df.height() == 0 {
        return Err(DataIntegrityError::EmptyInput(path.display().to_string()));
    }
    Ok(df)
}

/// Find the first column whose trimmed, lower-cased name matches.
fn find_column(df: &DataFrame, pred: impl Fn(&str) -> bool) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .find(|name| pred(&name.trim().to_lowercase()))
}

fn require_column(
    df: &DataFrame,
    file: &str,
    expected: &str,
    pred: impl Fn(&str) -> bool,
) -> LoaderResult<String> {
    find_column(df, pred).ok_or_else(|| DataIntegrityError::MissingColumn {
        file: file.to_string(),
        column: expected.to_string(),
    })
}

fn collect_series(grouped: BTreeMap<String, Vec<PricePoint>>, stats: &mut LoadStats) -> Vec<PriceSeries> {
    grouped
        .into_iter()
        .filter(|(_, points)| !points.is_empty())
        .map(|(name, points)| {
            let (series, duplicates) = PriceSeries::from_points(name, points);
            if duplicates > 0 {
                warn!(series = %series.sector, duplicates, "duplicate price dates, keeping last");
            }
            stats.price_rows += series.len();
            stats.duplicate_rows += duplicates;
            series
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_expected_columns() {
        assert_eq!(PRICE_COLUMNS, &["date", "sector", "close_price"]);
        assert_eq!(FLOW_COLUMNS, &["date", "investor_class", "net_flow"]);
    }

    #[test]
    fn test_load_long_prices_skips_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "prices.csv",
            "date,sector,close_price\n\
             2020-01-02,NIFTY_50,12282.2\n\
             2020-01-01,NIFTY_50,12182.5\n\
             garbage,NIFTY_50,12000\n\
             2020-01-01,NIFTY_IT,\"15,850.25\"\n\
             2020-01-02,NIFTY_IT,oops\n",
        );

        let loader = DataLoader::new(LoaderConfig::default());
        let mut stats = LoadStats::default();
        let series = loader.load_price_file(&path, &mut stats).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].sector, "NIFTY_50");
        assert_eq!(series[0].first_date(), Some(d(2020, 1, 1)));
        assert_eq!(series[1].close_on(d(2020, 1, 1)), Some(15850.25));
        assert_eq!(stats.skipped_rows, 2);
        assert_eq!(stats.price_rows, 3);
    }

    #[test]
    fn test_load_price_dir_layout() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "NIFTY_50.csv", "Date,Close\n2020-01-01,100\n2020-01-02,101\n");
        write_file(dir.path(), "NIFTY_BANK.csv", "Date,Adj Close\n2020-01-01,200\n2020-01-02,198\n");
        write_file(dir.path(), "notes.csv", "Date,Close\n2020-01-01,1\n");

        let loader = DataLoader::new(LoaderConfig::default());
        let mut stats = LoadStats::default();
        let series = loader.load_prices(dir.path(), &mut stats).unwrap();

        let names: Vec<_> = series.iter().map(|s| s.sector.as_str()).collect();
        assert_eq!(names, vec!["NIFTY_50", "NIFTY_BANK"]);
        assert_eq!(series[1].close_on(d(2020, 1, 2)), Some(198.0));
    }

    #[test]
    fn test_missing_file_is_integrity_error() {
        let loader = DataLoader::new(LoaderConfig::default());
        let err = loader
            .load(Path::new("/definitely/not/here.csv"), None)
            .unwrap_err();
        assert!(matches!(err, DataIntegrityError::FileNotFound(_)));
    }

    #[test]
    fn test_empty_file_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "prices.csv", "");
        let loader = DataLoader::new(LoaderConfig::default());
        let err = loader.load(&path, None).unwrap_err();
        assert!(matches!(err, DataIntegrityError::EmptyInput(_)));
    }

    #[test]
    fn test_missing_column_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "prices.csv", "date,close_price\n2020-01-01,1\n");
        let loader = DataLoader::new(LoaderConfig::default());
        let err = loader.load(&path, None).unwrap_err();
        assert!(matches!(err, DataIntegrityError::MissingColumn { .. }));
    }

    #[test]
    fn test_load_long_flows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "flows.csv",
            "date,investor_class,net_flow\n\
             2020-01-01,FII,-512.5\n\
             2020-01-01,DII,300\n\
             2020-01-02,retail,5\n",
        );

        let loader = DataLoader::new(LoaderConfig::default());
        let mut stats = LoadStats::default();
        let flows = loader.load_flows(&path, &mut stats).unwrap();

        assert_eq!(flows.len(), 2);
        assert_eq!(flows.get(d(2020, 1, 1), InvestorClass::Fii), Some(-512.5));
        assert_eq!(stats.skipped_rows, 1);
    }

    #[test]
    fn test_load_wide_nse_flows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "FiiDiiTradingactivity.csv",
            "Date,FII Buy,FII Sell,DII Buy,DII Sell,DII Net\n\
             02-01-2020,\"1,000.5\",\"1,200.5\",800,700,(25)\n\
             bad-date,1,1,1,1,1\n",
        );

        let loader = DataLoader::new(LoaderConfig::default());
        let mut stats = LoadStats::default();
        let flows = loader.load_flows(&path, &mut stats).unwrap();

        assert_eq!(flows.get(d(2020, 1, 2), InvestorClass::Fii), Some(-200.0));
        // explicit net column wins over buy - sell
        assert_eq!(flows.get(d(2020, 1, 2), InvestorClass::Dii), Some(-25.0));
        assert_eq!(stats.skipped_rows, 1);
    }
}
