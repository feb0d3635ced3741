//! Master table: the single date-aligned output of a pipeline run.
//!
//! One row per session, a `date` column followed by numeric columns and
//! regime label columns. Undefined values are written as empty cells.
//! Writing goes through a temporary file in the target directory and a
//! rename, so a failed write never leaves a partial CSV behind.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::info;

use super::loader::{read_raw_csv, DataIntegrityError, LoaderResult};
use super::parse::{parse_date, parse_number};

/// Name of the date column.
pub const DATE_COLUMN: &str = "date";

/// Columns with this suffix hold regime labels rather than numbers.
pub const LABEL_SUFFIX: &str = "_Regime";

/// Values of one master column.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterValues {
    Numeric(Vec<Option<f64>>),
    Label(Vec<Option<String>>),
}

impl MasterValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Label(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasterColumn {
    pub name: String,
    pub values: MasterValues,
}

/// Date-aligned table of every derived series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterTable {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<MasterColumn>,
}

impl MasterTable {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn push_numeric(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.push(MasterColumn {
            name: name.into(),
            values: MasterValues::Numeric(values),
        });
    }

    pub fn push_labels(&mut self, name: impl Into<String>, values: Vec<Option<String>>) {
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.push(MasterColumn {
            name: name.into(),
            values: MasterValues::Label(values),
        });
    }

    pub fn column(&self, name: &str) -> Option<&MasterColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match &self.column(name)?.values {
            MasterValues::Numeric(v) => Some(v),
            MasterValues::Label(_) => None,
        }
    }

    pub fn labels(&self, name: &str) -> Option<&[Option<String>]> {
        match &self.column(name)?.values {
            MasterValues::Label(v) => Some(v),
            MasterValues::Numeric(_) => None,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(DATE_COLUMN)
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Convert to a polars frame (dates as ISO strings).
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut cols = Vec::with_capacity(self.columns.len() + 1);
        let dates: Vec<String> = self.dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();
        cols.push(Column::new(DATE_COLUMN.into(), dates));

        for col in &self.columns {
            let column = match &col.values {
                MasterValues::Numeric(v) => Column::new(col.name.as_str().into(), v.clone()),
                MasterValues::Label(v) => {
                    let refs: Vec<Option<&str>> = v.iter().map(|s| s.as_deref()).collect();
                    Column::new(col.name.as_str().into(), refs)
                }
            };
            cols.push(column);
        }

        DataFrame::new(cols)
    }

    /// Write the table as CSV, replacing `path` only on success.
    pub fn write_csv(&self, path: &Path) -> LoaderResult<()> {
        let mut df = self.to_dataframe()?;
        write_csv_replacing(&mut df, path)?;

        info!(
            path = %path.display(),
            rows = self.len(),
            columns = self.columns.len() + 1,
            "wrote master table"
        );
        Ok(())
    }

    /// Reload a table written by [`write_csv`](Self::write_csv).
    pub fn read_csv(path: &Path) -> LoaderResult<Self> {
        let df = read_raw_csv(path)?;
        let file = path.display().to_string();

        let date_col = df
            .column(DATE_COLUMN)
            .map_err(|_| DataIntegrityError::MissingColumn {
                file: file.clone(),
                column: DATE_COLUMN.to_string(),
            })?
            .str()?;

        let mut dates = Vec::with_capacity(df.height());
        for raw in date_col.into_iter() {
            let date = raw.and_then(parse_date).ok_or_else(|| {
                DataIntegrityError::EmptyInput(format!("{}: unparseable date {:?}", file, raw))
            })?;
            dates.push(date);
        }

        let mut table = Self::new(dates);
        for name in df.get_column_names() {
            let name = name.as_str();
            if name == DATE_COLUMN {
                continue;
            }
            let values = df.column(name)?.str()?;
            if name.ends_with(LABEL_SUFFIX) {
                let labels = values
                    .into_iter()
                    .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
                    .collect();
                table.push_labels(name, labels);
            } else {
                let numbers = values.into_iter().map(|v| v.and_then(parse_number)).collect();
                table.push_numeric(name, numbers);
            }
        }

        Ok(table)
    }
}

/// Write `df` as CSV to a sibling temp file, then rename it over `path`.
///
/// Parent directories are created. On failure the temp file is removed and
/// any existing `path` is left untouched.
pub fn write_csv_replacing(df: &mut DataFrame, path: &Path) -> LoaderResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let written = File::create(&tmp)
        .map_err(DataIntegrityError::from)
        .and_then(|mut file| {
            CsvWriter::new(&mut file)
                .include_header(true)
                .finish(df)
                .map_err(DataIntegrityError::from)
        });

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "master.csv".into());
    name.push(".tmp");
    path.with_file_name(name)
}
