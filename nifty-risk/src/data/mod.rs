//! Data ingestion module.
//!
//! Loading, cleaning and calendar alignment of sector prices and
//! institutional flows, plus persistence of the master table.

pub mod align;
pub mod loader;
pub mod master;
pub mod parse;
pub mod types;

pub use align::{align, AlignedPanel, AlignedSeries, AlignmentConfig, FillPolicy};
pub use loader::{DataIntegrityError, DataLoader, LoadStats, LoaderConfig, LoaderResult, RawInputs};
pub use master::{write_csv_replacing, MasterColumn, MasterTable, MasterValues};
pub use types::{FlowRecord, FlowTable, InvestorClass, PricePoint, PriceSeries};
