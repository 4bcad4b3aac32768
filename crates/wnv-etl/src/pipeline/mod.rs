//! The pipeline stages, in run order.

pub mod analyze;
pub mod extract;
pub mod finalize;
pub mod load;
pub mod report;
pub mod transform;

pub use analyze::{AnalysisConfig, AnalysisStage, AnalysisSummary};
pub use extract::{ExtractConfig, ExtractSummary, Extractor, NetworkError};
pub use finalize::{FinalizePlan, FinalizeSummary, LayerStyle, MapFinalizer};
pub use load::{LoadConfig, LoadSummary, Loader};
pub use report::{ReportConfig, ReportSummary, TargetReport};
pub use transform::{full_address, TransformConfig, TransformSummary, Transformer};

use std::path::PathBuf;

pub const EXTRACTED_CSV: &str = "Opt_Out_Addresses.csv";
pub const TRANSFORMED_CSV: &str = "Opt_Out_Addresses_transformed.csv";
pub const TARGET_REPORT_CSV: &str = "Target_Addresses_Report.csv";
pub const MAP_PDF: &str = "West_Nile_Map.pdf";

pub const LATITUDE_COLUMN: &str = "latitude";
pub const LONGITUDE_COLUMN: &str = "longitude";

/// Problems with the CSV files passed between stages.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("{path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path} already has a '{column}' column")]
    DuplicateColumn { path: PathBuf, column: String },
    #[error("row {row}: invalid coordinate '{value}'")]
    InvalidCoordinate { row: usize, value: String },
}

pub(crate) fn strip_bom(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

/// Position of `column` in `headers`, ignoring ASCII case and a leading byte-order mark.
pub(crate) fn column_index(headers: &csv::StringRecord, column: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| strip_bom(header).eq_ignore_ascii_case(column.trim()))
}
