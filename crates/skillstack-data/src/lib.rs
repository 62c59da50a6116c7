//! skillstack-data — dataset ingestion.
//!
//! Loads essay feature rows from CSV into [`Record`]s, inferring a scalar
//! type per cell (integer, float, string, empty = null). The identifying
//! columns keep the source datasets' names: `cod_correcao_redacao` is the
//! record id, `cod_usuario` the sequence key, `dat_envio` the sequence
//! order. The two sequence columns are optional here; the pipeline
//! enforces them when sequential mode is requested.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use skillstack_core::model::{FieldValue, Record};

/// Column holding the essay/record identifier.
pub const RECORD_ID_COLUMN: &str = "cod_correcao_redacao";
/// Column holding the user identifier (sequence key).
pub const SEQUENCE_KEY_COLUMN: &str = "cod_usuario";
/// Column holding the submission ordinal (sequence order).
pub const SEQUENCE_ORDER_COLUMN: &str = "dat_envio";

/// Dataset ingestion failures. All are fatal and reported before any
/// simulation work begins.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("unsupported dataset format: {path} (use .csv)")]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to read dataset at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dataset: {source}")]
    Csv {
        #[source]
        source: csv::Error,
    },

    #[error("dataset is missing the required '{column}' column")]
    MissingColumn { column: String },
}

/// Load a CSV dataset from disk. Rejects any other extension up front.
pub fn load_csv(path: &Path) -> Result<Vec<Record>, DatasetError> {
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(DatasetError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let file = std::fs::File::open(path).map_err(|source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let records = from_reader(file)?;
    tracing::debug!(path = %path.display(), records = records.len(), "dataset loaded");
    Ok(records)
}

/// Parse CSV content into records. The header must contain the record id
/// column; sequence columns are picked up when present.
pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Record>, DatasetError> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|source| DatasetError::Csv { source })?
        .clone();

    let id_index = headers
        .iter()
        .position(|h| h == RECORD_ID_COLUMN)
        .ok_or_else(|| DatasetError::MissingColumn {
            column: RECORD_ID_COLUMN.to_string(),
        })?;
    let key_index = headers.iter().position(|h| h == SEQUENCE_KEY_COLUMN);
    let order_index = headers.iter().position(|h| h == SEQUENCE_ORDER_COLUMN);

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row.map_err(|source| DatasetError::Csv { source })?;

        let fields = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| (header.to_string(), infer_value(cell)))
            .collect();

        records.push(Record {
            id: row.get(id_index).unwrap_or_default().to_string(),
            sequence_key: key_index
                .and_then(|i| row.get(i))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sequence_order: order_index
                .and_then(|i| row.get(i))
                .filter(|s| !s.is_empty())
                .map(infer_value),
            fields,
        });
    }

    Ok(records)
}

/// Infer the scalar type of one CSV cell: integer, then float, then
/// string; an empty cell is null.
fn infer_value(cell: &str) -> FieldValue {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return FieldValue::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return FieldValue::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return FieldValue::Float(f);
    }
    FieldValue::Str(cell.to_string())
}
