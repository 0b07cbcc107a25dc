//! CSV dataset loading and column-schema handling
//!
//! Uploaded datasets are semicolon separated with a header row. The feature
//! list of a training run is every column except the target, stored as a
//! comma-joined string and checked against prediction uploads.

use std::collections::HashSet;
use std::io::Cursor;

use polars::prelude::*;

use crate::error::{AutoMlError, Result};

/// Separator used by uploaded training and prediction files.
pub const UPLOAD_SEPARATOR: u8 = b';';

/// Separator used when rendering a feature list for storage.
const STORED_SEPARATOR: char = ',';

/// A parsed CSV file
#[derive(Debug, Clone)]
pub struct CsvDataset {
    frame: DataFrame,
}

impl CsvDataset {
    /// Parse CSV bytes with a header row and the given separator.
    ///
    /// Every column is read as text; typing is left to the engine, so a
    /// value that changes kind deep in the file never fails the upload.
    pub fn from_bytes(bytes: &[u8], separator: u8) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(AutoMlError::Validation("CSV file is empty".to_string()));
        }

        let parse_opts = CsvParseOptions::default().with_separator(separator);

        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()?;

        if frame.width() == 0 {
            return Err(AutoMlError::Validation("CSV file has no columns".to_string()));
        }

        Ok(Self { frame })
    }

    /// Parse an uploaded (semicolon separated) file
    pub fn from_upload(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes, UPLOAD_SEPARATOR)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn rows(&self) -> usize {
        self.frame.height()
    }

    /// Column names in file order
    pub fn columns(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Every column except `target`, in file order
    pub fn feature_columns(&self, target: &str) -> Result<FeatureSchema> {
        let columns = self.columns();
        if !columns.iter().any(|c| c == target) {
            return Err(AutoMlError::Validation(format!(
                "Target column \"{}\" not found in dataset columns \"{}\"",
                target,
                columns.join(",")
            )));
        }

        let features: Vec<String> = columns.into_iter().filter(|c| c != target).collect();
        if features.is_empty() {
            return Err(AutoMlError::Validation(
                "Dataset has no feature columns besides the target".to_string(),
            ));
        }
        if let Some(bad) = features.iter().find(|c| c.contains(STORED_SEPARATOR)) {
            return Err(AutoMlError::Validation(format!(
                "Column name \"{}\" must not contain '{}'",
                bad, STORED_SEPARATOR
            )));
        }

        Ok(FeatureSchema::new(features))
    }
}

/// The independent variables a model was trained on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Read the comma-joined form kept on a training run
    pub fn parse(stored: &str) -> Self {
        let columns = stored
            .split(STORED_SEPARATOR)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Self { columns }
    }

    pub fn to_stored(&self) -> String {
        self.columns.join(&STORED_SEPARATOR.to_string())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Accept `received` only if it holds exactly the trained columns.
    ///
    /// Order is ignored; missing, unexpected and repeated columns are all
    /// reported as a [`AutoMlError::SchemaMismatch`].
    pub fn check(&self, received: &[String]) -> Result<()> {
        let expected: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let got: HashSet<&str> = received.iter().map(String::as_str).collect();

        if expected == got && received.len() == self.columns.len() {
            Ok(())
        } else {
            Err(AutoMlError::SchemaMismatch {
                expected: self.columns.clone(),
                received: received.to_vec(),
            })
        }
    }
}
