//! # Variable Table Ingestion
//!
//! This module is the exclusive entry point for user-provided data. It reads
//! a delimited text file whose first line holds variable names and whose
//! subsequent lines hold one case per row, validates every field, and
//! produces the clean `ndarray` structure the statistical core works on.
//!
//! - Flexible delimiters: fields may be separated by space, comma, or tab.
//!   The delimiter is sniffed from the header line and runs of spaces are
//!   collapsed, so column-aligned files load without preprocessing.
//! - User-centric errors: failures are assumed to be user-input errors. The
//!   `DataError` enum carries enough context (row, column name, offending
//!   value) for the user to fix the file.

use ndarray::{Array1, Array2};
use std::path::Path;
use thiserror::Error;

/// A named-column matrix of observations, loaded once per run and immutable
/// afterwards. Rows are cases, columns are variables.
#[derive(Debug)]
pub struct VariableTable {
    names: Vec<String>,
    values: Array2<f64>,
}

/// A comprehensive error type for all ingestion failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error from the underlying CSV reader: {0}")]
    Csv(#[from] csv::Error),
    #[error("The data file is empty")]
    EmptyFile,
    #[error("The data file has a header line but no data rows")]
    NoDataRows,
    #[error("Data row {row} has {found} fields but the header names {expected} variables")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("Field '{value}' in data row {row}, column '{column}' is not numeric")]
    NonNumericField {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Non-finite value (NaN or Infinity) in data row {row}, column '{column}'")]
    NonFiniteValue { row: usize, column: String },
    #[error("{names} variable names were given for a matrix with {columns} columns")]
    ShapeMismatch { names: usize, columns: usize },
}

/// Picks the field delimiter from the header line: the most frequent of tab
/// and comma wins, with space as the fallback.
fn sniff_delimiter(header: &str) -> u8 {
    let tabs = header.matches('\t').count();
    let commas = header.matches(',').count();
    if tabs >= commas && tabs > 0 {
        b'\t'
    } else if commas > 0 {
        b','
    } else {
        b' '
    }
}

impl VariableTable {
    /// Builds a table directly from names and a cases-by-variables matrix.
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self, DataError> {
        if names.len() != values.ncols() {
            return Err(DataError::ShapeMismatch {
                names: names.len(),
                columns: values.ncols(),
            });
        }
        Ok(Self { names, values })
    }

    /// Reads and validates a delimited text file. The first line must hold
    /// the variable names; every following non-blank line is one case.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        log::info!("Loading data from '{}'", path.display());
        let text = std::fs::read_to_string(path)?;
        let table = Self::parse(&text)?;
        log::info!(
            "Read {} cases of {} variables",
            table.ncases(),
            table.nvars()
        );
        Ok(table)
    }

    fn parse(text: &str) -> Result<Self, DataError> {
        let header = text.lines().next().ok_or(DataError::EmptyFile)?;
        let delimiter = sniff_delimiter(header);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut names: Vec<String> = Vec::new();
        let mut buffer: Vec<f64> = Vec::new();
        let mut ncases = 0usize;

        for record in reader.records() {
            let record = record?;
            // Runs of the delimiter (column-aligned space files) produce
            // empty fields; drop them so field counts reflect actual data.
            let fields: Vec<&str> = record
                .iter()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect();
            if fields.is_empty() {
                continue;
            }

            // The first non-blank record is the header line.
            if names.is_empty() {
                names = fields.iter().map(|f| f.to_string()).collect();
                continue;
            }

            let row = ncases + 1;
            if fields.len() != names.len() {
                return Err(DataError::RaggedRow {
                    row,
                    found: fields.len(),
                    expected: names.len(),
                });
            }
            for (j, field) in fields.iter().enumerate() {
                let value: f64 = field.parse().map_err(|_| DataError::NonNumericField {
                    row,
                    column: names[j].clone(),
                    value: field.to_string(),
                })?;
                if !value.is_finite() {
                    return Err(DataError::NonFiniteValue {
                        row,
                        column: names[j].clone(),
                    });
                }
                buffer.push(value);
            }
            ncases += 1;
        }

        if names.is_empty() {
            return Err(DataError::EmptyFile);
        }
        if ncases == 0 {
            return Err(DataError::NoDataRows);
        }
        let values = Array2::from_shape_vec((ncases, names.len()), buffer)
            .expect("row-major buffer matches ncases x nvars");
        Self::new(names, values)
    }

    pub fn ncases(&self) -> usize {
        self.values.nrows()
    }

    pub fn nvars(&self) -> usize {
        self.values.ncols()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// The full sample vector of one variable, as an owned column.
    pub fn column(&self, index: usize) -> Array1<f64> {
        self.values.column(index).to_owned()
    }

    /// Case-insensitive lookup of a variable by name.
    pub fn find_variable(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }
}
