//! Column resolution: raw device exports to canonical sessions.
//!
//! Device exports name their columns differently. Two strategies map them onto
//! the canonical fields {time, SmO₂, power, heart rate}:
//!
//! - **Exact rename** - the all-out exports use fixed literal headers
//!   (`"Time[s]"`, `"SmO2[%]"`, `"Power -  2[W]"`).
//! - **Keyword match** - the dynamic test lists every column whose header
//!   contains a field keyword; the caller then picks one per field.
//!
//! Both strategies coerce cells to numbers and drop rows where a required
//! field is not numeric. Surviving rows keep their original order.

use std::io::Read;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, OptionExt, Result};
use crate::{Sample, Session};

/// Literal time header of the all-out exports
pub const EXACT_TIME_COLUMN: &str = "Time[s]";
/// Literal SmO₂ header of the all-out exports
pub const EXACT_SMO2_COLUMN: &str = "SmO2[%]";
/// Literal power header of the all-out exports (two spaces after the dash)
pub const EXACT_POWER_COLUMN: &str = "Power -  2[W]";

pub const TIME_KEYWORDS: &[&str] = &["Time"];
pub const SMO2_KEYWORDS: &[&str] = &["SmO2"];
pub const POWER_KEYWORDS: &[&str] = &["Power", "Target"];
pub const HEART_RATE_KEYWORDS: &[&str] = &["HR", "Fréquence"];

// ============================================================================
// Raw Table
// ============================================================================

/// One cell of the raw table, as produced by the spreadsheet reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Numeric coercion: finite numbers and text parsing to a finite number.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(v) => *v,
            Cell::Text(text) => text.trim().parse::<f64>().ok()?,
            Cell::Empty => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

/// Tabular dataset with arbitrary headers, before any cleaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Read a table from delimited text with a header row.
    ///
    /// Rows may be ragged; missing trailing cells read as [`Cell::Empty`].
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(Cell::from).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Position of the first column with exactly this header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn number_at(&self, row: &[Cell], column: usize) -> Option<f64> {
        row.get(column).and_then(Cell::as_number)
    }
}

// ============================================================================
// Keyword Resolution
// ============================================================================

/// Filter column names containing any of the keywords, in table order.
///
/// Matching is a case-sensitive substring test.
pub fn resolve<'a>(candidates: &'a [String], keywords: &[&str]) -> Vec<&'a str> {
    candidates
        .iter()
        .filter(|name| keywords.iter().any(|k| name.contains(k)))
        .map(String::as_str)
        .collect()
}

/// Candidate columns for each canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCandidates {
    pub time: Vec<String>,
    pub smo2: Vec<String>,
    pub power: Vec<String>,
    /// Heart rate is optional; may be empty
    pub heart_rate: Vec<String>,
}

impl ColumnCandidates {
    /// List the candidates of every field.
    ///
    /// Fails with [`AnalysisError::NoMatchingColumn`] when a required field
    /// has no candidate at all.
    pub fn discover(table: &RawTable) -> Result<Self> {
        let owned = |names: Vec<&str>| names.into_iter().map(str::to_string).collect::<Vec<_>>();

        let candidates = Self {
            time: owned(resolve(&table.headers, TIME_KEYWORDS)),
            smo2: owned(resolve(&table.headers, SMO2_KEYWORDS)),
            power: owned(resolve(&table.headers, POWER_KEYWORDS)),
            heart_rate: owned(resolve(&table.headers, HEART_RATE_KEYWORDS)),
        };

        for (field, names, keywords) in [
            ("time", &candidates.time, TIME_KEYWORDS),
            ("SmO2", &candidates.smo2, SMO2_KEYWORDS),
            ("power", &candidates.power, POWER_KEYWORDS),
        ] {
            if names.is_empty() {
                return Err(AnalysisError::NoMatchingColumn {
                    field: field.to_string(),
                    expected: format!("a column containing {}", quoted(keywords)),
                });
            }
        }

        Ok(candidates)
    }

    /// Check that every selected column is a candidate of its field.
    pub fn validate(&self, selection: &ColumnSelection) -> Result<()> {
        check_selected("time", &selection.time, &self.time)?;
        check_selected("SmO2", &selection.smo2, &self.smo2)?;
        check_selected("power", &selection.power, &self.power)?;
        if let Some(hr) = &selection.heart_rate {
            check_selected("heart rate", hr, &self.heart_rate)?;
        }
        Ok(())
    }
}

fn check_selected(field: &str, column: &str, candidates: &[String]) -> Result<()> {
    if candidates.iter().any(|c| c == column) {
        Ok(())
    } else {
        Err(AnalysisError::InvalidSelection {
            field: field.to_string(),
            column: column.to_string(),
        })
    }
}

fn quoted(keywords: &[&str]) -> String {
    keywords
        .iter()
        .map(|k| format!("'{}'", k))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// The column chosen for each canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub time: String,
    pub smo2: String,
    pub power: String,
    pub heart_rate: Option<String>,
}

impl ColumnSelection {
    /// Pick the first candidate of every field.
    pub fn first_candidates(candidates: &ColumnCandidates) -> Option<Self> {
        Some(Self {
            time: candidates.time.first()?.clone(),
            smo2: candidates.smo2.first()?.clone(),
            power: candidates.power.first()?.clone(),
            heart_rate: candidates.heart_rate.first().cloned(),
        })
    }
}

// ============================================================================
// Resolution Modes
// ============================================================================

struct ColumnIndices {
    time: usize,
    smo2: usize,
    power: usize,
    heart_rate: Option<usize>,
}

/// Exact-rename mode: map the literal export headers onto a session.
pub fn resolve_exact(table: &RawTable) -> Result<Session> {
    let indices = ColumnIndices {
        time: table
            .column_index(EXACT_TIME_COLUMN)
            .ok_or_no_column("time", EXACT_TIME_COLUMN)?,
        smo2: table
            .column_index(EXACT_SMO2_COLUMN)
            .ok_or_no_column("SmO2", EXACT_SMO2_COLUMN)?,
        power: table
            .column_index(EXACT_POWER_COLUMN)
            .ok_or_no_column("power", EXACT_POWER_COLUMN)?,
        heart_rate: None,
    };
    extract(table, &indices)
}

/// Keyword mode: extract the columns chosen by the caller.
pub fn resolve_keywords(table: &RawTable, selection: &ColumnSelection) -> Result<Session> {
    let candidates = ColumnCandidates::discover(table)?;
    candidates.validate(selection)?;

    let index = |name: &str, field: &str| table.column_index(name).ok_or_no_column(field, name);
    let indices = ColumnIndices {
        time: index(&selection.time, "time")?,
        smo2: index(&selection.smo2, "SmO2")?,
        power: index(&selection.power, "power")?,
        heart_rate: match &selection.heart_rate {
            Some(name) => Some(index(name, "heart rate")?),
            None => None,
        },
    };
    extract(table, &indices)
}

fn extract(table: &RawTable, indices: &ColumnIndices) -> Result<Session> {
    let rows_read = table.row_count();
    let samples: Vec<Sample> = table
        .rows
        .iter()
        .filter_map(|row| {
            let time = table.number_at(row, indices.time)?;
            let smo2 = table.number_at(row, indices.smo2)?;
            let power = table.number_at(row, indices.power)?;
            let heart_rate = indices
                .heart_rate
                .and_then(|col| table.number_at(row, col));
            Some(Sample {
                time,
                smo2,
                power,
                heart_rate,
            })
        })
        .collect();

    if samples.len() < rows_read {
        debug!(
            "[Columns] Dropped {} of {} rows with non-numeric required fields",
            rows_read - samples.len(),
            rows_read
        );
    }
    if samples.is_empty() {
        return Err(AnalysisError::EmptyDataset { rows_read });
    }

    Session::new(samples)
}
