//! Unified error handling for the analysis pipeline.
//!
//! Only structural failures live here: a run that hits one of these aborts and
//! the message is shown to the user. Metrics that are undefined for a given
//! session (fatigue index with a zero peak, slope with too few samples, ...)
//! are never errors; they come back as `None` in the metric structs.

use thiserror::Error;

/// Unified error type for analysis operations.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No row survived numeric coercion of the required fields
    #[error(
        "No valid rows left after cleaning ({rows_read} rows read, \
         all missing a numeric time, SmO2 or power value)"
    )]
    EmptyDataset { rows_read: usize },

    /// A required canonical field has no source column
    #[error("No column found for {field}: expected {expected}")]
    NoMatchingColumn { field: String, expected: String },

    /// SmO2 never varies over the session, normalization is undefined
    #[error("SmO2 range is degenerate (min = max = {value:.2}), cannot normalize")]
    DegenerateRange { value: f64 },

    /// Breakpoints outside the bounds accepted by the protocol
    #[error("Invalid breakpoints: {message}")]
    InvalidBreakpoints { message: String },

    /// The caller picked a column that is not a candidate for the field
    #[error("Column '{column}' is not a candidate for {field}")]
    InvalidSelection { field: String, column: String },

    /// Time column goes backwards
    #[error("Time is not monotonic at row {index} ({previous} s followed by {current} s)")]
    UnorderedTime {
        index: usize,
        previous: f64,
        current: f64,
    },

    /// Breakpoints or selection do not belong to the requested protocol
    #[error("Protocol mismatch: {message}")]
    ProtocolMismatch { message: String },

    /// Delimited text could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration could not be parsed or holds unusable values
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Extension trait for converting Option to AnalysisError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing-column error.
    fn ok_or_no_column(self, field: &str, expected: &str) -> Result<T>;

    /// Convert Option to Result with an empty-dataset error.
    fn ok_or_empty(self, rows_read: usize) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_no_column(self, field: &str, expected: &str) -> Result<T> {
        self.ok_or_else(|| AnalysisError::NoMatchingColumn {
            field: field.to_string(),
            expected: expected.to_string(),
        })
    }

    fn ok_or_empty(self, rows_read: usize) -> Result<T> {
        self.ok_or(AnalysisError::EmptyDataset { rows_read })
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::NoMatchingColumn {
            field: "SmO2".to_string(),
            expected: "a column containing 'SmO2'".to_string(),
        };
        assert!(err.to_string().contains("SmO2"));

        let err = AnalysisError::EmptyDataset { rows_read: 12 };
        assert!(err.to_string().contains("12 rows"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<usize> = None;
        let result = none.ok_or_no_column("power", "Power -  2[W]");
        assert!(matches!(
            result,
            Err(AnalysisError::NoMatchingColumn { .. })
        ));

        let none: Option<usize> = None;
        assert!(matches!(
            none.ok_or_empty(3),
            Err(AnalysisError::EmptyDataset { rows_read: 3 })
        ));
    }
}
