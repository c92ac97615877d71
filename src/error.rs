//! Error types shared across the loader, classifier, configuration and survey stores.

use serde::Serialize;
use thiserror::Error;

/// A single record that could not take part in classification.
///
/// Raised per record; the surrounding pass keeps going.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("invalid record at row {index}: {field} value {value:?} is not numeric")]
    InvalidRecord {
        index: usize,
        field: &'static str,
        value: String,
    },
}

impl RecordError {
    pub fn invalid(index: usize, field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            field,
            value: value.into(),
        }
    }

    /// Row index of the offending record.
    pub fn index(&self) -> usize {
        match self {
            Self::InvalidRecord { index, .. } => *index,
        }
    }
}

/// Failures while reading a delimited table or resolving its columns.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read table: {0}")]
    Csv(#[from] csv::Error),

    #[error("table has no header row")]
    NoHeaders,

    #[error("column {0:?} not found in table headers")]
    MissingColumn(String),
}

/// A configuration value outside its accepted range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("consecutive intervals must be at least 1, got {0}")]
    ConsecutiveIntervals(u32),

    #[error("unknown logic mode {0:?}, expected AND or OR")]
    UnknownLogic(String),
}

impl ConfigError {
    pub fn out_of_range(name: &'static str, min: f64, max: f64, value: f64) -> Self {
        Self::OutOfRange {
            name,
            min,
            max,
            value,
        }
    }
}

/// Failures appending a survey response to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("remote store error: {0}")]
    Remote(String),
}

/// Answers that do not satisfy the survey schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurveyError {
    #[error("question {0:?} is required")]
    MissingAnswer(String),

    #[error("question {id:?} does not accept {value:?}")]
    InvalidChoice { id: String, value: String },

    #[error("question {id:?} expects a value in [{min}, {max}], got {value:?}")]
    OutOfScale {
        id: String,
        min: i64,
        max: i64,
        value: String,
    },

    #[error("answer given for unknown question {0:?}")]
    UnknownQuestion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_record_message() {
        let err = RecordError::invalid(3, "speed", "n/a");
        assert_eq!(err.index(), 3);
        assert_eq!(
            err.to_string(),
            "invalid record at row 3: speed value \"n/a\" is not numeric"
        );
    }

    #[test]
    fn test_out_of_range_message() {
        let err = ConfigError::out_of_range("activation speed", 0.0, 80.0, 95.0);
        assert_eq!(
            err.to_string(),
            "activation speed must be within [0, 80], got 95"
        );
    }
}
