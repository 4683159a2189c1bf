//! Error types for the h5tune property tuning layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::Hid;

/// The main error type for all h5tune operations.
///
/// Every variant is fatal to the intercepted call that produced it. The
/// "no matching rule" outcome is not an error and never shows up here.
#[derive(Error, Debug)]
pub enum TuneError {
    /// The rule document could not be read or parsed.
    #[error("rule document error: {0}")]
    Document(#[from] DocumentError),

    /// A rule's text value failed validation for its parameter kind.
    #[error("invalid value for parameter '{parameter}' ({}): {source}", scope(file, variable.as_deref()))]
    InvalidRule {
        /// The parameter name of the offending rule.
        parameter: String,
        /// The target file the rule was resolved for.
        file: String,
        /// The target dataset, for dataset-creation parameters.
        variable: Option<String>,
        /// What was wrong with the value.
        #[source]
        source: ValueError,
    },

    /// A call into the underlying I/O library failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

fn scope(file: &str, variable: Option<&str>) -> String {
    match variable {
        Some(variable) => format!("file '{file}', dataset '{variable}'"),
        None => format!("file '{file}'"),
    }
}

/// Errors that can occur while loading a rule document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The document source could not be opened or read.
    #[error("failed to read rule document '{}': {source}", path.display())]
    Read {
        /// The document path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document text is not well-formed.
    #[error("failed to parse rule document '{}': {source}", path.display())]
    Parse {
        /// The document path, or `<inline>` for in-memory text.
        path: PathBuf,
        /// The underlying XML error.
        #[source]
        source: roxmltree::Error,
    },
}

/// Errors produced when a rule's text value fails type or range validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The rule carries no text value.
    #[error("value is empty")]
    Empty,

    /// A field is not a base-10 integer.
    #[error("field {field} is not an integer: '{text}'")]
    NotAnInteger {
        /// Zero-based field index within the comma-separated value.
        field: usize,
        /// The offending text.
        text: String,
    },

    /// A field that must be non-negative is negative.
    #[error("field {field} must not be negative: '{text}'")]
    Negative {
        /// Zero-based field index.
        field: usize,
        /// The offending text.
        text: String,
    },

    /// A chunk dimension is zero or negative.
    #[error("chunk dimension {field} must be positive: '{text}'")]
    NonPositive {
        /// Zero-based field index.
        field: usize,
        /// The offending text.
        text: String,
    },

    /// A field does not fit the supported integer width.
    #[error("field {field} overflows a 64-bit unsigned integer: '{text}'")]
    Overflow {
        /// Zero-based field index.
        field: usize,
        /// The offending text.
        text: String,
    },

    /// The value has the wrong number of comma-separated fields.
    #[error("expected {expected} comma-separated fields, found {found}")]
    FieldCount {
        /// Required field count.
        expected: usize,
        /// Field count present in the value.
        found: usize,
    },

    /// The chunk vector length differs from the dataspace rank.
    #[error("chunk has {found} dimensions but the dataspace has rank {rank}")]
    RankMismatch {
        /// Rank of the target dataspace.
        rank: usize,
        /// Number of chunk dimensions in the rule.
        found: usize,
    },

    /// A chunk dimension exceeds the fixed maximum extent of its axis.
    #[error("chunk dimension {chunk} on axis {axis} exceeds the dataspace extent {extent}")]
    ChunkExceedsExtent {
        /// Zero-based axis index.
        axis: usize,
        /// The declared chunk size.
        chunk: u64,
        /// The axis' maximum extent.
        extent: u64,
    },
}

/// Errors reported by the underlying I/O library collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A property, dataspace or file query/update failed.
    #[error("{operation} failed with status {status}")]
    Call {
        /// The failing library operation, e.g. `H5Pset_alignment`.
        operation: &'static str,
        /// The status code returned by the library.
        status: i64,
    },

    /// The real entry point returned a failure status.
    #[error("forwarded call {entry} failed with status {status}")]
    Forward {
        /// The entry point that was forwarded to.
        entry: &'static str,
        /// The negative status it returned.
        status: i64,
    },

    /// The handle does not name a live object of the expected class.
    #[error("{operation}: handle {handle} is not a valid {expected}")]
    UnknownHandle {
        /// The operation that received the handle.
        operation: &'static str,
        /// The offending handle.
        handle: Hid,
        /// The object class the operation expected.
        expected: &'static str,
    },
}

/// Type alias for `Result<T, TuneError>`.
pub type Result<T> = std::result::Result<T, TuneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rule_message_includes_scope() {
        let err = TuneError::InvalidRule {
            parameter: "chunk".to_string(),
            file: "data.h5".to_string(),
            variable: Some("Data1".to_string()),
            source: ValueError::NonPositive {
                field: 1,
                text: "0".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("'chunk'"));
        assert!(msg.contains("file 'data.h5', dataset 'Data1'"));
        assert!(msg.contains("must be positive"));

        let err = TuneError::InvalidRule {
            parameter: "alignment".to_string(),
            file: "data.h5".to_string(),
            variable: None,
            source: ValueError::FieldCount {
                expected: 2,
                found: 1,
            },
        };
        assert!(!err.to_string().contains("dataset"));
    }

    #[test]
    fn test_backend_error_converts() {
        let err: TuneError = BackendError::Forward {
            entry: "H5Fopen",
            status: -1,
        }
        .into();
        assert!(matches!(err, TuneError::Backend(BackendError::Forward { .. })));
        assert_eq!(
            err.to_string(),
            "backend error: forwarded call H5Fopen failed with status -1"
        );
    }
}
