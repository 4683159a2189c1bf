//! Parsing and validation of rule values.
//!
//! A [`ParsedValue`] only ever comes out of [`parse`] for text that passed
//! validation for its [`ParameterKind`]. Malformed or out-of-range text
//! produces a [`ValueError`] instead; callers treat that as fatal.
//!
//! ```rust
//! use h5tune::codec::{parse, ParsedValue};
//! use h5tune::params::ParameterKind;
//!
//! assert_eq!(
//!     parse(ParameterKind::Pair, "88,44"),
//!     Ok(ParsedValue::Alignment { threshold: 88, alignment: 44 })
//! );
//! assert!(parse(ParameterKind::ChunkDims, "6,0").is_err());
//! ```

use std::num::IntErrorKind;

use serde::Serialize;

use crate::error::ValueError;
use crate::params::ParameterKind;

/// A validated, typed rule value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParsedValue {
    /// Boolean flag; `true` only for the literal text `true`.
    Flag(bool),
    /// Non-negative integer.
    Size(u64),
    /// Alignment threshold and boundary.
    Alignment {
        /// Objects at least this large are aligned.
        threshold: u64,
        /// Alignment boundary in bytes.
        alignment: u64,
    },
    /// Per-axis chunk sizes, all strictly positive, in axis order.
    Chunk(Vec<u64>),
    /// Hint text, forwarded verbatim.
    Hint(String),
}

/// Parses `text` according to `kind`.
///
/// # Errors
///
/// Returns [`ValueError`] when the text does not satisfy the grammar of
/// `kind`. Flags never fail.
pub fn parse(kind: ParameterKind, text: &str) -> Result<ParsedValue, ValueError> {
    match kind {
        ParameterKind::Flag => Ok(ParsedValue::Flag(text.trim() == "true")),
        ParameterKind::Hint => {
            if text.trim().is_empty() {
                return Err(ValueError::Empty);
            }
            Ok(ParsedValue::Hint(text.to_string()))
        }
        ParameterKind::Size => {
            let fields = split_fields(text, Some(1))?;
            Ok(ParsedValue::Size(parse_unsigned(0, fields[0])?))
        }
        ParameterKind::Pair => {
            let fields = split_fields(text, Some(2))?;
            Ok(ParsedValue::Alignment {
                threshold: parse_unsigned(0, fields[0])?,
                alignment: parse_unsigned(1, fields[1])?,
            })
        }
        ParameterKind::ChunkDims => {
            let fields = split_fields(text, None)?;
            let dims = fields
                .iter()
                .enumerate()
                .map(|(i, field)| parse_positive(i, field))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParsedValue::Chunk(dims))
        }
    }
}

/// Splits a comma-separated value, trimming each field.
fn split_fields(text: &str, expected: Option<usize>) -> Result<Vec<&str>, ValueError> {
    if text.trim().is_empty() {
        return Err(ValueError::Empty);
    }

    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if let Some(expected) = expected
        && fields.len() != expected
    {
        return Err(ValueError::FieldCount {
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}

fn parse_unsigned(field: usize, text: &str) -> Result<u64, ValueError> {
    if let Some(rest) = text.strip_prefix('-')
        && rest.parse::<u64>().is_ok_and(|v| v > 0)
    {
        return Err(ValueError::Negative {
            field,
            text: text.to_string(),
        });
    }

    text.parse::<u64>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow => ValueError::Overflow {
            field,
            text: text.to_string(),
        },
        _ => ValueError::NotAnInteger {
            field,
            text: text.to_string(),
        },
    })
}

fn parse_positive(field: usize, text: &str) -> Result<u64, ValueError> {
    let non_positive = || ValueError::NonPositive {
        field,
        text: text.to_string(),
    };

    match parse_unsigned(field, text) {
        Ok(0) | Err(ValueError::Negative { .. }) => Err(non_positive()),
        // "-0" is zero, not garbage
        Err(ValueError::NotAnInteger { .. }) if text == "-0" => Err(non_positive()),
        other => other,
    }
}
