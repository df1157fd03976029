//! Import outcome and advisory warning types

use pcgs_common::{ScalarEntry, ScalarLevel, StructuralError};
use serde::Serialize;
use std::fmt;

/// Non-blocking finding attached to an operation's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvisoryWarning {
    /// CLO text does not open with a Bloom's performance verb
    BloomsVerbMissing {
        serial: String,
        word: String,
        /// Closest curated verb, when one is reasonably close
        suggestion: Option<String>,
    },
    /// An earlier import row was superseded by a later row with the same serial
    DiscardedDuplicateRow {
        level: ScalarLevel,
        serial: String,
        discarded_row: usize,
        kept_row: usize,
    },
    /// Column header that does not resolve to a known term
    UnknownHeader {
        column: usize,
        header: String,
        fallback: Option<ScalarLevel>,
    },
}

impl fmt::Display for AdvisoryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvisoryWarning::BloomsVerbMissing { serial, suggestion, .. } => {
                write!(f, "CLO {} does not start with a Bloom's performance verb.", serial)?;
                if let Some(verb) = suggestion {
                    write!(f, " Did you mean '{}'?", verb)?;
                }
                Ok(())
            }
            AdvisoryWarning::DiscardedDuplicateRow {
                level,
                serial,
                discarded_row,
                kept_row,
            } => write!(
                f,
                "{} '{}' on row {} replaced by row {}",
                level, serial, discarded_row, kept_row
            ),
            AdvisoryWarning::UnknownHeader {
                column,
                header,
                fallback,
            } => match fallback {
                Some(level) => write!(
                    f,
                    "header '{}' in column {} not recognized, treated as {}",
                    header, column, level
                ),
                None => write!(
                    f,
                    "header '{}' in column {} not recognized, kept as raw metadata",
                    header, column
                ),
            },
        }
    }
}

/// Import problem confined to one cell pair of one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based sheet row
    pub row: usize,
    pub level: ScalarLevel,
    pub serial: String,
    pub error: StructuralError,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.error)
    }
}

/// Result of a bulk import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    /// Entries that passed validation, in tree order
    pub accepted: Vec<ScalarEntry>,
    pub rejected: Vec<RowError>,
    pub warnings: Vec<AdvisoryWarning>,
    /// Whether the accepted entries were written to the course
    pub committed: bool,
    /// Data rows read from the source
    pub rows_read: usize,
}

impl ImportOutcome {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}
