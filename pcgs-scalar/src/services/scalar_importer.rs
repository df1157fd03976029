//! Spreadsheet import parser
//!
//! Sheet layout: five two-column pairs starting at column B, one pair per
//! level, serial first then text:
//!
//! | B, C | D, E  | F, G     | H, I   | J, K                |
//! |------|-------|----------|--------|---------------------|
//! | CLO  | Topic | Subtopic | Lesson | Performance Criteria |
//!
//! Headers are resolved through the lexicon, so a sheet whose pairs are
//! labelled "Learning Objective" or "Element" still lands on the right level.
//! Cell values are never normalized; serial cells are only trimmed.
//!
//! Problems confined to one pair of one row are collected as `RowError`s and
//! the rest of the sheet is still imported. Only header problems, the row
//! limit and cancellation fail the whole parse.

use crate::models::{AdvisoryWarning, RowError, ScalarCollection};
use crate::services::tabular_source::TabularSource;
use pcgs_common::config::ImportConfig;
use pcgs_common::{
    Error, Lexicon, ReferentialError, Result, ScalarEntry, ScalarLevel, StructuralError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 0-based column of the first serial cell (column B)
const FIRST_PAIR_COLUMN: usize = 1;

/// Words that mark a serial-number header ("CLO No", "Topic #")
const SERIAL_MARKERS: &[&str] = &["no", "num", "number", "serial", "id", "ref"];

/// How unrecognized headers are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// Any unrecognized header fails the import
    Strict,
    /// Fall back to the positional layout and warn
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub header_mode: HeaderMode,
    /// Upper bound on data rows; exceeding it fails the import
    pub max_rows: Option<usize>,
}

impl ImportOptions {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            header_mode: if config.strict_headers {
                HeaderMode::Strict
            } else {
                HeaderMode::Lenient
            },
            max_rows: config.max_rows,
        }
    }
}

/// Parse result before anything is committed
#[derive(Debug, Clone)]
pub struct ParsedImport {
    pub collection: ScalarCollection,
    pub rejected: Vec<RowError>,
    pub warnings: Vec<AdvisoryWarning>,
    pub rows_read: usize,
}

#[derive(Debug, Clone, Copy)]
struct PairColumns {
    level: ScalarLevel,
    serial_column: usize,
    text_column: usize,
}

#[derive(Debug, Clone)]
struct PassThroughColumn {
    column: usize,
    key: String,
}

#[derive(Debug, Clone, PartialEq)]
enum HeaderMatch {
    Empty,
    Level(ScalarLevel),
    Unrecognized,
}

#[derive(Debug)]
struct Candidate {
    row: usize,
    level: ScalarLevel,
    serial: String,
    text: String,
    metadata: BTreeMap<String, Value>,
}

/// Turns a tabular source into a validated scalar collection
#[derive(Debug, Clone)]
pub struct ScalarImporter {
    lexicon: Arc<Lexicon>,
    options: ImportOptions,
}

impl ScalarImporter {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self {
            lexicon,
            options: ImportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Read the whole source and build the collection it describes
    pub async fn parse<S>(&self, source: &mut S, cancel: &CancellationToken) -> Result<ParsedImport>
    where
        S: TabularSource + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("import cancelled before start".to_string()));
        }

        let headers = source.headers().await?;
        let mut warnings = Vec::new();
        let pairs = self.resolve_pairs(&headers, &mut warnings)?;
        let pass_through = self.resolve_pass_through(&headers, &mut warnings)?;

        let mut rejected = Vec::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut rows_read = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(format!(
                    "import cancelled after {} rows",
                    rows_read
                )));
            }
            let Some(row) = source.next_row().await? else {
                break;
            };
            rows_read += 1;
            if let Some(max) = self.options.max_rows {
                if rows_read > max {
                    return Err(Error::InvalidInput(format!(
                        "sheet has more than {} data rows",
                        max
                    )));
                }
            }

            let mut innermost = None;
            for pair in &pairs {
                let serial = row.cell(pair.serial_column).trim();
                let text = row.cell(pair.text_column);
                if serial.is_empty() && text.trim().is_empty() {
                    continue;
                }
                if serial.is_empty() {
                    rejected.push(RowError {
                        row: row.row_index,
                        level: pair.level,
                        serial: String::new(),
                        error: StructuralError::MalformedSerial {
                            level: pair.level,
                            serial: String::new(),
                            reason: "serial is empty".to_string(),
                        },
                    });
                    continue;
                }
                if row.is_inexact(pair.serial_column) {
                    rejected.push(RowError {
                        row: row.row_index,
                        level: pair.level,
                        serial: serial.to_string(),
                        error: StructuralError::MalformedSerial {
                            level: pair.level,
                            serial: serial.to_string(),
                            reason: "numeric cell cannot hold a dotted serial exactly (1.10 reads as 1.1); enter it as text"
                                .to_string(),
                        },
                    });
                    continue;
                }
                if text.trim().is_empty() {
                    rejected.push(RowError {
                        row: row.row_index,
                        level: pair.level,
                        serial: serial.to_string(),
                        error: StructuralError::EmptyText {
                            level: pair.level,
                            serial: serial.to_string(),
                        },
                    });
                    continue;
                }
                candidates.push(Candidate {
                    row: row.row_index,
                    level: pair.level,
                    serial: serial.to_string(),
                    text: text.to_string(),
                    metadata: BTreeMap::new(),
                });
                innermost = Some(candidates.len() - 1);
            }

            if let Some(index) = innermost {
                for extra in &pass_through {
                    let value = row.cell(extra.column);
                    if !value.trim().is_empty() {
                        candidates[index]
                            .metadata
                            .insert(extra.key.clone(), Value::String(value.to_string()));
                    }
                }
            }
        }

        // Later rows win; remember which earlier rows they replaced
        let mut winners: HashMap<(ScalarLevel, String), usize> = HashMap::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let key = (candidate.level, candidate.serial.clone());
            if let Some(previous) = winners.insert(key, index) {
                warnings.push(AdvisoryWarning::DiscardedDuplicateRow {
                    level: candidate.level,
                    serial: candidate.serial.clone(),
                    discarded_row: candidates[previous].row,
                    kept_row: candidate.row,
                });
            }
        }

        let mut kept: Vec<Candidate> = candidates
            .into_iter()
            .enumerate()
            .filter(|(index, c)| winners.get(&(c.level, c.serial.clone())) == Some(index))
            .map(|(_, c)| c)
            .collect();
        // Parents before children; siblings in sheet order
        kept.sort_by_key(|c| (c.level, c.row));

        let mut collection = ScalarCollection::new();
        for candidate in kept {
            let mut entry =
                ScalarEntry::with_derived_parent(candidate.level, candidate.serial, candidate.text);
            entry.metadata = candidate.metadata;
            let (level, serial) = (entry.level, entry.serial.clone());
            if let Err(error) = collection.insert(entry) {
                debug!(row = candidate.row, serial = %serial, error = %error, "Rejected import row");
                rejected.push(RowError {
                    row: candidate.row,
                    level,
                    serial,
                    error,
                });
            }
        }
        rejected.sort_by_key(|r| (r.row, r.level));

        Ok(ParsedImport {
            collection,
            rejected,
            warnings,
            rows_read,
        })
    }

    fn classify(&self, header: &str) -> HeaderMatch {
        if header.trim().is_empty() {
            return HeaderMatch::Empty;
        }
        match self
            .lexicon
            .try_normalize(header)
            .and_then(ScalarLevel::from_lex_id)
        {
            Some(level) => HeaderMatch::Level(level),
            None => HeaderMatch::Unrecognized,
        }
    }

    fn resolve_pairs(
        &self,
        headers: &[String],
        warnings: &mut Vec<AdvisoryWarning>,
    ) -> Result<Vec<PairColumns>> {
        let header_at = |column: usize| headers.get(column).map(String::as_str).unwrap_or("");
        let mut pairs = Vec::with_capacity(ScalarLevel::ALL.len());

        for (position, positional) in ScalarLevel::ALL.iter().enumerate() {
            let serial_column = FIRST_PAIR_COLUMN + position * 2;
            let text_column = serial_column + 1;
            let serial_header = header_at(serial_column);
            let text_header = header_at(text_column);

            let from_text = self.classify(text_header);
            let from_serial = self.classify(strip_serial_marker(serial_header));

            let level = match (&from_text, &from_serial) {
                (HeaderMatch::Level(t), HeaderMatch::Level(s)) if t != s => {
                    return Err(Error::InvalidInput(format!(
                        "columns {} and {} disagree: '{}' is {} but '{}' is {}",
                        serial_column + 1,
                        text_column + 1,
                        serial_header.trim(),
                        s,
                        text_header.trim(),
                        t
                    )));
                }
                (HeaderMatch::Level(level), _) | (_, HeaderMatch::Level(level)) => *level,
                (HeaderMatch::Empty, HeaderMatch::Empty) => *positional,
                _ => {
                    let (column, header) = if from_text == HeaderMatch::Unrecognized {
                        (text_column, text_header)
                    } else {
                        (serial_column, serial_header)
                    };
                    self.unrecognized(column, header, Some(*positional), warnings)?;
                    *positional
                }
            };

            pairs.push(PairColumns {
                level,
                serial_column,
                text_column,
            });
        }

        let mut seen: HashMap<ScalarLevel, usize> = HashMap::new();
        for pair in &pairs {
            if let Some(other) = seen.insert(pair.level, pair.text_column) {
                return Err(Error::InvalidInput(format!(
                    "columns {} and {} both hold {}",
                    other + 1,
                    pair.text_column + 1,
                    pair.level
                )));
            }
        }

        pairs.sort_by_key(|p| p.level);
        Ok(pairs)
    }

    fn resolve_pass_through(
        &self,
        headers: &[String],
        warnings: &mut Vec<AdvisoryWarning>,
    ) -> Result<Vec<PassThroughColumn>> {
        let pair_columns = FIRST_PAIR_COLUMN..FIRST_PAIR_COLUMN + ScalarLevel::ALL.len() * 2;
        let mut columns = Vec::new();

        for (column, header) in headers.iter().enumerate() {
            if pair_columns.contains(&column) || header.trim().is_empty() {
                continue;
            }
            let key = match self.lexicon.try_normalize(header) {
                Some(id) => id.as_str().to_string(),
                None => {
                    self.unrecognized(column, header, None, warnings)?;
                    header.trim().to_string()
                }
            };
            columns.push(PassThroughColumn { column, key });
        }
        Ok(columns)
    }

    fn unrecognized(
        &self,
        column: usize,
        header: &str,
        fallback: Option<ScalarLevel>,
        warnings: &mut Vec<AdvisoryWarning>,
    ) -> Result<()> {
        match self.options.header_mode {
            HeaderMode::Strict => Err(ReferentialError::UnknownTerm {
                term: header.trim().to_string(),
            }
            .into()),
            HeaderMode::Lenient => {
                warn!(column = column + 1, header = %header.trim(), "Unrecognized import header");
                warnings.push(AdvisoryWarning::UnknownHeader {
                    column: column + 1,
                    header: header.trim().to_string(),
                    fallback,
                });
                Ok(())
            }
        }
    }
}

/// "CLO No." → "CLO", "Topic #" → "Topic"
fn strip_serial_marker(header: &str) -> &str {
    let trimmed = header.trim().trim_end_matches(['#', '.', ':']).trim_end();
    if let Some((head, last)) = trimmed.rsplit_once(char::is_whitespace) {
        if SERIAL_MARKERS.contains(&last.to_lowercase().as_str()) {
            return head.trim_end();
        }
    }
    trimmed
}
