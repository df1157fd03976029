//! Tabular import sources
//!
//! The importer reads any `TabularSource`: an ordered header list plus rows
//! whose cells line up with those headers. `GridSource` covers in-memory
//! sheets, JSON exports of a sheet (an array of rows) and `.xlsx`
//! workbooks.
//!
//! Numeric cells are rendered as integers when they hold a whole number.
//! Any other number is rendered in its shortest form and its column is
//! flagged on the row: `1.10` and `1.1` read the same, so such a cell cannot
//! be trusted as a dotted serial.

use async_trait::async_trait;
use pcgs_common::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// One data row of a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 1-based sheet row number
    pub row_index: usize,
    pub cells: Vec<String>,
    /// 0-based columns whose cell held a non-integral number
    pub inexact_columns: Vec<usize>,
}

impl SourceRow {
    pub fn new(row_index: usize, cells: Vec<String>) -> Self {
        Self {
            row_index,
            cells,
            inexact_columns: Vec::new(),
        }
    }

    /// True when the cell's text was rendered from a non-integral number
    pub fn is_inexact(&self, column: usize) -> bool {
        self.inexact_columns.contains(&column)
    }

    /// Cell at a 0-based column, empty when the row is short
    pub fn cell(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Header → value for every column that has a non-empty header
    pub fn as_mapping(&self, headers: &[String]) -> BTreeMap<String, String> {
        headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.trim().is_empty())
            .map(|(column, header)| (header.clone(), self.cell(column).to_string()))
            .collect()
    }
}

/// Source of column headers and rows for the importer
#[async_trait]
pub trait TabularSource: Send {
    /// Column headers, 0-based by column
    async fn headers(&mut self) -> Result<Vec<String>>;

    /// Next data row, `None` when exhausted
    async fn next_row(&mut self) -> Result<Option<SourceRow>>;
}

/// Sheet held in memory as a grid of cell strings
#[derive(Debug, Clone)]
pub struct GridSource {
    grid: Vec<Vec<String>>,
    /// (0-based grid row, 0-based column) of non-integral numeric cells
    inexact: HashSet<(usize, usize)>,
    header_row: usize,
    data_start_row: usize,
    cursor: usize,
}

impl GridSource {
    /// Default layout: headers on sheet row 5, data from row 6
    pub fn new(grid: Vec<Vec<String>>) -> Self {
        Self::with_layout(grid, 5, 6)
    }

    /// `header_row` and `data_start_row` are 1-based sheet rows
    pub fn with_layout(grid: Vec<Vec<String>>, header_row: usize, data_start_row: usize) -> Self {
        Self {
            grid,
            inexact: HashSet::new(),
            header_row: header_row.max(1),
            data_start_row: data_start_row.max(1),
            cursor: data_start_row.max(1) - 1,
        }
    }

    /// Grid whose first row is the header and second row the first data row
    pub fn compact(grid: Vec<Vec<String>>) -> Self {
        Self::with_layout(grid, 1, 2)
    }

    /// Parse a JSON array of rows (each row an array of scalar cells)
    pub fn from_json_str(json: &str, header_row: usize, data_start_row: usize) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let rows = value
            .as_array()
            .ok_or_else(|| Error::InvalidInput("sheet JSON must be an array of rows".to_string()))?;

        let mut grid = Vec::with_capacity(rows.len());
        let mut inexact = HashSet::new();
        for (i, row) in rows.iter().enumerate() {
            let cells = row.as_array().ok_or_else(|| {
                Error::InvalidInput(format!("sheet row {} is not an array", i + 1))
            })?;
            let mut converted = Vec::with_capacity(cells.len());
            for (column, cell) in cells.iter().enumerate() {
                let (text, exact) = json_cell(cell).ok_or_else(|| {
                    Error::InvalidInput(format!("sheet row {} has a nested cell value", i + 1))
                })?;
                if !exact {
                    inexact.insert((i, column));
                }
                converted.push(text);
            }
            grid.push(converted);
        }

        Ok(Self::from_parts(grid, inexact, header_row, data_start_row))
    }

    /// Read a JSON sheet file; reading stops early if `cancel` fires
    pub async fn from_json_file(
        path: &Path,
        header_row: usize,
        data_start_row: usize,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let content = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(format!("reading {}", path.display())));
            }
            read = tokio::fs::read_to_string(path) => read?,
        };
        Self::from_json_str(&content, header_row, data_start_row)
    }

    pub(crate) fn from_parts(
        grid: Vec<Vec<String>>,
        inexact: HashSet<(usize, usize)>,
        header_row: usize,
        data_start_row: usize,
    ) -> Self {
        let mut source = Self::with_layout(grid, header_row, data_start_row);
        source.inexact = inexact;
        source
    }

    pub fn row_count(&self) -> usize {
        self.grid.len().saturating_sub(self.data_start_row - 1)
    }
}

/// Text of a numeric cell and whether that text is exact
pub(crate) fn number_cell(value: f64) -> (String, bool) {
    // Whole numbers below 2^53 print exactly as integers
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        ((value as i64).to_string(), true)
    } else {
        (value.to_string(), false)
    }
}

fn json_cell(cell: &Value) -> Option<(String, bool)> {
    match cell {
        Value::Null => Some((String::new(), true)),
        Value::String(s) => Some((s.clone(), true)),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Some((i.to_string(), true)),
            (_, Some(u), _) => Some((u.to_string(), true)),
            (_, _, Some(f)) => Some(number_cell(f)),
            _ => Some((n.to_string(), false)),
        },
        Value::Bool(b) => Some((b.to_string(), true)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[async_trait]
impl TabularSource for GridSource {
    async fn headers(&mut self) -> Result<Vec<String>> {
        Ok(self.grid.get(self.header_row - 1).cloned().unwrap_or_default())
    }

    async fn next_row(&mut self) -> Result<Option<SourceRow>> {
        match self.grid.get(self.cursor) {
            Some(cells) => {
                let mut inexact_columns: Vec<usize> = self
                    .inexact
                    .iter()
                    .filter(|(row, _)| *row == self.cursor)
                    .map(|(_, column)| *column)
                    .collect();
                inexact_columns.sort_unstable();
                let row = SourceRow {
                    row_index: self.cursor + 1,
                    cells: cells.clone(),
                    inexact_columns,
                };
                self.cursor += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}
