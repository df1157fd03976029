//! `.xlsx` workbooks as import sources
//!
//! A worksheet is read into a `GridSource` at its absolute sheet positions,
//! so the configured header and data rows mean the same thing as in the
//! workbook the author edited.

use crate::services::tabular_source::{number_cell, GridSource};
use calamine::{open_workbook, Data, Reader, Xlsx, XlsxError};
use pcgs_common::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type SheetGrid = (Vec<Vec<String>>, HashSet<(usize, usize)>);

impl GridSource {
    /// Read one worksheet of an `.xlsx` workbook, the first one when `sheet`
    /// is `None`; reading stops early if `cancel` fires
    pub async fn from_xlsx_file(
        path: &Path,
        sheet: Option<&str>,
        header_row: usize,
        data_start_row: usize,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let owned_path: PathBuf = path.to_path_buf();
        let owned_sheet = sheet.map(str::to_string);
        let read = tokio::task::spawn_blocking(move || {
            read_worksheet(&owned_path, owned_sheet.as_deref())
        });

        let (grid, inexact) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(format!("reading {}", path.display())));
            }
            joined = read => joined
                .map_err(|e| Error::Internal(format!("workbook reader failed: {}", e)))??,
        };
        Ok(Self::from_parts(grid, inexact, header_row, data_start_row))
    }
}

fn read_worksheet(path: &Path, sheet: Option<&str>) -> Result<SheetGrid> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e: XlsxError| {
        Error::InvalidInput(format!("cannot open workbook {}: {}", path.display(), e))
    })?;

    let name = match sheet {
        Some(name) => name.to_string(),
        None => workbook.sheet_names().first().cloned().ok_or_else(|| {
            Error::InvalidInput(format!("workbook {} has no worksheets", path.display()))
        })?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| Error::InvalidInput(format!("cannot read worksheet '{}': {}", name, e)))?;

    // Ranges start at the first used cell; pad back to sheet coordinates
    let (first_row, first_column) = range
        .start()
        .map(|(row, column)| (row as usize, column as usize))
        .unwrap_or((0, 0));

    let mut grid: Vec<Vec<String>> = vec![Vec::new(); first_row];
    let mut inexact = HashSet::new();
    for (offset, cells) in range.rows().enumerate() {
        let row_index = first_row + offset;
        let mut row = vec![String::new(); first_column];
        for (i, cell) in cells.iter().enumerate() {
            let (text, exact) = workbook_cell(cell);
            if !exact {
                inexact.insert((row_index, first_column + i));
            }
            row.push(text);
        }
        grid.push(row);
    }

    debug!(path = %path.display(), sheet = %name, rows = grid.len(), "Read worksheet");
    Ok((grid, inexact))
}

fn workbook_cell(cell: &Data) -> (String, bool) {
    match cell {
        Data::Empty => (String::new(), true),
        Data::String(s) => (s.clone(), true),
        Data::Int(i) => (i.to_string(), true),
        Data::Float(f) => number_cell(*f),
        Data::Bool(b) => (b.to_string(), true),
        other => (other.to_string(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workbook_cells() {
        assert_eq!(workbook_cell(&Data::Float(3.0)), ("3".to_string(), true));
        assert_eq!(workbook_cell(&Data::Float(1.1)), ("1.1".to_string(), false));
        assert_eq!(workbook_cell(&Data::Int(7)), ("7".to_string(), true));
        assert_eq!(workbook_cell(&Data::Empty), (String::new(), true));
    }

    #[tokio::test]
    async fn test_missing_workbook_is_invalid_input() {
        let result = GridSource::from_xlsx_file(
            Path::new("/nonexistent/scalar.xlsx"),
            None,
            5,
            6,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
