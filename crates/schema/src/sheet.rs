//! Plain value types describing sheets, their contents and pending writes.

use serde::{Deserialize, Serialize};

/// Identity of one worksheet inside one workbook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetRef {
    pub workbook_id: String,
    pub worksheet_name: String,
}

impl SheetRef {
    pub fn new(workbook_id: impl Into<String>, worksheet_name: impl Into<String>) -> Self {
        Self {
            workbook_id: workbook_id.into(),
            worksheet_name: worksheet_name.into(),
        }
    }
}

impl core::fmt::Display for SheetRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.workbook_id, self.worksheet_name)
    }
}

/// A header row plus data rows, exactly as read from the store.
///
/// Row indices used throughout the crate are 0-based positions in `rows`
/// (the header row is not counted). Blank rows are kept so indices stay
/// aligned with the backing sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Cell text, or `""` when the row is shorter than `col`.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// True when every cell of the row is empty or whitespace.
    pub fn is_blank_row(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .is_none_or(|r| r.iter().all(|c| c.trim().is_empty()))
    }
}

/// One logical write against a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SheetWrite {
    /// Overwrite a single cell of an existing data row.
    Cell { row: usize, col: usize, value: String },
    /// Append a full data row after the last existing one.
    AppendRow { values: Vec<String> },
}
