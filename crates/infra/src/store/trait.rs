use std::sync::Arc;

use thiserror::Error;

use sheetkeeper_schema::{SheetRef, SheetWrite, Table};

/// Tabular store operation error.
///
/// These are transport/storage failures, as opposed to domain errors. A write
/// error means the write may or may not have reached the backing sheet.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sheet not found: {0}")]
    SheetNotFound(SheetRef),

    #[error("row {row} is outside sheet {sheet}")]
    RowOutOfRange { sheet: SheetRef, row: usize },

    #[error("io error on {sheet}: {source}")]
    Io {
        sheet: SheetRef,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {sheet}: {source}")]
    Csv {
        sheet: SheetRef,
        #[source]
        source: csv::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the spreadsheet backend.
///
/// Must reflect the latest committed state at call time. The first row of the
/// sheet is the header row; the rest are data rows, blank rows included.
pub trait TabularReader: Send + Sync {
    fn read_table(&self, sheet: &SheetRef) -> Result<Table, StoreError>;
}

/// Write side of the spreadsheet backend.
///
/// Each call succeeds or fails as a unit. `row` and `col` are 0-based and
/// address data rows (the header row is not counted).
pub trait TabularWriter: Send + Sync {
    fn write_cell(&self, sheet: &SheetRef, row: usize, col: usize, value: &str) -> Result<(), StoreError>;

    /// Append a data row, returning its 0-based index.
    fn append_row(&self, sheet: &SheetRef, values: &[String]) -> Result<usize, StoreError>;

    /// Apply one staged [`SheetWrite`].
    fn apply(&self, sheet: &SheetRef, write: &SheetWrite) -> Result<(), StoreError> {
        match write {
            SheetWrite::Cell { row, col, value } => self.write_cell(sheet, *row, *col, value),
            SheetWrite::AppendRow { values } => self.append_row(sheet, values).map(|_| ()),
        }
    }
}

/// A backend that can both read and write; lets callers hold `Arc<dyn SheetStore>`.
pub trait SheetStore: TabularReader + TabularWriter {}

impl<S> SheetStore for S where S: TabularReader + TabularWriter + ?Sized {}

impl<S> TabularReader for Arc<S>
where
    S: TabularReader + ?Sized,
{
    fn read_table(&self, sheet: &SheetRef) -> Result<Table, StoreError> {
        (**self).read_table(sheet)
    }
}

impl<S> TabularWriter for Arc<S>
where
    S: TabularWriter + ?Sized,
{
    fn write_cell(&self, sheet: &SheetRef, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        (**self).write_cell(sheet, row, col, value)
    }

    fn append_row(&self, sheet: &SheetRef, values: &[String]) -> Result<usize, StoreError> {
        (**self).append_row(sheet, values)
    }
}
