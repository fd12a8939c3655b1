use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use sheetkeeper_schema::{SheetRef, Table};

use super::r#trait::{StoreError, TabularReader, TabularWriter};

#[derive(Debug, Default)]
struct Faults {
    /// Writes remaining before the next injected failure (1 = the next write).
    fail_in: Option<usize>,
    failing_sheets: HashSet<SheetRef>,
    fail_reads: bool,
}

/// In-memory spreadsheet backend.
///
/// Intended for tests/dev. Supports injecting write and read failures to
/// exercise commit-uncertain and compensation paths.
#[derive(Debug, Default)]
pub struct InMemorySheetStore {
    sheets: RwLock<HashMap<SheetRef, Table>>,
    faults: Mutex<Faults>,
    write_count: Mutex<usize>,
}

impl InMemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a sheet.
    pub fn insert(&self, sheet: SheetRef, table: Table) {
        if let Ok(mut sheets) = self.sheets.write() {
            sheets.insert(sheet, table);
        }
    }

    /// Snapshot of a sheet's current contents.
    pub fn table(&self, sheet: &SheetRef) -> Option<Table> {
        self.sheets.read().ok()?.get(sheet).cloned()
    }

    /// Make the `n`-th write from now fail (1 = the very next write). Only that
    /// write fails; later writes succeed again.
    pub fn fail_nth_write(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_in = Some(n.max(1));
        }
    }

    /// Make every write to `sheet` fail until [`clear_faults`] is called.
    ///
    /// [`clear_faults`]: InMemorySheetStore::clear_faults
    pub fn fail_writes_to(&self, sheet: SheetRef) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_sheets.insert(sheet);
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_reads = fail;
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            *faults = Faults::default();
        }
    }

    /// Number of writes that succeeded so far.
    pub fn write_count(&self) -> usize {
        self.write_count.lock().map(|n| *n).unwrap_or(0)
    }

    fn check_write_fault(&self, sheet: &SheetRef) -> Result<(), StoreError> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Unavailable("fault state poisoned".to_string()))?;

        if faults.failing_sheets.contains(sheet) {
            return Err(StoreError::Unavailable(format!("injected write failure on {sheet}")));
        }
        if let Some(remaining) = faults.fail_in {
            if remaining <= 1 {
                faults.fail_in = None;
                return Err(StoreError::Unavailable(format!("injected write failure on {sheet}")));
            }
            faults.fail_in = Some(remaining - 1);
        }
        Ok(())
    }

    fn record_write(&self) {
        if let Ok(mut n) = self.write_count.lock() {
            *n += 1;
        }
    }
}

impl TabularReader for InMemorySheetStore {
    fn read_table(&self, sheet: &SheetRef) -> Result<Table, StoreError> {
        let fail = self.faults.lock().map(|f| f.fail_reads).unwrap_or(false);
        if fail {
            return Err(StoreError::Unavailable(format!("injected read failure on {sheet}")));
        }
        self.table(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.clone()))
    }
}

impl TabularWriter for InMemorySheetStore {
    fn write_cell(&self, sheet: &SheetRef, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        self.check_write_fault(sheet)?;

        let mut sheets = self
            .sheets
            .write()
            .map_err(|_| StoreError::Unavailable("sheet state poisoned".to_string()))?;
        let table = sheets
            .get_mut(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.clone()))?;
        let cells = table.rows.get_mut(row).ok_or_else(|| StoreError::RowOutOfRange {
            sheet: sheet.clone(),
            row,
        })?;
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.to_string();
        drop(sheets);

        self.record_write();
        Ok(())
    }

    fn append_row(&self, sheet: &SheetRef, values: &[String]) -> Result<usize, StoreError> {
        self.check_write_fault(sheet)?;

        let mut sheets = self
            .sheets
            .write()
            .map_err(|_| StoreError::Unavailable("sheet state poisoned".to_string()))?;
        let table = sheets
            .get_mut(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.clone()))?;
        table.rows.push(values.to_vec());
        let row = table.rows.len() - 1;
        drop(sheets);

        self.record_write();
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> SheetRef {
        SheetRef::new("wb", "Inventory")
    }

    fn seeded() -> InMemorySheetStore {
        let store = InMemorySheetStore::new();
        store.insert(
            sheet(),
            Table::new(
                vec!["Name".into(), "Qty".into()],
                vec![vec!["Soap".into(), "3".into()]],
            ),
        );
        store
    }

    #[test]
    fn writes_are_visible_to_subsequent_reads() {
        let store = seeded();
        store.write_cell(&sheet(), 0, 1, "2").unwrap();
        let row = store
            .append_row(&sheet(), &["Towel".to_string(), "9".to_string()])
            .unwrap();

        let table = store.read_table(&sheet()).unwrap();
        assert_eq!(row, 1);
        assert_eq!(table.cell(0, 1), "2");
        assert_eq!(table.cell(1, 0), "Towel");
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn nth_write_failure_is_one_shot() {
        let store = seeded();
        store.fail_nth_write(2);

        assert!(store.write_cell(&sheet(), 0, 1, "2").is_ok());
        assert!(matches!(
            store.write_cell(&sheet(), 0, 1, "1"),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.write_cell(&sheet(), 0, 1, "0").is_ok());
        assert_eq!(store.read_table(&sheet()).unwrap().cell(0, 1), "0");
    }

    #[test]
    fn out_of_range_rows_and_unknown_sheets_are_errors() {
        let store = seeded();
        assert!(matches!(
            store.write_cell(&sheet(), 5, 0, "x"),
            Err(StoreError::RowOutOfRange { row: 5, .. })
        ));
        assert!(matches!(
            store.read_table(&SheetRef::new("wb", "Nope")),
            Err(StoreError::SheetNotFound(_))
        ));

        store.fail_reads(true);
        assert!(store.read_table(&sheet()).is_err());
        store.clear_faults();
        assert!(store.read_table(&sheet()).is_ok());
    }
}
