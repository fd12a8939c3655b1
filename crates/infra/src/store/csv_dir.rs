use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use sheetkeeper_schema::{SheetRef, Table};

use super::r#trait::{StoreError, TabularReader, TabularWriter};

/// Directory-of-CSV spreadsheet backend.
///
/// A sheet `workbook/worksheet` lives at `<root>/<workbook>/<worksheet>.csv`;
/// its first record is the header row. Every write rewrites the file through a
/// temporary sibling that is renamed over the original, so a failed write
/// leaves the previous contents intact.
#[derive(Debug)]
pub struct CsvSheetStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvSheetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, sheet: &SheetRef) -> PathBuf {
        self.root
            .join(&sheet.workbook_id)
            .join(format!("{}.csv", sheet.worksheet_name))
    }

    /// Create (or overwrite) a sheet from a table.
    pub fn create(&self, sheet: &SheetRef, table: &Table) -> Result<(), StoreError> {
        let _guard = self.lock(sheet)?;
        let path = self.path_of(sheet);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                sheet: sheet.clone(),
                source,
            })?;
        }
        self.persist(sheet, &path, table)
    }

    fn lock(&self, sheet: &SheetRef) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable(format!("write lock poisoned for {sheet}")))
    }

    fn load(&self, sheet: &SheetRef, path: &Path) -> Result<Table, StoreError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SheetNotFound(sheet.clone()));
            }
            Err(source) => {
                return Err(StoreError::Io {
                    sheet: sheet.clone(),
                    source,
                });
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| StoreError::Csv {
                sheet: sheet.clone(),
                source,
            })?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let mut records = records.into_iter();
        let headers = records.next().unwrap_or_default();
        Ok(Table::new(headers, records.collect()))
    }

    fn persist(&self, sheet: &SheetRef, path: &Path, table: &Table) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            sheet: sheet.clone(),
            source,
        };
        let csv_err = |source: csv::Error| StoreError::Csv {
            sheet: sheet.clone(),
            source,
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(BufWriter::new(tmp.as_file()));
            writer.write_record(&table.headers).map_err(csv_err)?;
            for row in &table.rows {
                writer.write_record(row).map_err(csv_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn modify<T>(
        &self,
        sheet: &SheetRef,
        change: impl FnOnce(&mut Table) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.lock(sheet)?;
        let path = self.path_of(sheet);
        let mut table = self.load(sheet, &path)?;
        let out = change(&mut table)?;
        self.persist(sheet, &path, &table)?;
        Ok(out)
    }
}

impl TabularReader for CsvSheetStore {
    fn read_table(&self, sheet: &SheetRef) -> Result<Table, StoreError> {
        self.load(sheet, &self.path_of(sheet))
    }
}

impl TabularWriter for CsvSheetStore {
    fn write_cell(&self, sheet: &SheetRef, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        self.modify(sheet, |table| {
            let cells = table.rows.get_mut(row).ok_or_else(|| StoreError::RowOutOfRange {
                sheet: sheet.clone(),
                row,
            })?;
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value.to_string();
            Ok(())
        })
    }

    fn append_row(&self, sheet: &SheetRef, values: &[String]) -> Result<usize, StoreError> {
        self.modify(sheet, |table| {
            table.rows.push(values.to_vec());
            Ok(table.rows.len() - 1)
        })
    }
}
