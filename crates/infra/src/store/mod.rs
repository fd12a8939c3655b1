//! Tabular store boundary.
//!
//! The spreadsheets are the system of record. This module defines the
//! reader/writer traits the engine talks to plus two backends: an in-memory
//! one for tests/dev and a directory of CSV files.

pub mod csv_dir;
pub mod in_memory;
pub mod r#trait;

pub use csv_dir::CsvSheetStore;
pub use in_memory::InMemorySheetStore;
pub use r#trait::{SheetStore, StoreError, TabularReader, TabularWriter};
