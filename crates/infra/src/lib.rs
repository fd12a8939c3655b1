//! Infrastructure layer: the tabular store boundary, duplicate-submission
//! guard, per-scope locking and runtime configuration.

pub mod config;
pub mod dedup;
pub mod lock;
pub mod store;

pub use config::{ConfigError, ConnectionConfig, Settings};
pub use dedup::{DedupGuard, DedupOutcome};
pub use lock::{ScopeBusy, ScopeGuard, ScopeKey, ScopeLocks};
pub use store::{
    CsvSheetStore, InMemorySheetStore, SheetStore, StoreError, TabularReader, TabularWriter,
};
