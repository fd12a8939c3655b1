//! Schema inference for loosely-structured sheets.
//!
//! Spreadsheets kept by small shops name their columns however the owner
//! likes ("Qty", "Stock", "Item Name", "Price (PKR)"). This crate maps such a
//! header row onto a canonical set of [`ColumnRole`]s, deterministically, and
//! caches the result per sheet until its header row changes.

pub mod cache;
pub mod infer;
pub mod normalize;
pub mod role;
pub mod sheet;

pub use cache::{CacheStats, SchemaCache};
pub use infer::{ColumnMatch, HeaderSignature, MatchKind, SchemaError, SchemaMap, infer};
pub use normalize::{HeaderKey, normalize_text, tokenize};
pub use role::{ColumnRole, SheetKind};
pub use sheet::{SheetRef, SheetWrite, Table};
