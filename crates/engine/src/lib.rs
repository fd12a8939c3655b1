//! Order Reconciliation Engine.
//!
//! Ties the schema, inventory, sales and infra crates together: resolves
//! requested lines against the inventory sheet, validates every stock delta
//! before any write, commits inventory and ledger changes, and suppresses
//! duplicate submissions.

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod request;

pub use engine::{AGGREGATE_TYPE, OrderEnvelope, ReconciliationEngine};
pub use error::{IssueKind, LineIssue, ReconcileError};
pub use fingerprint::Fingerprint;
pub use request::{
    ErrorSummary, InventoryListing, LineRequest, OrderListing, OrderOutcome, OrderQuery,
    OrderRequest, OrderResult, OrderSnapshot, OrderUpdate, ProcessRequest, ProductCandidate,
    StockAdjustment, StockLevel,
};
