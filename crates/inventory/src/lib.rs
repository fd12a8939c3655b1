//! Inventory View.
//!
//! A typed projection of the inventory sheet: items parsed through the
//! inferred schema, a ranked name matcher, and validated stock transitions.
//! No IO; callers persist the writes a [`StockPlan`] produces.

pub mod item;
pub mod matcher;
pub mod view;

pub use item::{InventoryItem, ItemId, parse_price, parse_stock};
pub use matcher::{
    DEFAULT_FUZZY_THRESHOLD, DEFAULT_OVERLAP_THRESHOLD, MatchPolicy, MatchScore, MatchTier, NameKey,
};
pub use view::{
    Candidate, InventoryView, RejectReason, RejectedRow, StockChange, StockError, StockPlan,
};
