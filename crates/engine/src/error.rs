use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sheetkeeper_core::{DomainError, OrderId};
use sheetkeeper_infra::{ScopeBusy, StoreError};
use sheetkeeper_inventory::ItemId;
use sheetkeeper_schema::SchemaError;

/// What is wrong with one requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// No inventory item clears the similarity threshold.
    ProductNotFound,
    /// Several items match equally well.
    AmbiguousProduct { candidates: Vec<String> },
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },
    /// The item's status takes it off sale.
    Unavailable { item_id: ItemId, status: String },
    InvalidQuantity { quantity: i64 },
}

/// A per-line failure, naming the line (1-based) and what was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineIssue {
    pub line: usize,
    pub query: String,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl core::fmt::Display for LineIssue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "line {} ({:?}): ", self.line, self.query)?;
        match &self.kind {
            IssueKind::ProductNotFound => f.write_str("no matching product"),
            IssueKind::AmbiguousProduct { candidates } => {
                write!(f, "ambiguous, could be {}", candidates.join(" / "))
            }
            IssueKind::InsufficientStock {
                item_id,
                requested,
                available,
            } => write!(f, "insufficient stock for {item_id}: requested {requested}, available {available}"),
            IssueKind::Unavailable { item_id, status } => {
                write!(f, "{item_id} is not for sale (status {status:?})")
            }
            IssueKind::InvalidQuantity { quantity } => {
                write!(f, "quantity {quantity} must be a positive integer")
            }
        }
    }
}

fn join_issues(issues: &[LineIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reconciliation failure.
///
/// Everything except [`ReconcileError::CommitUncertain`] is raised before any
/// write reaches the store.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("order rejected: {}", join_issues(.0))]
    Rejected(Vec<LineIssue>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("duplicate submission; first seen at {first_seen}")]
    DuplicateSubmission { first_seen: DateTime<Utc> },

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("order {order_id} cannot be read from the ledger: {reason}")]
    MalformedLedger { order_id: OrderId, reason: String },

    #[error(transparent)]
    ScopeBusy(#[from] ScopeBusy),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A write failed after validation. `applied` writes had landed;
    /// `rolled_back` says whether compensation restored every one of them.
    #[error("commit uncertain after {applied} write(s) (rolled back: {rolled_back}): {source}")]
    CommitUncertain {
        applied: usize,
        rolled_back: bool,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Schema(_) => "schema_error",
            ReconcileError::Rejected(_) => "rejected",
            ReconcileError::Validation(_) => "validation_error",
            ReconcileError::DuplicateSubmission { .. } => "duplicate_submission",
            ReconcileError::OrderNotFound(_) => "order_not_found",
            ReconcileError::InvalidTransition(_) => "invalid_transition",
            ReconcileError::MalformedLedger { .. } => "malformed_ledger",
            ReconcileError::ScopeBusy(_) => "scope_busy",
            ReconcileError::Store(_) => "store_error",
            ReconcileError::CommitUncertain { .. } => "commit_uncertain",
        }
    }

    /// True when the store may hold some of this operation's writes.
    pub fn is_commit_uncertain(&self) -> bool {
        matches!(self, ReconcileError::CommitUncertain { .. })
    }

    pub fn issues(&self) -> &[LineIssue] {
        match self {
            ReconcileError::Rejected(issues) => issues,
            _ => &[],
        }
    }

    pub(crate) fn from_domain(order_id: &OrderId, err: DomainError) -> Self {
        match err {
            DomainError::NotFound => ReconcileError::OrderNotFound(order_id.clone()),
            DomainError::InvalidTransition(msg) => ReconcileError::InvalidTransition(msg),
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::Conflict(msg) => ReconcileError::Validation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_render_with_line_and_detail() {
        let err = ReconcileError::Rejected(vec![
            LineIssue {
                line: 1,
                query: "face wash".into(),
                kind: IssueKind::InsufficientStock {
                    item_id: ItemId::parse("FW-1").unwrap(),
                    requested: 25,
                    available: 20,
                },
            },
            LineIssue {
                line: 2,
                query: "unicorn".into(),
                kind: IssueKind::ProductNotFound,
            },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("requested 25, available 20"));
        assert!(msg.contains("line 2 (\"unicorn\"): no matching product"));
        assert_eq!(err.code(), "rejected");
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn line_issue_serializes_flat() {
        let issue = LineIssue {
            line: 3,
            query: "soap".into(),
            kind: IssueKind::AmbiguousProduct {
                candidates: vec!["Soap Bar".into(), "Soap Liquid".into()],
            },
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "ambiguous_product");
        assert_eq!(json["line"], 3);
        assert_eq!(json["candidates"][1], "Soap Liquid");
    }
}
