//! Request and result types of the engine boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sheetkeeper_core::{AggregateRoot, OrderId};
use sheetkeeper_inventory::{Candidate, InventoryItem, ItemId, MatchTier, RejectedRow, StockChange};
use sheetkeeper_sales::{Customer, Order, OrderLine, OrderStatus};

use crate::error::{LineIssue, ReconcileError};

/// One requested line: a product reference plus a quantity.
///
/// The quantity is signed so that zero or negative input reaches validation
/// and is reported against its line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product: String,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(product: impl Into<String>, quantity: i64) -> Self {
        Self {
            product: product.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderRequest {
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub customer: Customer,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderRequest {
    pub fn new(lines: Vec<LineRequest>, customer: Customer) -> Self {
        Self {
            lines,
            customer,
            notes: None,
        }
    }
}

/// Changes to an existing order. Omitted parts keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderUpdate {
    #[serde(default)]
    pub lines: Option<Vec<LineRequest>>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self.lines.is_none() && self.customer.is_none() && self.notes.is_none()
    }
}

/// Create-or-update request accepted by [`process_order`].
///
/// [`process_order`]: crate::ReconciliationEngine::process_order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProcessRequest {
    Create(OrderRequest),
    Update { order_id: OrderId, update: OrderUpdate },
}

/// Serializable picture of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub total: Option<Decimal>,
}

impl From<&Order> for OrderSnapshot {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id().clone(),
            status: order.status(),
            lines: order.lines().to_vec(),
            customer: order.customer().clone(),
            notes: order.notes().map(str::to_string),
            created_at: order.created_at(),
            total: order.total(),
        }
    }
}

/// Successful outcome of a state-changing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOutcome {
    pub order: Order,
    /// Stock cells changed by this operation.
    pub stock_changes: Vec<StockChange>,
    /// The order was already in the requested state; nothing was written.
    pub unchanged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
}

/// Boundary result: never a bare boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<OrderId>,
    pub status: Option<OrderStatus>,
    pub applied_lines: Vec<OrderLine>,
    #[serde(default)]
    pub unchanged: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LineIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

impl From<Result<OrderOutcome, ReconcileError>> for OrderResult {
    fn from(result: Result<OrderOutcome, ReconcileError>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                order_id: Some(outcome.order.id().clone()),
                status: Some(outcome.order.status()),
                applied_lines: outcome.order.lines().to_vec(),
                unchanged: outcome.unchanged,
                errors: Vec::new(),
                error: None,
            },
            Err(err) => {
                let order_id = match &err {
                    ReconcileError::OrderNotFound(id) => Some(id.clone()),
                    ReconcileError::MalformedLedger { order_id, .. } => Some(order_id.clone()),
                    _ => None,
                };
                let first_seen = match &err {
                    ReconcileError::DuplicateSubmission { first_seen } => Some(*first_seen),
                    _ => None,
                };
                Self {
                    success: false,
                    order_id,
                    status: None,
                    applied_lines: Vec::new(),
                    unchanged: false,
                    errors: err.issues().to_vec(),
                    error: Some(ErrorSummary {
                        code: err.code().to_string(),
                        message: err.to_string(),
                        first_seen,
                    }),
                }
            }
        }
    }
}

/// Owned lookup result for read-only product resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub item_id: ItemId,
    pub name: String,
    pub price: Option<Decimal>,
    pub stock: i64,
    pub sellable: bool,
    pub tier: MatchTier,
    pub score: f64,
}

impl From<&Candidate<'_>> for ProductCandidate {
    fn from(candidate: &Candidate<'_>) -> Self {
        let item = candidate.item;
        Self {
            item_id: item.id().clone(),
            name: item.name().to_string(),
            price: item.price(),
            stock: item.stock(),
            sellable: item.is_sellable(),
            tier: candidate.score.tier,
            score: candidate.score.score,
        }
    }
}

/// Filter for [`list_orders`].
///
/// [`list_orders`]: crate::ReconciliationEngine::list_orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl OrderQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            status: None,
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListing {
    /// Matching orders before the limit was applied.
    pub total: usize,
    pub malformed: usize,
    pub orders: Vec<OrderSnapshot>,
}

/// One inventory row as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub item_id: ItemId,
    pub name: String,
    pub price: Option<Decimal>,
    pub stock: i64,
    pub status: Option<String>,
    pub sellable: bool,
}

impl From<&InventoryItem> for StockLevel {
    fn from(item: &InventoryItem) -> Self {
        Self {
            item_id: item.id().clone(),
            name: item.name().to_string(),
            price: item.price(),
            stock: item.stock(),
            status: item.status().map(str::to_string),
            sellable: item.is_sellable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryListing {
    pub items: Vec<StockLevel>,
    pub rejected_rows: Vec<RejectedRow>,
}

/// Result of a manual stock correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub item_id: ItemId,
    pub name: String,
    pub before: i64,
    pub after: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_request_is_tagged_by_action() {
        let raw = r#"{
            "action": "update",
            "order_id": "ORD-7",
            "update": { "lines": [{ "product": "Face Wash", "quantity": 2 }] }
        }"#;
        match serde_json::from_str::<ProcessRequest>(raw).unwrap() {
            ProcessRequest::Update { order_id, update } => {
                assert_eq!(order_id.as_str(), "ORD-7");
                assert_eq!(update.lines.unwrap()[0], LineRequest::new("Face Wash", 2));
                assert!(update.customer.is_none());
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected_not_repaired() {
        let raw = r#"{ "lines": [], "custmer": { "name": "Ali" } }"#;
        assert!(serde_json::from_str::<OrderRequest>(raw).is_err());
    }

    #[test]
    fn failed_result_carries_code_and_first_seen() {
        let first_seen = Utc::now();
        let result = OrderResult::from(Err(ReconcileError::DuplicateSubmission { first_seen }));
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.code, "duplicate_submission");
        assert_eq!(error.first_seen, Some(first_seen));
    }
}
