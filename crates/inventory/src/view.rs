//! Typed in-memory projection of the inventory sheet.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sheetkeeper_schema::{ColumnRole, SchemaMap, SheetWrite, Table};

use crate::item::{InventoryItem, ItemId, parse_price, parse_stock};
use crate::matcher::{MatchPolicy, MatchScore, NameKey, score};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("unknown inventory item: {0}")]
    UnknownItem(ItemId),

    #[error("insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    #[error("stock level of {0} would overflow")]
    Overflow(ItemId),
}

/// Why a data row is not part of the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MalformedStock { value: String },
    MissingName,
    DuplicateId { id: ItemId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// 0-based data row.
    pub row: usize,
    #[serde(flatten)]
    pub reason: RejectReason,
}

/// A ranked lookup result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    pub item: &'a InventoryItem,
    pub score: MatchScore,
}

/// One validated stock transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub item_id: ItemId,
    pub row: usize,
    pub col: usize,
    pub before: i64,
    pub after: i64,
}

impl StockChange {
    pub fn delta(&self) -> i64 {
        self.after - self.before
    }

    /// Cell write that commits this change.
    pub fn write(&self) -> SheetWrite {
        SheetWrite::Cell {
            row: self.row,
            col: self.col,
            value: self.after.to_string(),
        }
    }

    /// Cell write that restores the pre-change value.
    pub fn undo(&self) -> SheetWrite {
        SheetWrite::Cell {
            row: self.row,
            col: self.col,
            value: self.before.to_string(),
        }
    }
}

/// A set of stock changes validated together. Never contains a zero delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPlan {
    changes: Vec<StockChange>,
}

impl StockPlan {
    pub fn changes(&self) -> &[StockChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn writes(&self) -> Vec<SheetWrite> {
        self.changes.iter().map(StockChange::write).collect()
    }
}

/// Inventory sheet projection: items in catalog (row) order plus lookups.
#[derive(Debug, Clone)]
pub struct InventoryView {
    schema: Arc<SchemaMap>,
    items: Vec<InventoryItem>,
    keys: Vec<NameKey>,
    index: HashMap<ItemId, usize>,
    rejected: Vec<RejectedRow>,
    policy: MatchPolicy,
}

impl InventoryView {
    /// Build the view from a table whose headers produced `schema`.
    ///
    /// Blank rows are skipped. Rows with an unreadable stock cell, no name or
    /// a repeated product id are excluded and listed in [`rejected_rows`].
    ///
    /// [`rejected_rows`]: InventoryView::rejected_rows
    pub fn build(schema: Arc<SchemaMap>, table: &Table) -> Self {
        let name_col = schema.required(ColumnRole::ProductName);
        let stock_col = schema.required(ColumnRole::Quantity);
        let id_col = schema.column(ColumnRole::ProductId);
        let price_col = schema.column(ColumnRole::Price);
        let status_col = schema.column(ColumnRole::Status);

        let mut items = Vec::new();
        let mut index = HashMap::new();
        let mut rejected = Vec::new();

        for row in 0..table.rows.len() {
            if table.is_blank_row(row) {
                continue;
            }

            let name = table.cell(row, name_col).trim();
            if name.is_empty() {
                tracing::warn!(row, "inventory row has no product name; skipped");
                rejected.push(RejectedRow {
                    row,
                    reason: RejectReason::MissingName,
                });
                continue;
            }

            let raw_stock = table.cell(row, stock_col);
            let Some(stock) = parse_stock(raw_stock) else {
                tracing::warn!(row, product = name, value = raw_stock, "malformed stock cell; row excluded");
                rejected.push(RejectedRow {
                    row,
                    reason: RejectReason::MalformedStock {
                        value: raw_stock.to_string(),
                    },
                });
                continue;
            };

            let id = id_col
                .and_then(|col| ItemId::parse(table.cell(row, col)).ok())
                .unwrap_or_else(|| ItemId::for_row(row));
            if index.contains_key(&id) {
                tracing::warn!(row, item_id = %id, "duplicate product id; row excluded");
                rejected.push(RejectedRow {
                    row,
                    reason: RejectReason::DuplicateId { id },
                });
                continue;
            }

            let mut item = InventoryItem::new(id.clone(), row, name, stock)
                .with_price(price_col.and_then(|col| parse_price(table.cell(row, col))))
                .with_status(status_col.map(|col| table.cell(row, col).to_string()));
            for role in [ColumnRole::Weight, ColumnRole::Color, ColumnRole::Size] {
                if let Some(col) = schema.column(role) {
                    item = item.with_attribute(role, table.cell(row, col));
                }
            }

            index.insert(id, items.len());
            items.push(item);
        }

        let keys = items
            .iter()
            .map(|item| NameKey::from_normalized(item.normalized_name().to_string()))
            .collect();

        tracing::debug!(items = items.len(), rejected = rejected.len(), "inventory view built");

        Self {
            schema,
            items,
            keys,
            index,
            rejected,
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn schema(&self) -> &SchemaMap {
        &self.schema
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&InventoryItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn rejected_rows(&self) -> &[RejectedRow] {
        &self.rejected
    }

    /// Ranked candidates for a free-text product query.
    ///
    /// Empty when nothing clears the similarity threshold.
    pub fn find_by_name(&self, query: &str) -> Vec<Candidate<'_>> {
        let query = NameKey::new(query);
        if query.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, MatchScore)> = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| score(&query, key, &self.policy).map(|s| (i, s)))
            .collect();
        // Stable sort keeps catalog order among equal scores.
        ranked.sort_by(|(_, a), (_, b)| a.rank_cmp(b));

        ranked
            .into_iter()
            .map(|(i, score)| Candidate {
                item: &self.items[i],
                score,
            })
            .collect()
    }

    /// Apply a signed stock delta to one item, returning the new level.
    ///
    /// A reduction that would leave the stock negative is refused and leaves
    /// the item untouched.
    pub fn reserve(&mut self, id: &ItemId, delta: i64) -> Result<i64, StockError> {
        let change = self.check(id, delta)?;
        let i = self.index[id];
        self.items[i].set_stock(change.after);
        Ok(change.after)
    }

    /// Validate several deltas at once. Deltas for the same item are summed
    /// first; every resulting level is checked before anything is returned.
    pub fn plan<I>(&self, deltas: I) -> Result<StockPlan, Vec<StockError>>
    where
        I: IntoIterator<Item = (ItemId, i64)>,
    {
        let mut order: Vec<ItemId> = Vec::new();
        let mut totals: HashMap<ItemId, i64> = HashMap::new();
        for (id, delta) in deltas {
            match totals.get_mut(&id) {
                Some(total) => *total = total.saturating_add(delta),
                None => {
                    order.push(id.clone());
                    totals.insert(id, delta);
                }
            }
        }

        let mut changes = Vec::new();
        let mut errors = Vec::new();
        for id in order {
            let delta = totals[&id];
            if delta == 0 {
                continue;
            }
            match self.check(&id, delta) {
                Ok(change) => changes.push(change),
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() {
            Ok(StockPlan { changes })
        } else {
            Err(errors)
        }
    }

    /// Commit a plan to the in-memory view.
    pub fn apply(&mut self, plan: &StockPlan) {
        for change in &plan.changes {
            if let Some(&i) = self.index.get(&change.item_id) {
                self.items[i].set_stock(change.after);
            }
        }
    }

    fn check(&self, id: &ItemId, delta: i64) -> Result<StockChange, StockError> {
        let item = self
            .get(id)
            .ok_or_else(|| StockError::UnknownItem(id.clone()))?;
        let before = item.stock();
        let after = before
            .checked_add(delta)
            .ok_or_else(|| StockError::Overflow(id.clone()))?;
        if delta < 0 && after < 0 {
            return Err(StockError::InsufficientStock {
                item_id: id.clone(),
                requested: -delta,
                available: before,
            });
        }
        Ok(StockChange {
            item_id: id.clone(),
            row: item.row(),
            col: self.schema.required(ColumnRole::Quantity),
            before,
            after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use sheetkeeper_schema::{SheetKind, infer};

    use crate::matcher::MatchTier;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn view(t: &Table) -> InventoryView {
        let schema = infer(SheetKind::Inventory, &t.headers).unwrap();
        InventoryView::build(Arc::new(schema), t)
    }

    fn catalog() -> Table {
        table(
            &["SKU", "Product Name", "Price", "Stock", "Colour", "Status"],
            &[
                &["FW-1", "Face Wash", "850", "20", "", "Active"],
                &["FC-1", "Face Cream", "Rs. 1,200", "5", "White", ""],
                &["SH-1", "Herbal Shampoo", "600", "0", "", "Discontinued"],
                &["", "Lip Balm", "", "7", "", ""],
            ],
        )
    }

    #[test]
    fn build_reads_typed_items_in_catalog_order() {
        let v = view(&catalog());

        assert_eq!(v.len(), 4);
        let wash = v.get(&ItemId::parse("FW-1").unwrap()).unwrap();
        assert_eq!(wash.name(), "Face Wash");
        assert_eq!(wash.stock(), 20);
        assert_eq!(wash.price(), Some(Decimal::new(850, 0)));

        let cream = v.get(&ItemId::parse("FC-1").unwrap()).unwrap();
        assert_eq!(cream.price(), Some(Decimal::new(1200, 0)));
        assert_eq!(cream.attribute(ColumnRole::Color), Some("White"));

        let shampoo = v.get(&ItemId::parse("SH-1").unwrap()).unwrap();
        assert!(!shampoo.is_sellable());

        // No SKU: positional id.
        assert_eq!(v.items()[3].id().as_str(), "row-4");
        assert!(v.rejected_rows().is_empty());
    }

    #[test]
    fn malformed_rows_are_excluded_and_reported() {
        let t = table(
            &["Name", "Qty"],
            &[
                &["Soap", "3"],
                &["Towel", "three"],
                &["", ""],
                &["", "4"],
                &["Sponge", "2.5"],
            ],
        );
        let v = view(&t);

        assert_eq!(v.len(), 1);
        assert_eq!(
            v.rejected_rows(),
            &[
                RejectedRow {
                    row: 1,
                    reason: RejectReason::MalformedStock {
                        value: "three".into()
                    }
                },
                RejectedRow {
                    row: 3,
                    reason: RejectReason::MissingName
                },
                RejectedRow {
                    row: 4,
                    reason: RejectReason::MalformedStock {
                        value: "2.5".into()
                    }
                },
            ]
        );
    }

    #[test]
    fn duplicate_product_ids_keep_the_first_row() {
        let t = table(
            &["SKU", "Name", "Qty"],
            &[&["A", "Soap", "3"], &["A", "Soap Refill", "9"]],
        );
        let v = view(&t);

        assert_eq!(v.len(), 1);
        assert_eq!(v.items()[0].name(), "Soap");
        match &v.rejected_rows()[0].reason {
            RejectReason::DuplicateId { id } => assert_eq!(id.as_str(), "A"),
            other => panic!("unexpected reason: {other:?}"),
        }
    }

    #[test]
    fn find_by_name_ranks_by_tier_then_catalog_order() {
        let v = view(&catalog());

        let exact = v.find_by_name("  face WASH ");
        assert_eq!(exact[0].item.name(), "Face Wash");
        assert_eq!(exact[0].score.tier, MatchTier::Exact);

        let prefix = v.find_by_name("face");
        let names: Vec<_> = prefix.iter().map(|c| c.item.name()).collect();
        assert_eq!(names, vec!["Face Wash", "Face Cream"]);
        assert!(prefix[0].score.ties_with(&prefix[1].score));

        assert!(v.find_by_name("garden hose").is_empty());
        assert!(v.find_by_name("   ").is_empty());
    }

    #[test]
    fn reserve_refuses_to_go_negative() {
        let mut v = view(&catalog());
        let id = ItemId::parse("FW-1").unwrap();

        assert_eq!(v.reserve(&id, -3).unwrap(), 17);
        assert_eq!(
            v.reserve(&id, -25),
            Err(StockError::InsufficientStock {
                item_id: id.clone(),
                requested: 25,
                available: 17
            })
        );
        assert_eq!(v.get(&id).unwrap().stock(), 17);
        assert_eq!(v.reserve(&id, 3).unwrap(), 20);
        assert!(matches!(
            v.reserve(&ItemId::parse("nope").unwrap(), 1),
            Err(StockError::UnknownItem(_))
        ));
    }

    #[test]
    fn plan_aggregates_lines_and_reports_every_shortfall() {
        let v = view(&catalog());
        let wash = ItemId::parse("FW-1").unwrap();
        let cream = ItemId::parse("FC-1").unwrap();

        // 12 + 12 > 20 even though each line fits on its own.
        let errors = v
            .plan([(wash.clone(), -12), (cream.clone(), -6), (wash.clone(), -12)])
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&StockError::InsufficientStock {
            item_id: wash.clone(),
            requested: 24,
            available: 20
        }));

        let plan = v.plan([(wash.clone(), -2), (cream.clone(), 0), (wash.clone(), -1)]).unwrap();
        assert_eq!(plan.changes().len(), 1);
        assert_eq!(plan.changes()[0].delta(), -3);
        assert_eq!(
            plan.writes(),
            vec![SheetWrite::Cell {
                row: 0,
                col: 3,
                value: "17".into()
            }]
        );
    }

    #[test]
    fn apply_commits_a_plan() {
        let mut v = view(&catalog());
        let wash = ItemId::parse("FW-1").unwrap();
        let plan = v.plan([(wash.clone(), -4)]).unwrap();

        v.apply(&plan);
        assert_eq!(v.get(&wash).unwrap().stock(), 16);
        assert_eq!(
            plan.changes()[0].undo(),
            SheetWrite::Cell {
                row: 0,
                col: 3,
                value: "20".into()
            }
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn reservations_never_leave_stock_negative(
            start in 0i64..50,
            deltas in proptest::collection::vec(-20i64..20, 1..30),
        ) {
            let start_cell = start.to_string();
            let t = table(&["Name", "Qty"], &[&["Soap", start_cell.as_str()]]);
            let mut v = view(&t);
            let id = ItemId::for_row(0);

            let mut expected = start;
            for delta in deltas {
                match v.reserve(&id, delta) {
                    Ok(level) => {
                        expected += delta;
                        prop_assert_eq!(level, expected);
                    }
                    Err(StockError::InsufficientStock { requested, available, .. }) => {
                        prop_assert!(delta < 0);
                        prop_assert_eq!(requested, -delta);
                        prop_assert!(available + delta < 0);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
                prop_assert!(v.get(&id).unwrap().stock() >= 0);
            }
        }
    }
}
