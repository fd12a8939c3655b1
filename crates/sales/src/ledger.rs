//! Order Ledger View: the orders sheet projected onto [`Order`]s.
//!
//! Each order line occupies one row; all rows of an order share its id.
//! Rows are kept in sheet order. The view never performs IO: `append` and
//! `update` return the [`SheetWrite`]s that persist the change.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sheetkeeper_core::{AggregateRoot, DomainError, OrderId};
use sheetkeeper_inventory::{ItemId, parse_price};
use sheetkeeper_schema::{ColumnRole, SchemaError, SchemaMap, SheetKind, SheetWrite, Table, normalize_text};

use crate::order::{Customer, Order, OrderLine, OrderStatus};

/// Timestamp format written to the order date column.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Status written to rows an update no longer needs.
pub const SUPERSEDED: &str = "Superseded";

const ATTRIBUTE_ROLES: [ColumnRole; 3] = [ColumnRole::Weight, ColumnRole::Color, ColumnRole::Size];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("order {order_id} has malformed ledger rows: {reason}")]
    Malformed { order_id: OrderId, reason: String },

    #[error("order already exists in the ledger: {0}")]
    Duplicate(OrderId),

    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// The orders sheet cannot hold what the change needs to persist.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Where an order lives in the orders sheet (0-based data rows).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub order_id: OrderId,
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Revert {
    /// Put the previous cell value back.
    Restore(String),
    /// Detach an appended row from its order.
    Retire,
}

/// A staged ledger change: the resulting row reference and the writes that
/// persist it, in order.
///
/// Every write can be taken back with [`LedgerChange::revert`] once it has
/// landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerChange {
    pub row_ref: RowRef,
    pub writes: Vec<SheetWrite>,
    reverts: Vec<Revert>,
    retire_col: usize,
    retire_value: String,
}

impl LedgerChange {
    /// The write that undoes `writes[index]`, which landed on data row `row`.
    ///
    /// For appends `row` is the index the store reported, which can differ
    /// from the staged one when other rows were appended in between. The
    /// appended row is retired, not removed.
    pub fn revert(&self, index: usize, row: usize) -> Option<SheetWrite> {
        match (self.writes.get(index)?, self.reverts.get(index)?) {
            (SheetWrite::Cell { col, .. }, Revert::Restore(previous)) => Some(SheetWrite::Cell {
                row,
                col: *col,
                value: previous.clone(),
            }),
            _ => Some(SheetWrite::Cell {
                row,
                col: self.retire_col,
                value: self.retire_value.clone(),
            }),
        }
    }
}

/// Map a status cell to an order status.
///
/// Legacy words from hand-kept sheets are folded in; anything unrecognised
/// (including blank) reads as pending. Returns `None` for superseded rows.
pub fn parse_status(raw: &str) -> Option<OrderStatus> {
    match normalize_text(raw).as_str() {
        "superseded" => None,
        "delivered" | "completed" | "complete" | "fulfilled" | "shipped and delivered" => {
            Some(OrderStatus::Delivered)
        }
        "cancelled" | "canceled" | "void" => Some(OrderStatus::Cancelled),
        _ => Some(OrderStatus::Pending),
    }
}

fn parse_created_at(raw: &str) -> Result<Option<DateTime<Utc>>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, DATE_FORMAT) {
        return Ok(Some(naive.and_utc()));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).map(|d| d.and_utc()));
    }
    Err(format!("unreadable order date {raw:?}"))
}

/// Hand-kept rows without a quantity count as one unit. Rows under a
/// generated order id always carry the quantity they consumed.
fn parse_quantity(raw: &str, generated: bool) -> Result<u32, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return if generated {
            Err("quantity is missing".to_string())
        } else {
            Ok(1)
        };
    }
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => Err(format!("quantity {raw:?} is not a positive integer")),
        Ok(n) => Ok(n),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    rows: Vec<usize>,
    order: Order,
}

/// Projection of the orders sheet.
#[derive(Debug, Clone)]
pub struct OrderLedger {
    schema: Arc<SchemaMap>,
    cells: Vec<Vec<String>>,
    entries: BTreeMap<OrderId, Entry>,
    malformed: HashMap<OrderId, String>,
    next_row: usize,
}

impl OrderLedger {
    /// Build the ledger from the orders table that produced `schema`.
    pub fn build(schema: Arc<SchemaMap>, table: &Table) -> Self {
        let id_col = schema.required(ColumnRole::OrderId);
        let status_col = schema.column(ColumnRole::Status);

        let mut grouped: BTreeMap<OrderId, Vec<usize>> = BTreeMap::new();
        for row in 0..table.rows.len() {
            let Ok(order_id) = OrderId::parse(table.cell(row, id_col)) else {
                continue;
            };
            let superseded = status_col
                .map(|col| parse_status(table.cell(row, col)).is_none())
                .unwrap_or(false);
            if superseded {
                continue;
            }
            grouped.entry(order_id).or_default().push(row);
        }

        let mut ledger = Self {
            cells: table.rows.clone(),
            entries: BTreeMap::new(),
            malformed: HashMap::new(),
            next_row: table.rows.len(),
            schema,
        };

        for (order_id, rows) in grouped {
            match ledger.read_order(&order_id, table, &rows) {
                Ok(order) => {
                    ledger.entries.insert(order_id, Entry { rows, order });
                }
                Err(reason) => {
                    tracing::warn!(order_id = %order_id, %reason, "malformed order rows");
                    ledger.malformed.insert(order_id, reason);
                }
            }
        }

        ledger
    }

    fn read_order(&self, order_id: &OrderId, table: &Table, rows: &[usize]) -> Result<Order, String> {
        let schema = &self.schema;
        let cell = |row: usize, role: ColumnRole| {
            schema
                .column(role)
                .map(|col| table.cell(row, col).trim())
                .unwrap_or("")
        };

        let first = rows[0];
        let status = parse_status(cell(first, ColumnRole::Status)).unwrap_or(OrderStatus::Pending);
        let customer = Customer {
            name: cell(first, ColumnRole::CustomerName).to_string(),
            email: cell(first, ColumnRole::CustomerEmail).to_string(),
            address: cell(first, ColumnRole::Address).to_string(),
            payment_mode: cell(first, ColumnRole::Payment).to_string(),
        };
        let notes = Some(cell(first, ColumnRole::Notes).to_string()).filter(|n| !n.is_empty());
        let created_at = parse_created_at(cell(first, ColumnRole::OrderDate))?;

        let mut lines = Vec::with_capacity(rows.len());
        for &row in rows {
            let product_name = cell(row, ColumnRole::ProductName);
            if product_name.is_empty() {
                return Err(format!("row {} has no product name", row + 1));
            }
            let quantity = parse_quantity(cell(row, ColumnRole::Quantity), order_id.is_generated())
                .map_err(|reason| format!("row {}: {reason}", row + 1))?;
            let attributes = ATTRIBUTE_ROLES
                .into_iter()
                .filter_map(|role| {
                    let value = cell(row, role);
                    (!value.is_empty()).then(|| (role, value.to_string()))
                })
                .collect();

            lines.push(OrderLine {
                item_id: ItemId::parse(cell(row, ColumnRole::ProductId)).ok(),
                product_name: product_name.to_string(),
                quantity,
                unit_price: parse_price(cell(row, ColumnRole::Price)),
                attributes,
            });
        }

        Ok(Order::restore(
            order_id.clone(),
            status,
            lines,
            customer,
            notes,
            created_at,
        ))
    }

    pub fn schema(&self) -> &SchemaMap {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Readable orders, ordered by id.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.entries.values().map(|e| &e.order)
    }

    /// Orders whose rows could not be read.
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.entries.contains_key(order_id) || self.malformed.contains_key(order_id)
    }

    pub fn find_by_id(&self, order_id: &OrderId) -> Result<&Order, LedgerError> {
        if let Some(reason) = self.malformed.get(order_id) {
            return Err(LedgerError::Malformed {
                order_id: order_id.clone(),
                reason: reason.clone(),
            });
        }
        self.entries
            .get(order_id)
            .map(|e| &e.order)
            .ok_or_else(|| LedgerError::NotFound(order_id.clone()))
    }

    pub fn row_ref(&self, order_id: &OrderId) -> Option<RowRef> {
        self.entries.get(order_id).map(|e| RowRef {
            order_id: order_id.clone(),
            rows: e.rows.clone(),
        })
    }

    /// Column and value that detach a row from its order: the status column
    /// when there is one, otherwise a blanked order id.
    fn retirement(&self) -> (usize, String) {
        match self.schema.column(ColumnRole::Status) {
            Some(col) => (col, SUPERSEDED.to_string()),
            None => (self.schema.required(ColumnRole::OrderId), String::new()),
        }
    }

    /// Order lines can only be written where their quantity survives a re-read.
    fn ensure_lines_writable(&self) -> Result<(), LedgerError> {
        if self.schema.has(ColumnRole::Quantity) {
            return Ok(());
        }
        Err(LedgerError::Schema(SchemaError::MissingRoles {
            kind: SheetKind::Orders,
            missing: vec![ColumnRole::Quantity],
            headers: self.schema.headers().to_vec(),
        }))
    }

    fn staged(&self, row_ref: RowRef, writes: Vec<SheetWrite>, reverts: Vec<Revert>) -> LedgerChange {
        let (retire_col, retire_value) = self.retirement();
        LedgerChange {
            row_ref,
            writes,
            reverts,
            retire_col,
            retire_value,
        }
    }

    /// Stage a new order: one appended row per line.
    pub fn append(&mut self, order: &Order) -> Result<LedgerChange, LedgerError> {
        let order_id = order.id().clone();
        if self.contains(&order_id) {
            return Err(LedgerError::Duplicate(order_id));
        }
        self.ensure_lines_writable()?;

        let mut rows = Vec::with_capacity(order.lines().len());
        let mut writes = Vec::with_capacity(order.lines().len());
        for line in order.lines() {
            let values = self.render_row(order, line, None);
            rows.push(self.next_row);
            self.cells.push(values.clone());
            self.next_row += 1;
            writes.push(SheetWrite::AppendRow { values });
        }

        self.entries.insert(
            order_id.clone(),
            Entry {
                rows: rows.clone(),
                order: order.clone(),
            },
        );

        let reverts = vec![Revert::Retire; writes.len()];
        Ok(self.staged(RowRef { order_id, rows }, writes, reverts))
    }

    /// Stage a change to an existing order.
    ///
    /// `mutate` receives the current order; on success the rows are rewritten
    /// cell by cell (unchanged cells and passthrough columns are left alone),
    /// extra lines are appended and surplus rows are retired.
    pub fn update<F>(&mut self, order_id: &OrderId, mutate: F) -> Result<LedgerChange, LedgerError>
    where
        F: FnOnce(&mut Order) -> Result<(), DomainError>,
    {
        let current = self.find_by_id(order_id)?;
        let mut order = current.clone();
        mutate(&mut order)?;
        if order.lines() != current.lines() {
            self.ensure_lines_writable()?;
        }

        let old_rows = self
            .entries
            .get(order_id)
            .map(|e| e.rows.clone())
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(order.lines().len());
        let mut writes = Vec::new();
        let mut reverts = Vec::new();

        for (i, line) in order.lines().iter().enumerate() {
            match old_rows.get(i) {
                Some(&row) => {
                    let current = self.cells.get(row).cloned().unwrap_or_default();
                    let values = self.render_row(&order, line, Some(&current));
                    for (col, value) in values.iter().enumerate() {
                        let previous = current.get(col).map(String::as_str).unwrap_or("");
                        if previous != value {
                            writes.push(SheetWrite::Cell {
                                row,
                                col,
                                value: value.clone(),
                            });
                            reverts.push(Revert::Restore(previous.to_string()));
                        }
                    }
                    if let Some(slot) = self.cells.get_mut(row) {
                        *slot = values;
                    }
                    rows.push(row);
                }
                None => {
                    let values = self.render_row(&order, line, None);
                    rows.push(self.next_row);
                    self.cells.push(values.clone());
                    self.next_row += 1;
                    writes.push(SheetWrite::AppendRow { values });
                    reverts.push(Revert::Retire);
                }
            }
        }

        let (retire_col, retire_value) = self.retirement();
        for &row in old_rows.iter().skip(order.lines().len()) {
            let mut previous = String::new();
            if let Some(slot) = self.cells.get_mut(row).and_then(|cells| cells.get_mut(retire_col)) {
                previous = std::mem::replace(slot, retire_value.clone());
            }
            writes.push(SheetWrite::Cell {
                row,
                col: retire_col,
                value: retire_value.clone(),
            });
            reverts.push(Revert::Restore(previous));
        }

        self.entries.insert(
            order_id.clone(),
            Entry {
                rows: rows.clone(),
                order,
            },
        );

        let row_ref = RowRef {
            order_id: order_id.clone(),
            rows,
        };
        Ok(self.staged(row_ref, writes, reverts))
    }

    /// Cell values of one order line, laid out by the orders schema.
    fn render_row(&self, order: &Order, line: &OrderLine, current: Option<&Vec<String>>) -> Vec<String> {
        let width = self.schema.width();
        let mut values: Vec<String> = match current {
            Some(existing) => {
                let mut v = existing.clone();
                v.resize(width, String::new());
                v
            }
            None => vec![String::new(); width],
        };

        let customer = order.customer();
        for (role, col) in self.schema.roles() {
            let value = match role {
                ColumnRole::OrderId => order.id().to_string(),
                ColumnRole::ProductId => line
                    .item_id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                ColumnRole::ProductName => line.product_name.clone(),
                ColumnRole::Quantity => line.quantity.to_string(),
                ColumnRole::Price => line.unit_price.map(|p| p.to_string()).unwrap_or_default(),
                ColumnRole::Total => line.line_total().map(|t| t.to_string()).unwrap_or_default(),
                ColumnRole::Status => order.status().as_str().to_string(),
                ColumnRole::CustomerName => customer.name.clone(),
                ColumnRole::CustomerEmail => customer.email.clone(),
                ColumnRole::Address => customer.address.clone(),
                ColumnRole::Payment => customer.payment_mode.clone(),
                ColumnRole::OrderDate => order
                    .created_at()
                    .map(|t| t.format(DATE_FORMAT).to_string())
                    .unwrap_or_else(|| values[col].clone()),
                ColumnRole::Notes => order.notes().unwrap_or_default().to_string(),
                ColumnRole::Weight | ColumnRole::Color | ColumnRole::Size => {
                    line.attributes.get(&role).cloned().unwrap_or_default()
                }
            };
            values[col] = value;
        }

        values
    }
}
