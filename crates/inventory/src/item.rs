use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use sheetkeeper_core::impl_text_id;
use sheetkeeper_schema::{ColumnRole, normalize_text};

/// Inventory item identifier.
///
/// The product id cell when the sheet has one, otherwise a positional
/// `row-<n>` id (1-based data row).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn for_row(row: usize) -> Self {
        Self(format!("row-{}", row + 1))
    }
}

impl_text_id!(ItemId, "ItemId");

/// Status words that take an item off sale.
const UNSELLABLE_STATUSES: [&str; 8] = [
    "inactive",
    "disabled",
    "archived",
    "discontinued",
    "unavailable",
    "no",
    "false",
    "0",
];

/// One row of the inventory sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: ItemId,
    row: usize,
    name: String,
    normalized_name: String,
    price: Option<Decimal>,
    stock: i64,
    attributes: BTreeMap<ColumnRole, String>,
    status: Option<String>,
}

impl InventoryItem {
    pub fn new(id: ItemId, row: usize, name: impl Into<String>, stock: i64) -> Self {
        let name = name.into().trim().to_string();
        Self {
            id,
            row,
            normalized_name: normalize_text(&name),
            name,
            price: None,
            stock,
            attributes: BTreeMap::new(),
            status: None,
        }
    }

    pub fn with_price(mut self, price: Option<Decimal>) -> Self {
        self.price = price;
        self
    }

    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.status = status.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_attribute(mut self, role: ColumnRole, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.attributes.insert(role, value.trim().to_string());
        }
        self
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// 0-based data row in the backing sheet.
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    pub fn price(&self) -> Option<Decimal> {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub(crate) fn set_stock(&mut self, stock: i64) {
        self.stock = stock;
    }

    pub fn attribute(&self, role: ColumnRole) -> Option<&str> {
        self.attributes.get(&role).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<ColumnRole, String> {
        &self.attributes
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// False when the status cell marks the item as off sale.
    pub fn is_sellable(&self) -> bool {
        self.status
            .as_deref()
            .map(normalize_text)
            .is_none_or(|s| !UNSELLABLE_STATUSES.contains(&s.as_str()))
    }
}

/// Parse a price cell, ignoring currency decoration (`"Rs. 1,200"`, `"$25.99"`).
///
/// Returns `None` for blank or non-numeric cells.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let numeric: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    let numeric = numeric.trim_end_matches('.');
    Decimal::from_str(numeric).ok()
}

/// Parse a stock cell. Blank reads as zero; whole-number decimals (`"12.0"`)
/// are accepted, anything else is rejected.
pub fn parse_stock(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    let decimal = Decimal::from_str(trimmed).ok()?;
    if decimal.fract().is_zero() {
        decimal.to_i64()
    } else {
        None
    }
}
