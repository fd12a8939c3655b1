//! Canonical column roles and the synonym table used to recognize them.

use serde::{Deserialize, Serialize};

/// Where a synonym may match a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Whole header or any contiguous token run inside it.
    Anywhere,
    /// Whole (normalized) header only. Used for words that are too generic to
    /// trust inside longer headers ("Order Date" is not an order id).
    ExactOnly,
}

use MatchScope::{Anywhere, ExactOnly};

/// Semantic meaning of a sheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    ProductId,
    ProductName,
    Price,
    Quantity,
    Weight,
    Color,
    Size,
    Status,
    OrderId,
    CustomerName,
    CustomerEmail,
    Address,
    Payment,
    Total,
    OrderDate,
    Notes,
}

/// Tie-break order when one header could satisfy several roles.
///
/// Identifiers and customer fields come first: a header mentioning both
/// "order" and "total" is far more often a total than an id, but that is
/// handled by synonym length; this order only decides true ties.
pub const MATCH_ORDER: [ColumnRole; 16] = [
    ColumnRole::OrderId,
    ColumnRole::ProductId,
    ColumnRole::CustomerEmail,
    ColumnRole::CustomerName,
    ColumnRole::Address,
    ColumnRole::Payment,
    ColumnRole::ProductName,
    ColumnRole::Quantity,
    ColumnRole::Price,
    ColumnRole::Total,
    ColumnRole::Status,
    ColumnRole::Weight,
    ColumnRole::Color,
    ColumnRole::Size,
    ColumnRole::OrderDate,
    ColumnRole::Notes,
];

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::ProductId => "product_id",
            ColumnRole::ProductName => "product_name",
            ColumnRole::Price => "price",
            ColumnRole::Quantity => "quantity",
            ColumnRole::Weight => "weight",
            ColumnRole::Color => "color",
            ColumnRole::Size => "size",
            ColumnRole::Status => "status",
            ColumnRole::OrderId => "order_id",
            ColumnRole::CustomerName => "customer_name",
            ColumnRole::CustomerEmail => "customer_email",
            ColumnRole::Address => "address",
            ColumnRole::Payment => "payment",
            ColumnRole::Total => "total",
            ColumnRole::OrderDate => "order_date",
            ColumnRole::Notes => "notes",
        }
    }

    /// Position in [`MATCH_ORDER`] (lower wins ties).
    pub fn priority(&self) -> usize {
        MATCH_ORDER
            .iter()
            .position(|r| r == self)
            .unwrap_or(MATCH_ORDER.len())
    }

    /// Known header spellings for this role.
    pub fn synonyms(&self) -> &'static [(&'static str, MatchScope)] {
        match self {
            ColumnRole::ProductId => &[
                ("product id", Anywhere),
                ("item id", Anywhere),
                ("sku", Anywhere),
                ("sku id", Anywhere),
                ("item code", Anywhere),
                ("product code", Anywhere),
                ("barcode", Anywhere),
                ("code", ExactOnly),
                ("id", ExactOnly),
            ],
            ColumnRole::ProductName => &[
                ("product name", Anywhere),
                ("item name", Anywhere),
                ("product title", Anywhere),
                ("sku name", Anywhere),
                ("article name", Anywhere),
                ("name", Anywhere),
                ("product", ExactOnly),
                ("item", ExactOnly),
                ("title", ExactOnly),
                ("article", ExactOnly),
                ("merchandise", ExactOnly),
            ],
            ColumnRole::Price => &[
                ("unit price", Anywhere),
                ("selling price", Anywhere),
                ("retail price", Anywhere),
                ("sale price", Anywhere),
                ("price", Anywhere),
                ("mrp", Anywhere),
                ("rate", ExactOnly),
                ("cost", ExactOnly),
                ("pkr", ExactOnly),
                ("usd", ExactOnly),
                ("inr", ExactOnly),
            ],
            ColumnRole::Quantity => &[
                ("quantity", Anywhere),
                ("qty", Anywhere),
                ("stock", Anywhere),
                ("in stock", Anywhere),
                ("available quantity", Anywhere),
                ("units", Anywhere),
                ("pieces", Anywhere),
                ("stock level", Anywhere),
                ("available", ExactOnly),
                ("inventory", ExactOnly),
                ("count", ExactOnly),
                ("availability", ExactOnly),
                ("on hand", ExactOnly),
            ],
            ColumnRole::Weight => &[
                ("weight", Anywhere),
                ("mass", Anywhere),
                ("net weight", Anywhere),
                ("volume", ExactOnly),
                ("ml", ExactOnly),
                ("grams", ExactOnly),
                ("kg", ExactOnly),
                ("oz", ExactOnly),
                ("g", ExactOnly),
            ],
            ColumnRole::Color => &[
                ("color", Anywhere),
                ("colour", Anywhere),
                ("shade", Anywhere),
            ],
            ColumnRole::Size => &[
                ("size", Anywhere),
                ("dimensions", Anywhere),
                ("variant", ExactOnly),
                ("option", ExactOnly),
            ],
            ColumnRole::Status => &[
                ("status", Anywhere),
                ("order status", Anywhere),
                ("payment status", Anywhere),
                ("stock status", Anywhere),
                ("state", Anywhere),
                ("active", ExactOnly),
                ("enabled", ExactOnly),
            ],
            ColumnRole::OrderId => &[
                ("order id", Anywhere),
                ("order no", Anywhere),
                ("order number", Anywhere),
                ("order ref", Anywhere),
                ("order reference", Anywhere),
                ("invoice no", Anywhere),
                ("invoice number", Anywhere),
                ("order", ExactOnly),
                ("invoice", ExactOnly),
            ],
            ColumnRole::CustomerName => &[
                ("customer name", Anywhere),
                ("client name", Anywhere),
                ("buyer name", Anywhere),
                ("full name", Anywhere),
                ("recipient", Anywhere),
                ("customer", ExactOnly),
                ("client", ExactOnly),
                ("buyer", ExactOnly),
            ],
            ColumnRole::CustomerEmail => &[
                ("customer email", Anywhere),
                ("email", Anywhere),
                ("e mail", Anywhere),
                ("email address", Anywhere),
                ("mail", Anywhere),
                ("contact", ExactOnly),
            ],
            ColumnRole::Address => &[
                ("customer address", Anywhere),
                ("delivery address", Anywhere),
                ("shipping address", Anywhere),
                ("address", Anywhere),
                ("delivery", ExactOnly),
                ("location", ExactOnly),
            ],
            ColumnRole::Payment => &[
                ("payment mode", Anywhere),
                ("payment method", Anywhere),
                ("payment", Anywhere),
                ("mode of payment", Anywhere),
                ("paid via", Anywhere),
                ("payment type", Anywhere),
                ("mode", ExactOnly),
                ("method", ExactOnly),
            ],
            ColumnRole::Total => &[
                ("total", Anywhere),
                ("subtotal", Anywhere),
                ("grand total", Anywhere),
                ("order total", Anywhere),
                ("total price", Anywhere),
                ("total amount", Anywhere),
                ("line total", Anywhere),
                ("amount", Anywhere),
            ],
            ColumnRole::OrderDate => &[
                ("order date", Anywhere),
                ("created at", Anywhere),
                ("ordered at", Anywhere),
                ("order time", Anywhere),
                ("timestamp", Anywhere),
                ("date", ExactOnly),
                ("time", ExactOnly),
            ],
            ColumnRole::Notes => &[
                ("notes", Anywhere),
                ("note", Anywhere),
                ("remarks", Anywhere),
                ("comments", Anywhere),
                ("instructions", Anywhere),
                ("special instructions", Anywhere),
            ],
        }
    }
}

impl core::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of sheet a header row belongs to. Decides the required roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    Inventory,
    Orders,
}

impl SheetKind {
    pub fn required_roles(&self) -> &'static [ColumnRole] {
        match self {
            SheetKind::Inventory => &[ColumnRole::ProductName, ColumnRole::Quantity],
            SheetKind::Orders => &[ColumnRole::OrderId, ColumnRole::ProductName],
        }
    }
}

impl core::fmt::Display for SheetKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SheetKind::Inventory => f.write_str("inventory"),
            SheetKind::Orders => f.write_str("orders"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::normalize::HeaderKey;

    #[test]
    fn match_order_lists_every_role_once() {
        let mut seen = MATCH_ORDER.to_vec();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), MATCH_ORDER.len());
    }

    #[test]
    fn synonyms_are_unique_across_roles() {
        let mut owner: HashMap<String, ColumnRole> = HashMap::new();
        for role in MATCH_ORDER {
            for (synonym, _) in role.synonyms() {
                let compact = HeaderKey::new(synonym).compact;
                if let Some(previous) = owner.insert(compact.clone(), role) {
                    panic!("synonym {compact:?} claimed by both {previous} and {role}");
                }
            }
        }
    }

    #[test]
    fn priorities_follow_match_order() {
        assert_eq!(ColumnRole::OrderId.priority(), 0);
        assert!(ColumnRole::ProductName.priority() < ColumnRole::Quantity.priority());
        assert_eq!(ColumnRole::Notes.priority(), MATCH_ORDER.len() - 1);
    }
}
