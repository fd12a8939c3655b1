//! Header row → [`SchemaMap`] inference.
//!
//! Two passes over the headers, both left to right:
//!
//! 1. exact: the header's compact form equals a synonym's compact form;
//! 2. partial: a synonym (scope `Anywhere`) appears as a contiguous token run
//!    inside the header. Only roles still unassigned after pass 1 compete.
//!
//! A role is taken by the first header that claims it; later claimants become
//! passthrough columns. Everything is a pure function of the header row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::HeaderKey;
use crate::role::{ColumnRole, MATCH_ORDER, MatchScope, SheetKind};

/// How a column was bound to its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMatch {
    pub index: usize,
    pub kind: MatchKind,
}

/// Stable digest of a header row; changes whenever any header text changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSignature(String);

impl HeaderSignature {
    pub fn of(headers: &[String]) -> Self {
        let mut hasher = Sha256::new();
        for (i, header) in headers.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(header.trim().as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{kind} sheet has no header row")]
    EmptyHeader { kind: SheetKind },

    #[error("{kind} sheet is missing required column(s): {}", join_roles(.missing))]
    MissingRoles {
        kind: SheetKind,
        missing: Vec<ColumnRole>,
        headers: Vec<String>,
    },
}

fn join_roles(roles: &[ColumnRole]) -> String {
    roles
        .iter()
        .map(ColumnRole::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolved column layout of one sheet version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMap {
    kind: SheetKind,
    headers: Vec<String>,
    signature: HeaderSignature,
    columns: BTreeMap<ColumnRole, ColumnMatch>,
    passthrough: Vec<usize>,
}

impl SchemaMap {
    pub fn kind(&self) -> SheetKind {
        self.kind
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn signature(&self) -> &HeaderSignature {
        &self.signature
    }

    /// Column index bound to `role`, if any.
    pub fn column(&self, role: ColumnRole) -> Option<usize> {
        self.columns.get(&role).map(|m| m.index)
    }

    pub fn match_for(&self, role: ColumnRole) -> Option<ColumnMatch> {
        self.columns.get(&role).copied()
    }

    pub fn has(&self, role: ColumnRole) -> bool {
        self.columns.contains_key(&role)
    }

    /// Column index of a role that inference guaranteed to be present.
    ///
    /// Falls back to `usize::MAX` (which reads as an empty cell) for roles
    /// the sheet kind does not require; call [`SchemaMap::column`] for those.
    pub fn required(&self, role: ColumnRole) -> usize {
        self.column(role).unwrap_or(usize::MAX)
    }

    /// Roles in column order.
    pub fn roles(&self) -> Vec<(ColumnRole, usize)> {
        let mut out: Vec<_> = self.columns.iter().map(|(r, m)| (*r, m.index)).collect();
        out.sort_by_key(|(_, idx)| *idx);
        out
    }

    /// Columns that matched no role, kept so writers preserve them.
    pub fn passthrough(&self) -> &[usize] {
        &self.passthrough
    }

    /// Number of columns in the header row.
    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

/// Infer the column layout of a sheet from its header row.
pub fn infer(kind: SheetKind, headers: &[String]) -> Result<SchemaMap, SchemaError> {
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(SchemaError::EmptyHeader { kind });
    }

    let keys: Vec<HeaderKey> = headers.iter().map(|h| HeaderKey::new(h)).collect();
    let mut columns: BTreeMap<ColumnRole, ColumnMatch> = BTreeMap::new();
    let mut bound = vec![false; headers.len()];

    // Pass 1: exact. Each header is examined once; a header whose exact role
    // is already taken is left for neither pass.
    let mut settled = vec![false; headers.len()];
    for (index, key) in keys.iter().enumerate() {
        if key.is_empty() {
            settled[index] = true;
            continue;
        }
        let Some(role) = exact_role(key) else {
            continue;
        };
        settled[index] = true;
        if columns.contains_key(&role) {
            tracing::debug!(header = %headers[index], %role, "role already bound; passthrough");
            continue;
        }
        columns.insert(
            role,
            ColumnMatch {
                index,
                kind: MatchKind::Exact,
            },
        );
        bound[index] = true;
    }

    // Pass 2: partial, over headers that had no exact synonym at all.
    for (index, key) in keys.iter().enumerate() {
        if settled[index] {
            continue;
        }
        if let Some(role) = best_partial_role(key, &columns) {
            columns.insert(
                role,
                ColumnMatch {
                    index,
                    kind: MatchKind::Partial,
                },
            );
            bound[index] = true;
        }
    }

    let missing: Vec<ColumnRole> = kind
        .required_roles()
        .iter()
        .copied()
        .filter(|role| !columns.contains_key(role))
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::MissingRoles {
            kind,
            missing,
            headers: headers.to_vec(),
        });
    }

    let passthrough = bound
        .iter()
        .enumerate()
        .filter(|(_, b)| !**b)
        .map(|(i, _)| i)
        .collect();

    Ok(SchemaMap {
        kind,
        headers: headers.to_vec(),
        signature: HeaderSignature::of(headers),
        columns,
        passthrough,
    })
}

fn exact_role(key: &HeaderKey) -> Option<ColumnRole> {
    MATCH_ORDER.into_iter().find(|role| {
        role.synonyms()
            .iter()
            .any(|(syn, _)| key.matches_exactly(&HeaderKey::new(syn)))
    })
}

fn best_partial_role(
    key: &HeaderKey,
    taken: &BTreeMap<ColumnRole, ColumnMatch>,
) -> Option<ColumnRole> {
    // (token count, char length, priority) of the best synonym per role.
    let mut best: Option<(usize, usize, usize, ColumnRole)> = None;

    for role in MATCH_ORDER {
        if taken.contains_key(&role) {
            continue;
        }
        for (syn, scope) in role.synonyms() {
            if *scope != MatchScope::Anywhere {
                continue;
            }
            let syn_key = HeaderKey::new(syn);
            if !key.contains_run(&syn_key) {
                continue;
            }
            let candidate = (syn_key.tokens.len(), syn_key.compact.len(), role.priority(), role);
            let better = match &best {
                None => true,
                Some((tokens, chars, priority, _)) => {
                    (candidate.0, candidate.1) > (*tokens, *chars)
                        || ((candidate.0, candidate.1) == (*tokens, *chars) && candidate.2 < *priority)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
    }

    best.map(|(_, _, _, role)| role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn infers_a_typical_inventory_sheet() {
        let map = infer(
            SheetKind::Inventory,
            &headers(&["SKU", "Item Name", "Price (PKR)", "Qty", "Weight", "Status", "Supplier"]),
        )
        .unwrap();

        assert_eq!(map.column(ColumnRole::ProductId), Some(0));
        assert_eq!(map.column(ColumnRole::ProductName), Some(1));
        assert_eq!(map.column(ColumnRole::Price), Some(2));
        assert_eq!(map.column(ColumnRole::Quantity), Some(3));
        assert_eq!(map.column(ColumnRole::Weight), Some(4));
        assert_eq!(map.column(ColumnRole::Status), Some(5));
        assert_eq!(map.passthrough(), &[6]);
        assert_eq!(map.match_for(ColumnRole::Price).unwrap().kind, MatchKind::Partial);
        assert_eq!(map.match_for(ColumnRole::Quantity).unwrap().kind, MatchKind::Exact);
    }

    #[test]
    fn exact_match_beats_an_earlier_partial_match() {
        // "Stock Level Memo" would partially match Quantity, but the later
        // "Stock" header is an exact match and must win.
        let map = infer(
            SheetKind::Inventory,
            &headers(&["Product", "Stock Level Memo", "Stock"]),
        )
        .unwrap();
        assert_eq!(map.column(ColumnRole::Quantity), Some(2));
        assert_eq!(map.passthrough(), &[1]);
    }

    #[test]
    fn first_exact_header_wins_duplicates() {
        let map = infer(
            SheetKind::Inventory,
            &headers(&["Name", "Quantity", "Qty"]),
        )
        .unwrap();
        assert_eq!(map.column(ColumnRole::Quantity), Some(1));
        assert_eq!(map.passthrough(), &[2]);
    }

    #[test]
    fn generic_words_do_not_match_inside_longer_headers() {
        let map = infer(
            SheetKind::Orders,
            &headers(&["Order ID", "Product", "Order Qty", "Delivery Date", "Email Address"]),
        )
        .unwrap();
        assert_eq!(map.column(ColumnRole::OrderId), Some(0));
        assert_eq!(map.column(ColumnRole::Quantity), Some(2));
        assert_eq!(map.column(ColumnRole::OrderDate), None);
        assert_eq!(map.column(ColumnRole::Address), None);
        assert_eq!(map.column(ColumnRole::CustomerEmail), Some(4));
        assert_eq!(map.passthrough(), &[3]);
    }

    #[test]
    fn longer_synonym_wins_a_partial_contest() {
        let map = infer(
            SheetKind::Orders,
            &headers(&["Order No", "Item", "Customer Payment Mode"]),
        )
        .unwrap();
        assert_eq!(map.column(ColumnRole::Payment), Some(2));
        assert_eq!(map.match_for(ColumnRole::Payment).unwrap().kind, MatchKind::Partial);
    }

    #[test]
    fn missing_required_roles_are_reported_together() {
        let err = infer(SheetKind::Orders, &headers(&["Customer", "Total"])).unwrap_err();
        match err {
            SchemaError::MissingRoles { kind, missing, .. } => {
                assert_eq!(kind, SheetKind::Orders);
                assert_eq!(missing, vec![ColumnRole::OrderId, ColumnRole::ProductName]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_header_row_is_rejected() {
        assert_eq!(
            infer(SheetKind::Inventory, &headers(&["", "  "])),
            Err(SchemaError::EmptyHeader {
                kind: SheetKind::Inventory
            })
        );
    }

    #[test]
    fn signature_ignores_surrounding_whitespace_only() {
        let a = HeaderSignature::of(&headers(&["Name", "Qty"]));
        let b = HeaderSignature::of(&headers(&[" Name ", "Qty"]));
        let c = HeaderSignature::of(&headers(&["Name", "Quantity"]));
        let d = HeaderSignature::of(&headers(&["NameQty"]));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), 64);
    }

    fn case_and_spacing_variant(word: &'static str) -> impl Strategy<Value = String> {
        (
            proptest::collection::vec(any::<bool>(), word.len()),
            "[ \t]{0,3}",
            "[ \t]{0,3}",
        )
            .prop_map(move |(upper, lead, trail)| {
                let body: String = word
                    .chars()
                    .zip(upper)
                    .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                    .collect();
                format!("{lead}{body}{trail}")
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn quantity_synonyms_survive_case_and_spacing(
            header in prop_oneof![
                case_and_spacing_variant("qty"),
                case_and_spacing_variant("quantity"),
                case_and_spacing_variant("stock"),
            ]
        ) {
            let map = infer(SheetKind::Inventory, &[String::from("Product Name"), header]).unwrap();
            prop_assert_eq!(map.column(ColumnRole::Quantity), Some(1));
        }

        #[test]
        fn inference_is_deterministic(
            raw in proptest::collection::vec("[A-Za-z ()_-]{0,16}", 1..10)
        ) {
            let first = infer(SheetKind::Inventory, &raw);
            let second = infer(SheetKind::Inventory, &raw);
            prop_assert_eq!(first, second);
        }
    }
}
