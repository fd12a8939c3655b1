//! Submission fingerprints for duplicate detection.
//!
//! Two requests share a fingerprint when they come from the same customer
//! (name and email, case/spacing-insensitive) and ask for the same products
//! in the same total quantities, regardless of line order or splitting.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use sheetkeeper_schema::normalize_text;

use crate::request::OrderRequest;

const FIELD_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &OrderRequest) -> Self {
        let mut products: BTreeMap<String, i64> = BTreeMap::new();
        for line in &request.lines {
            let total = products.entry(normalize_text(&line.product)).or_insert(0);
            *total = total.saturating_add(line.quantity);
        }

        let mut hasher = Sha256::new();
        hasher.update(normalize_text(&request.customer.name).as_bytes());
        hasher.update([FIELD_SEP]);
        hasher.update(request.customer.email.trim().to_lowercase().as_bytes());
        for (product, quantity) in &products {
            hasher.update([RECORD_SEP]);
            hasher.update(product.as_bytes());
            hasher.update([FIELD_SEP]);
            hasher.update(quantity.to_string().as_bytes());
        }

        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Short form is enough to correlate log lines.
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}
