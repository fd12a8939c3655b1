//! Per-sheet cache of inferred schemas.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::infer::{HeaderSignature, SchemaError, SchemaMap, infer};
use crate::role::SheetKind;
use crate::sheet::SheetRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Owned cache of [`SchemaMap`]s keyed by sheet identity.
///
/// An entry is reused only while the sheet's header signature is unchanged;
/// a different header row triggers re-inference and replaces the entry.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<SheetRef, Arc<SchemaMap>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schema for `sheet`, re-inferring when `headers` changed.
    ///
    /// Failed inference is not cached; the stale entry (if any) is dropped so
    /// a fixed sheet is picked up on the next call.
    pub fn resolve(
        &self,
        sheet: &SheetRef,
        kind: SheetKind,
        headers: &[String],
    ) -> Result<Arc<SchemaMap>, SchemaError> {
        let signature = HeaderSignature::of(headers);

        if let Ok(entries) = self.entries.read() {
            if let Some(map) = entries.get(sheet) {
                if map.signature() == &signature && map.kind() == kind {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(map));
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let inferred = infer(kind, headers);

        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match inferred {
            Ok(map) => {
                let map = Arc::new(map);
                if entries.insert(sheet.clone(), Arc::clone(&map)).is_some() {
                    tracing::info!(%sheet, signature = %signature.as_str(), "header row changed; schema re-inferred");
                }
                Ok(map)
            }
            Err(err) => {
                entries.remove(sheet);
                Err(err)
            }
        }
    }

    pub fn invalidate(&self, sheet: &SheetRef) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(sheet);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().map(|e| e.len()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColumnRole;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn same_header_row_is_served_from_cache() {
        let cache = SchemaCache::new();
        let sheet = SheetRef::new("wb", "Inventory");
        let row = headers(&["Name", "Qty"]);

        let first = cache.resolve(&sheet, SheetKind::Inventory, &row).unwrap();
        let second = cache.resolve(&sheet, SheetKind::Inventory, &row).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn changed_header_row_triggers_reinference() {
        let cache = SchemaCache::new();
        let sheet = SheetRef::new("wb", "Inventory");

        let before = cache
            .resolve(&sheet, SheetKind::Inventory, &headers(&["Name", "Qty"]))
            .unwrap();
        let after = cache
            .resolve(&sheet, SheetKind::Inventory, &headers(&["Qty", "Name"]))
            .unwrap();

        assert_eq!(before.column(ColumnRole::Quantity), Some(1));
        assert_eq!(after.column(ColumnRole::Quantity), Some(0));
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn failed_inference_evicts_the_stale_entry() {
        let cache = SchemaCache::new();
        let sheet = SheetRef::new("wb", "Inventory");
        cache
            .resolve(&sheet, SheetKind::Inventory, &headers(&["Name", "Qty"]))
            .unwrap();

        assert!(
            cache
                .resolve(&sheet, SheetKind::Inventory, &headers(&["Name"]))
                .is_err()
        );
        assert_eq!(cache.stats().entries, 0);

        cache.invalidate(&sheet);
        assert_eq!(cache.stats().entries, 0);
    }
}
