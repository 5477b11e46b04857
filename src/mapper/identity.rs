//! One old-id -> new-id table.

use crate::error::{ImportError, Result};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default)]
struct Entry {
    old_name: Option<String>,
    new_id: Option<String>,
    required: bool,
}

/// Identity map for one entity category.
///
/// Readers never block each other; a new id, once assigned, is never
/// replaced for the rest of the run.
#[derive(Debug)]
pub struct IdentityMap {
    category: &'static str,
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl IdentityMap {
    #[must_use]
    pub const fn new(category: &'static str) -> Self {
        Self {
            category,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub const fn category(&self) -> &'static str {
        self.category
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an old id and (optionally) its display name.
    ///
    /// A known name is never erased by a later registration without one.
    pub fn register_old_value(&self, old_id: &str, old_name: Option<&str>) {
        let mut entries = self.write();
        let entry = entries.entry(old_id.to_string()).or_default();
        if let Some(name) = old_name.filter(|name| !name.is_empty()) {
            entry.old_name = Some(name.to_string());
        }
    }

    /// Mark an old id as referenced by data being imported.
    pub fn flag_required(&self, old_id: &str) {
        self.write().entry(old_id.to_string()).or_default().required = true;
    }

    /// Assign the destination id for `old_id`.
    ///
    /// Re-mapping to the same id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::MappingConflict`] if `old_id` already maps to a
    /// different destination id.
    pub fn map_value(&self, old_id: &str, new_id: &str) -> Result<()> {
        let mut entries = self.write();
        let entry = entries.entry(old_id.to_string()).or_default();
        match &entry.new_id {
            Some(existing) if existing == new_id => Ok(()),
            Some(existing) => Err(ImportError::MappingConflict {
                category: self.category,
                old_id: old_id.to_string(),
                existing: existing.clone(),
                attempted: new_id.to_string(),
            }),
            None => {
                entry.new_id = Some(new_id.to_string());
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get_mapped_id(&self, old_id: &str) -> Option<String> {
        self.read().get(old_id).and_then(|entry| entry.new_id.clone())
    }

    /// Old display name, falling back to the old id.
    #[must_use]
    pub fn get_display_name(&self, old_id: &str) -> String {
        self.read()
            .get(old_id)
            .and_then(|entry| entry.old_name.clone())
            .unwrap_or_else(|| old_id.to_string())
    }

    #[must_use]
    pub fn old_name(&self, old_id: &str) -> Option<String> {
        self.read().get(old_id).and_then(|entry| entry.old_name.clone())
    }

    /// Every destination id assigned so far, in old-id order.
    #[must_use]
    pub fn get_all_mapped_ids(&self) -> Vec<String> {
        self.read()
            .values()
            .filter_map(|entry| entry.new_id.clone())
            .collect()
    }

    #[must_use]
    pub fn registered_old_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn required_old_ids(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|(_, entry)| entry.required)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Required old ids that have no destination id yet.
    #[must_use]
    pub fn unmapped_required(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|(_, entry)| entry.required && entry.new_id.is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[must_use]
    pub fn is_required(&self, old_id: &str) -> bool {
        self.read().get(old_id).is_some_and(|entry| entry.required)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn map_is_idempotent_and_refuses_reassignment() {
        let map = IdentityMap::new("issue");
        map.map_value("100", "9001").unwrap();
        map.map_value("100", "9001").unwrap();
        let err = map.map_value("100", "9002").unwrap_err();
        assert!(matches!(err, ImportError::MappingConflict { .. }));
        assert_eq!(map.get_mapped_id("100").as_deref(), Some("9001"));
    }

    #[test]
    fn names_are_not_erased() {
        let map = IdentityMap::new("status");
        map.register_old_value("1", Some("Open"));
        map.register_old_value("1", None);
        assert_eq!(map.get_display_name("1"), "Open");
        assert_eq!(map.get_display_name("2"), "2");
    }

    #[test]
    fn unmapped_required_lists_only_required() {
        let map = IdentityMap::new("priority");
        map.register_old_value("1", Some("Major"));
        map.register_old_value("2", Some("Minor"));
        map.flag_required("2");
        map.flag_required("3");
        map.map_value("3", "30").unwrap();
        assert_eq!(map.unmapped_required(), vec!["2".to_string()]);
        assert!(map.is_required("3"));
        assert!(!map.is_required("1"));
    }

    #[test]
    fn concurrent_writers_keep_every_mapping() {
        let map = Arc::new(IdentityMap::new("comment"));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..100 {
                        let old = format!("{worker}-{i}");
                        map.map_value(&old, &format!("new-{old}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.get_all_mapped_ids().len(), 400);
    }

    proptest! {
        #[test]
        fn resolution_is_stable(ids in proptest::collection::hash_map("[a-z0-9]{1,8}", "[0-9]{1,6}", 1..50)) {
            let map = IdentityMap::new("issue");
            for (old, new) in &ids {
                map.map_value(old, new).unwrap();
            }
            for (old, new) in &ids {
                prop_assert_eq!(map.get_mapped_id(old), Some(new.clone()));
                prop_assert!(map.map_value(old, new).is_ok());
                prop_assert_eq!(map.get_mapped_id(old), Some(new.clone()));
            }
        }
    }
}
