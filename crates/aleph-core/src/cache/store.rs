use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::ModuleRecord;

/// Shared module registry keyed by specifier.
///
/// Whole records are swapped under a short lock, so a reader observes either
/// the previous record or the new one. Concurrent writers for the same
/// specifier resolve as last-write-wins.
#[derive(Debug, Default)]
pub struct ModuleStore {
    modules: RwLock<FxHashMap<String, Arc<ModuleRecord>>>,
}

impl ModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, specifier: &str) -> Option<Arc<ModuleRecord>> {
        self.modules.read().get(specifier).cloned()
    }

    /// Store `record`, returning the record it replaced
    pub fn insert(&self, record: impl Into<Arc<ModuleRecord>>) -> Option<Arc<ModuleRecord>> {
        let record = record.into();
        self.modules
            .write()
            .insert(record.specifier.clone(), record)
    }

    pub fn remove(&self, specifier: &str) -> Option<Arc<ModuleRecord>> {
        self.modules.write().remove(specifier)
    }

    pub fn find<F>(&self, predicate: F) -> Option<Arc<ModuleRecord>>
    where
        F: Fn(&ModuleRecord) -> bool,
    {
        self.modules
            .read()
            .values()
            .find(|record| predicate(record))
            .cloned()
    }

    pub fn find_by_js_file(&self, js_file: &str) -> Option<Arc<ModuleRecord>> {
        self.find(|record| record.js_file == js_file)
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.modules.read().contains_key(specifier)
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_whole_record() {
        let store = ModuleStore::new();
        store.insert(ModuleRecord::new("/pages/a.tsx", "v1", "h1".into()));
        let before = store.get("/pages/a.tsx").unwrap();

        let replaced = store.insert(ModuleRecord::new("/pages/a.tsx", "v2", "h2".into()));
        assert_eq!(replaced.unwrap().code.as_ref(), "v1");

        // readers holding the old record keep a consistent view
        assert_eq!(before.code.as_ref(), "v1");
        assert_eq!(before.source_hash, "h1");
        assert_eq!(store.get("/pages/a.tsx").unwrap().code.as_ref(), "v2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_find_by_js_file() {
        let store = ModuleStore::new();
        store.insert(ModuleRecord::new("/pages/a.tsx", "a", "h".into()));
        store.insert(ModuleRecord::new("/style/app.css", "css", "h".into()));

        assert_eq!(
            store.find_by_js_file("/pages/a.js").unwrap().specifier,
            "/pages/a.tsx"
        );
        assert_eq!(
            store.find_by_js_file("/style/app.css.js").unwrap().specifier,
            "/style/app.css"
        );
        assert!(store.find_by_js_file("/pages/b.js").is_none());
        assert!(store.remove("/pages/a.tsx").is_some());
        assert!(!store.contains("/pages/a.tsx"));
    }
}
