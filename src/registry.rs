//! Copy-on-write lookup tables shared between request threads

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type Table<V> = Arc<HashMap<String, Arc<V>>>;

/// Case-insensitive table that readers see as immutable snapshots.
///
/// Readers clone the current snapshot under a short read lock and never
/// block on a writer building the next one. Writers are serialized.
pub struct SnapshotTable<V: ?Sized> {
    current: RwLock<Table<V>>,
    writer: Mutex<()>,
}

impl<V: ?Sized> Default for SnapshotTable<V> {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(HashMap::new())),
            writer: Mutex::new(()),
        }
    }
}

impl<V: ?Sized> SnapshotTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table as it is now; later writes do not affect it
    pub fn snapshot(&self) -> Table<V> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.snapshot().get(&key.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.snapshot().contains_key(&key.to_ascii_lowercase())
    }

    /// Insert or replace; returns the previous value
    pub fn insert(&self, key: &str, value: Arc<V>) -> Option<Arc<V>> {
        let key = key.to_ascii_lowercase();
        let mut previous = None;
        self.update(|table| previous = table.insert(key, value));
        previous
    }

    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        let key = key.to_ascii_lowercase();
        let mut previous = None;
        self.update(|table| previous = table.remove(&key));
        previous
    }

    /// Lowercased keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.snapshot().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn update(&self, change: impl FnOnce(&mut HashMap<String, Arc<V>>)) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = (*self.snapshot()).clone();
        change(&mut next);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }
}
