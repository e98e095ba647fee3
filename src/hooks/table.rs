//! Hook table: hook key to registered entries, in registration order.

use std::collections::HashMap;

use super::types::HookEntry;

/// Mapping from hook key to the entries registered under it.
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    by_key: HashMap<String, Vec<HookEntry>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry under its key.
    pub fn insert(&mut self, entry: HookEntry) {
        self.by_key.entry(entry.key.clone()).or_default().push(entry);
    }

    /// Entries for `key`, in registration order. Empty for unknown keys.
    pub fn get(&self, key: &str) -> &[HookEntry] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registered hook keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.by_key.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Total number of entries across all keys.
    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
