//! In-memory caching for registry responses.
//!
//! Several manifests usually pin the same packages, and registries such as
//! npm and RubyGems return every version of a package in one document. The
//! registry clients therefore keep what they fetched in a [`RunCache`] for
//! the lifetime of one scan.
//!
//! Nothing is written to disk: publish times are only trusted for the run
//! that fetched them.
//!
//! # Example
//!
//! ```
//! use supply_chain_guard::cache::RunCache;
//!
//! let cache: RunCache<i64> = RunCache::new();
//! cache.insert("lodash@4.17.21", 1_613_000_000_000);
//!
//! assert_eq!(cache.get("lodash@4.17.21"), Some(1_613_000_000_000));
//! assert_eq!(cache.get("lodash@4.17.20"), None);
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

/// A string-keyed cache shared by concurrent lookups.
///
/// The lock is never held across an await point, so a plain mutex is
/// enough. Two tasks missing the same key at the same time both fetch; the
/// later insert wins.
#[derive(Debug)]
pub struct RunCache<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V: Clone> Default for RunCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> RunCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a clone of the cached value, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), value);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
