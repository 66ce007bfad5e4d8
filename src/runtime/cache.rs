//! Cache of instrumented module values, keyed by file path.
//!
//! No eviction: test processes are short-lived, so entries live for the
//! process. Hit/miss counters and entry timestamps are exposed read-only
//! for diagnostics.

use chrono::{DateTime, Utc};
use mlua::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
struct CacheEntry {
    value: Value,
    inserted_at: DateTime<Utc>,
}

/// Read-only statistics view.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub created_at: DateTime<Utc>,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
pub struct ModuleCache {
    entries: HashMap<PathBuf, CacheEntry>,
    hits: u64,
    misses: u64,
    created_at: DateTime<Utc>,
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            created_at: Utc::now(),
        }
    }

    pub fn add(&mut self, file_path: &Path, module: Value) {
        self.entries.insert(
            file_path.to_path_buf(),
            CacheEntry {
                value: module,
                inserted_at: Utc::now(),
            },
        );
    }

    /// Look up a cached module value, counting the hit or miss.
    pub fn get(&mut self, file_path: &Path) -> Option<Value> {
        match self.entries.get(file_path) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn remove(&mut self, file_path: &Path) -> Option<Value> {
        self.entries.remove(file_path).map(|e| e.value)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn inserted_at(&self, file_path: &Path) -> Option<DateTime<Utc>> {
        self.entries.get(file_path).map(|e| e.inserted_at)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            created_at: self.created_at,
        }
    }
}
