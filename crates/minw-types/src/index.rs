//! Concurrent inverted index: key -> readers / writers

use crate::VertexId;
use dashmap::DashMap;

/// Per-key accessor lists, in insertion order
#[derive(Clone, Debug, Default)]
pub struct KeyAccessors {
    /// Vertices that read the key
    pub readers: Vec<VertexId>,
    /// Vertices that write the key
    pub writers: Vec<VertexId>,
}

/// Inverted index from key to the vertices touching it.
///
/// Populated during hypervertex construction and consumed by the conflict
/// index builder. Backed by a concurrent map so independent transactions
/// can be registered from multiple workers.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    entries: DashMap<String, KeyAccessors>,
}

impl InvertedIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reader of `key`
    pub fn add_reader(&self, key: &str, vertex: VertexId) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .readers
            .push(vertex);
    }

    /// Register a writer of `key`
    pub fn add_writer(&self, key: &str, vertex: VertexId) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .writers
            .push(vertex);
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Visit every key entry
    pub fn for_each(&self, mut f: impl FnMut(&str, &KeyAccessors)) {
        for entry in self.entries.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// Drain the index into a sorted vector of (key, accessors).
    ///
    /// Sorting keeps downstream edge insertion deterministic regardless of
    /// map iteration order.
    pub fn into_sorted(self) -> Vec<(String, KeyAccessors)> {
        let mut out: Vec<(String, KeyAccessors)> = self.entries.into_iter().collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
