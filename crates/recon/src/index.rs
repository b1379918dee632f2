use std::collections::HashMap;

use crate::model::SourceTable;
use crate::normalize::{canonical_key, fold, ComparisonMode};

#[derive(Debug, Clone, PartialEq)]
struct IndexedKey {
    key: String,
    row: usize,
}

/// Case-insensitive key → first row lookup for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyIndex {
    pub source: String,
    pub key_column: String,
    entries: HashMap<String, IndexedKey>,
    /// Rows whose key was already claimed by an earlier row.
    pub shadowed: usize,
}

impl KeyIndex {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    /// Row index of the first row carrying `key`.
    pub fn row(&self, key: &str) -> Option<usize> {
        self.entries.get(&fold(key)).map(|e| e.row)
    }

    /// Keys in their original (first-seen) spelling, unordered.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|e| e.key.as_str())
    }

    /// (folded, original) pairs, unordered.
    pub(crate) fn folded_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, e)| (f.as_str(), e.key.as_str()))
    }

    pub(crate) fn row_folded(&self, folded: &str) -> Option<usize> {
        self.entries.get(folded).map(|e| e.row)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index `table` by `key_column`. Blank keys are skipped; first occurrence wins.
///
/// A key column missing from the table yields an empty index, not an error.
pub fn build_key_index(table: &SourceTable, key_column: &str, mode: ComparisonMode) -> KeyIndex {
    let mut index = KeyIndex {
        source: table.name.clone(),
        key_column: key_column.to_string(),
        entries: HashMap::with_capacity(table.row_count()),
        shadowed: 0,
    };

    let Some(col) = table.column_index(key_column) else {
        tracing::warn!(
            source = %table.name,
            key_column,
            "key column not found; source contributes no keys"
        );
        return index;
    };

    for row in 0..table.row_count() {
        let key = canonical_key(mode, key_column, table.cell(row, col));
        if key.is_empty() {
            continue;
        }
        let folded = fold(&key);
        if index.entries.contains_key(&folded) {
            index.shadowed += 1;
            continue;
        }
        index.entries.insert(folded, IndexedKey { key, row });
    }

    if index.shadowed > 0 {
        tracing::warn!(
            source = %table.name,
            shadowed = index.shadowed,
            "duplicate keys ignored; first row kept"
        );
    }
    tracing::debug!(source = %table.name, keys = index.len(), "key index built");

    index
}
