use std::collections::BTreeMap;

use crate::cancel::CancelToken;
use crate::error::ReconError;
use crate::index::KeyIndex;
use crate::model::{MissingKeys, PresenceRecord, SourceFlag};

/// A key from the union of all sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseKey {
    /// Case-folded form, used for lookup and ordering.
    pub folded: String,
    /// Spelling from the first source (input order) that has the key.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceOutput {
    pub presence: Vec<PresenceRecord>,
    pub matches_all: Vec<String>,
    pub missing_by_source: Vec<MissingKeys>,
}

/// Case-insensitive union of every index's keys, in case-insensitive ordinal order.
pub fn all_keys(indexes: &[KeyIndex]) -> Vec<UniverseKey> {
    let mut union: BTreeMap<&str, &str> = BTreeMap::new();
    for index in indexes {
        for (folded, key) in index.folded_entries() {
            union.entry(folded).or_insert(key);
        }
    }
    union
        .into_iter()
        .map(|(folded, key)| UniverseKey {
            folded: folded.to_string(),
            key: key.to_string(),
        })
        .collect()
}

/// Per-key presence flags, keys present everywhere, and keys missing per source.
pub fn analyze_presence(
    indexes: &[KeyIndex],
    keys: &[UniverseKey],
    cancel: &CancelToken,
) -> Result<PresenceOutput, ReconError> {
    let mut presence = Vec::with_capacity(keys.len());
    let mut matches_all = Vec::new();
    let mut missing: Vec<Vec<String>> = vec![Vec::new(); indexes.len()];

    for uk in keys {
        cancel.check()?;
        let mut flags = Vec::with_capacity(indexes.len());
        let mut everywhere = true;
        for (i, index) in indexes.iter().enumerate() {
            let present = index.row_folded(&uk.folded).is_some();
            if !present {
                everywhere = false;
                missing[i].push(uk.key.clone());
            }
            flags.push(SourceFlag {
                source: index.source.clone(),
                present,
            });
        }
        if everywhere {
            matches_all.push(uk.key.clone());
        }
        presence.push(PresenceRecord {
            key: uk.key.clone(),
            presence: flags,
        });
    }

    let missing_by_source = indexes
        .iter()
        .zip(missing)
        .map(|(index, keys)| MissingKeys {
            source: index.source.clone(),
            keys,
        })
        .collect();

    tracing::debug!(
        keys = keys.len(),
        matches_all = matches_all.len(),
        "presence analyzed"
    );

    Ok(PresenceOutput {
        presence,
        matches_all,
        missing_by_source,
    })
}
