//! Baseline → other column correspondence inference.
//!
//! For each other source the assignment is greedy and one-to-one: baseline
//! columns are visited in header order and each claims the best-agreeing
//! unclaimed other column. Earlier baseline columns therefore win contested
//! other columns.

use std::collections::HashSet;

use crate::index::KeyIndex;
use crate::model::{MappedColumn, SourceMapping, SourceTable};
use crate::normalize::{canonical, eq_ignore_case, fold, ComparisonMode};

pub const DEFAULT_MAPPING_THRESHOLD: f64 = 0.6;

/// Index of the baseline source: the one named "Baseline", else the first.
pub fn baseline_position(sources: &[SourceTable]) -> usize {
    sources
        .iter()
        .position(|s| eq_ignore_case(&s.name, "Baseline"))
        .unwrap_or(0)
}

/// Row pairs (baseline row, other row) for keys present in both indexes.
fn shared_rows(baseline: &KeyIndex, other: &KeyIndex) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(&str, usize, usize)> = baseline
        .folded_entries()
        .filter_map(|(folded, _)| {
            let b = baseline.row_folded(folded)?;
            let o = other.row_folded(folded)?;
            Some((folded, b, o))
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs.into_iter().map(|(_, b, o)| (b, o)).collect()
}

/// Canonical cells of column `col` for each shared row, on one side.
fn column_values(
    table: &SourceTable,
    col: usize,
    rows: impl Iterator<Item = usize>,
    mode: ComparisonMode,
) -> Vec<String> {
    let header = &table.headers[col];
    rows.map(|r| canonical(mode, header, table.cell(r, col))).collect()
}

/// Agreement score of two aligned columns, or `None` when every pair is blank.
pub fn agreement_score(baseline: &[String], other: &[String]) -> Option<f64> {
    let mut same = 0usize;
    let mut total = 0usize;
    for (b, o) in baseline.iter().zip(other) {
        if b.is_empty() && o.is_empty() {
            continue;
        }
        total += 1;
        if b == o {
            same += 1;
        }
    }
    (total > 0).then(|| same as f64 / total as f64)
}

/// Infer the baseline → `other` mapping over the keys both sources share.
pub fn infer_mapping(
    baseline: &SourceTable,
    baseline_index: &KeyIndex,
    other: &SourceTable,
    other_index: &KeyIndex,
    mode: ComparisonMode,
    threshold: f64,
) -> SourceMapping {
    let shared = shared_rows(baseline_index, other_index);
    let mut mapping = SourceMapping {
        source: other.name.clone(),
        common_keys: shared.len(),
        columns: Vec::new(),
    };
    if shared.is_empty() {
        tracing::debug!(source = %other.name, "no keys shared with baseline; no mapping");
        return mapping;
    }

    let other_values: Vec<Vec<String>> = (0..other.headers.len())
        .map(|c| column_values(other, c, shared.iter().map(|p| p.1), mode))
        .collect();

    let mut used: HashSet<String> = HashSet::new();

    for (bc, b_header) in baseline.headers.iter().enumerate() {
        if b_header.trim().is_empty() {
            continue;
        }
        let b_values = column_values(baseline, bc, shared.iter().map(|p| p.0), mode);

        let mut best: Option<(usize, f64)> = None;
        for (oc, o_header) in other.headers.iter().enumerate() {
            if used.contains(&fold(o_header)) {
                continue;
            }
            let Some(score) = agreement_score(&b_values, &other_values[oc]) else {
                continue;
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((oc, score));
            }
        }

        if let Some((oc, score)) = best {
            if score >= threshold {
                let o_header = &other.headers[oc];
                used.insert(fold(o_header));
                mapping.columns.push(MappedColumn {
                    baseline_column: b_header.clone(),
                    other_column: o_header.clone(),
                    score,
                });
            }
        }
    }

    tracing::debug!(
        source = %other.name,
        common_keys = mapping.common_keys,
        mapped = mapping.columns.len(),
        "column mapping inferred"
    );
    mapping
}
