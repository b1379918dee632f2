//! Diagnostic column-overlap suggestions across source pairs.
//!
//! Unlike [`crate::mapping`], this ignores keys entirely: it compares the
//! *sets* of semantically normalized values in each column pair, so it can
//! hint at candidate key columns before any key has been chosen.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::SourceTable;
use crate::normalize::{normalize, NormalizeMode};

pub const DEFAULT_MIN_OVERLAP: usize = 5;
pub const DEFAULT_MIN_RATIO: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSuggestion {
    pub source_a: String,
    pub column_a: String,
    pub source_b: String,
    pub column_b: String,
    pub overlap: usize,
    pub ratio: f64,
}

fn distinct_values(table: &SourceTable, col: usize) -> HashSet<String> {
    let header = &table.headers[col];
    (0..table.row_count())
        .map(|r| normalize(header, table.cell(r, col), NormalizeMode::Value))
        .filter(|v| !v.trim().is_empty())
        .collect()
}

/// Column pairs whose normalized value sets overlap, best first.
///
/// `ratio` is overlap / max(|A|, |B|), rounded to four places.
pub fn suggest_mappings(tables: &[SourceTable], min_overlap: usize, min_ratio: f64) -> Vec<ColumnSuggestion> {
    let mut out = Vec::new();

    for (i, a) in tables.iter().enumerate() {
        for b in &tables[i + 1..] {
            if a.row_count() == 0 || b.row_count() == 0 {
                continue;
            }
            let sets_b: Vec<HashSet<String>> =
                (0..b.headers.len()).map(|c| distinct_values(b, c)).collect();

            for (ca, ha) in a.headers.iter().enumerate() {
                let set_a = distinct_values(a, ca);
                if set_a.is_empty() {
                    continue;
                }
                for (cb, hb) in b.headers.iter().enumerate() {
                    let set_b = &sets_b[cb];
                    if set_b.is_empty() {
                        continue;
                    }
                    let overlap = set_a.intersection(set_b).count();
                    let denom = set_a.len().max(set_b.len()) as f64;
                    let ratio = (overlap as f64 / denom * 10_000.0).round() / 10_000.0;
                    if overlap >= min_overlap && ratio >= min_ratio {
                        out.push(ColumnSuggestion {
                            source_a: a.name.clone(),
                            column_a: ha.clone(),
                            source_b: b.name.clone(),
                            column_b: hb.clone(),
                            overlap,
                            ratio,
                        });
                    }
                }
            }
        }
    }

    out.sort_by(|x, y| {
        y.overlap
            .cmp(&x.overlap)
            .then(y.ratio.partial_cmp(&x.ratio).unwrap_or(std::cmp::Ordering::Equal))
    });
    out
}
