use crate::cancel::CancelToken;
use crate::error::ReconError;
use crate::index::KeyIndex;
use crate::model::{DeltaRecord, SourceCount, SourceMapping, SourceTable};
use crate::normalize::{canonical, ComparisonMode};
use crate::presence::UniverseKey;

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaOutput {
    pub deltas: Vec<DeltaRecord>,
    pub total_cells: usize,
    /// One entry per other source, in input order.
    pub cells_by_source: Vec<SourceCount>,
}

/// One other source as seen by the delta scan.
pub struct OtherSide<'a> {
    pub table: &'a SourceTable,
    pub index: &'a KeyIndex,
    pub mapping: &'a SourceMapping,
}

/// Compare every baseline cell against its mapped cell in each other source.
///
/// Walks all keys (not only shared ones): a key missing from a side reads as
/// blank there, so baseline-only keys show up against empty columns.
pub fn detect_deltas(
    baseline: &SourceTable,
    baseline_index: &KeyIndex,
    others: &[OtherSide<'_>],
    keys: &[UniverseKey],
    mode: ComparisonMode,
    cancel: &CancelToken,
) -> Result<DeltaOutput, ReconError> {
    // Resolve (other column index, header) per (other, baseline column) once.
    let targets: Vec<Vec<Option<(usize, &str)>>> = others
        .iter()
        .map(|o| {
            baseline
                .headers
                .iter()
                .map(|b| {
                    o.mapping.target(b).and_then(|m| {
                        o.table
                            .column_index(&m.other_column)
                            .map(|c| (c, o.table.headers[c].as_str()))
                    })
                })
                .collect()
        })
        .collect();

    let mut deltas = Vec::new();
    let mut counts = vec![0usize; others.len()];

    for uk in keys {
        cancel.check()?;
        let base_row = baseline_index.row_folded(&uk.folded);
        let other_rows: Vec<Option<usize>> =
            others.iter().map(|o| o.index.row_folded(&uk.folded)).collect();

        for (bc, b_header) in baseline.headers.iter().enumerate() {
            let baseline_value = base_row
                .map(|r| baseline.cell(r, bc).trim())
                .unwrap_or("");
            let base_canon = canonical(mode, b_header, baseline_value);

            let mut other_values = Vec::with_capacity(others.len());
            let mut mismatched = Vec::new();

            for (oi, other) in others.iter().enumerate() {
                let resolved = match (other_rows[oi], targets[oi][bc]) {
                    (Some(row), Some((col, header))) => Some((other.table.cell(row, col).trim(), header)),
                    _ => None,
                };
                let (value, other_canon) = match resolved {
                    Some((v, header)) => (v, canonical(mode, header, v)),
                    None => ("", String::new()),
                };
                if other_canon != base_canon && !(other_canon.is_empty() && base_canon.is_empty()) {
                    mismatched.push(oi);
                }
                other_values.push(value.to_string());
            }

            if mismatched.is_empty() {
                continue;
            }
            for oi in mismatched {
                counts[oi] += 1;
            }
            deltas.push(DeltaRecord {
                key: uk.key.clone(),
                column: b_header.clone(),
                baseline_value: baseline_value.to_string(),
                other_values,
            });
        }
    }

    let total_cells = counts.iter().sum();
    let cells_by_source = others
        .iter()
        .zip(counts)
        .map(|(o, count)| SourceCount {
            source: o.table.name.clone(),
            count,
        })
        .collect();

    tracing::debug!(rows = deltas.len(), cells = total_cells, "deltas detected");

    Ok(DeltaOutput {
        deltas,
        total_cells,
        cells_by_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_key_index;
    use crate::mapping::{infer_mapping, DEFAULT_MAPPING_THRESHOLD};
    use crate::presence::all_keys;

    fn scan(baseline: &SourceTable, others: &[SourceTable]) -> DeltaOutput {
        let bi = build_key_index(baseline, "Key", ComparisonMode::Plain);
        let ois: Vec<KeyIndex> = others
            .iter()
            .map(|o| build_key_index(o, "Key", ComparisonMode::Plain))
            .collect();
        let maps: Vec<SourceMapping> = others
            .iter()
            .zip(&ois)
            .map(|(o, oi)| infer_mapping(baseline, &bi, o, oi, ComparisonMode::Plain, DEFAULT_MAPPING_THRESHOLD))
            .collect();
        let sides: Vec<OtherSide<'_>> = others
            .iter()
            .zip(&ois)
            .zip(&maps)
            .map(|((table, index), mapping)| OtherSide { table, index, mapping })
            .collect();
        let mut all = vec![bi.clone()];
        all.extend(ois.iter().cloned());
        let keys = all_keys(&all);
        detect_deltas(baseline, &bi, &sides, &keys, ComparisonMode::Plain, &CancelToken::new()).unwrap()
    }

    #[test]
    fn equal_mapped_values_emit_nothing() {
        let baseline = SourceTable::from_records("Baseline", &["Key", "Host"], &[&[("Key", "web1"), ("Host", "web1")]]);
        let other = SourceTable::from_records("Discovery", &["Key", "Hostname"], &[&[("Key", "web1"), ("Hostname", "WEB1")]]);
        let out = scan(&baseline, &[other]);
        assert!(out.deltas.is_empty());
        assert_eq!(out.total_cells, 0);
    }

    #[test]
    fn single_mapped_disagreement() {
        // Three keys so the Host→Hostname mapping survives one disagreement (2/3 ≥ 0.6).
        let baseline = SourceTable::from_records(
            "Baseline",
            &["Key", "Host"],
            &[
                &[("Key", "k1"), ("Host", "web1")],
                &[("Key", "k2"), ("Host", "web2")],
                &[("Key", "k3"), ("Host", "web3")],
            ],
        );
        let other = SourceTable::from_records(
            "Discovery",
            &["Key", "Hostname"],
            &[
                &[("Key", "k1"), ("Hostname", "web9")],
                &[("Key", "k2"), ("Hostname", "web2")],
                &[("Key", "k3"), ("Hostname", "WEB3")],
            ],
        );
        let out = scan(&baseline, &[other]);
        assert_eq!(out.deltas.len(), 1);
        let d = &out.deltas[0];
        assert_eq!(
            (d.key.as_str(), d.column.as_str(), d.baseline_value.as_str()),
            ("k1", "Host", "web1")
        );
        assert_eq!(d.other_values, vec!["web9"]);
        assert_eq!(out.total_cells, 1);
        assert_eq!(out.cells_by_source[0].count, 1);
    }

    #[test]
    fn baseline_only_key_reports_every_non_blank_cell() {
        let baseline = SourceTable::from_records(
            "Baseline",
            &["Key", "OS"],
            &[
                &[("Key", "k1"), ("OS", "linux")],
                &[("Key", "k2"), ("OS", "")],
            ],
        );
        let other = SourceTable::from_records("Discovery", &["Key", "OS"], &[&[("Key", "k1"), ("OS", "linux")]]);
        let out = scan(&baseline, &[other]);
        // k2 exists only in the baseline: its Key cell is non-blank, its OS cell is blank.
        assert_eq!(out.deltas.len(), 1);
        assert_eq!(out.deltas[0].key, "k2");
        assert_eq!(out.deltas[0].column, "Key");
        assert_eq!(out.deltas[0].other_values, vec![""]);
    }

    #[test]
    fn counts_are_per_source() {
        let baseline = SourceTable::from_records(
            "Baseline",
            &["Key", "OS"],
            &[
                &[("Key", "k1"), ("OS", "a")],
                &[("Key", "k2"), ("OS", "b")],
                &[("Key", "k3"), ("OS", "c")],
            ],
        );
        let agree = SourceTable::from_records(
            "A",
            &["Key", "OS"],
            &[
                &[("Key", "k1"), ("OS", "a")],
                &[("Key", "k2"), ("OS", "b")],
                &[("Key", "k3"), ("OS", "c")],
            ],
        );
        let drift = SourceTable::from_records(
            "B",
            &["Key", "OS"],
            &[
                &[("Key", "k1"), ("OS", "a")],
                &[("Key", "k2"), ("OS", "b")],
                &[("Key", "k3"), ("OS", "x")],
            ],
        );
        let out = scan(&baseline, &[agree, drift]);
        assert_eq!(out.deltas.len(), 1);
        assert_eq!(out.deltas[0].other_values, vec!["c", "x"]);
        assert_eq!(out.cells_by_source[0].count, 0);
        assert_eq!(out.cells_by_source[1].count, 1);
        assert_eq!(out.total_cells, 1);
    }
}
