use crate::cancel::CancelToken;
use crate::error::ReconError;
use crate::index::KeyIndex;
use crate::model::{ConflictRecord, KeyAssignment, SourceTable, SourceValue};
use crate::normalize::{canonical, fold, ComparisonMode};
use crate::presence::UniverseKey;

/// Headers present (case-insensitively) in every source, minus all key columns.
///
/// Order and spelling follow the first source.
pub fn common_columns(sources: &[SourceTable], keys: &KeyAssignment) -> Vec<String> {
    let Some((first, rest)) = sources.split_first() else {
        return Vec::new();
    };
    let mut seen: Vec<String> = Vec::new();
    first
        .headers
        .iter()
        .filter(|h| {
            let folded = fold(h);
            if seen.contains(&folded) {
                return false;
            }
            seen.push(folded);
            true
        })
        .filter(|h| rest.iter().all(|src| src.column_index(h).is_some()))
        .filter(|h| !keys.is_key_column(h))
        .cloned()
        .collect()
}

/// Same-named column disagreements for keys held by at least two sources.
pub fn detect_conflicts(
    sources: &[SourceTable],
    indexes: &[KeyIndex],
    keys: &[UniverseKey],
    assignment: &KeyAssignment,
    mode: ComparisonMode,
    cancel: &CancelToken,
) -> Result<Vec<ConflictRecord>, ReconError> {
    let columns = common_columns(sources, assignment);
    if columns.is_empty() || sources.len() < 2 {
        return Ok(Vec::new());
    }

    // Column positions per source, resolved once.
    let positions: Vec<Vec<usize>> = sources
        .iter()
        .map(|src| {
            columns
                .iter()
                .filter_map(|c| src.column_index(c))
                .collect()
        })
        .collect();

    let mut conflicts = Vec::new();

    for uk in keys {
        cancel.check()?;
        let contributing: Vec<(usize, usize)> = indexes
            .iter()
            .enumerate()
            .filter_map(|(si, index)| index.row_folded(&uk.folded).map(|row| (si, row)))
            .collect();
        if contributing.len() < 2 {
            continue;
        }

        for (ci, column) in columns.iter().enumerate() {
            let mut first: Option<String> = None;
            let mut differs = false;
            let mut values = Vec::with_capacity(contributing.len());

            for &(si, row) in &contributing {
                let value = sources[si].cell(row, positions[si][ci]).trim();
                let canon = canonical(mode, column, value);
                match &first {
                    None => first = Some(canon),
                    Some(f) if *f != canon => differs = true,
                    Some(_) => {}
                }
                values.push(SourceValue {
                    source: sources[si].name.clone(),
                    value: value.to_string(),
                });
            }

            if differs {
                conflicts.push(ConflictRecord {
                    key: uk.key.clone(),
                    column: column.clone(),
                    values,
                });
            }
        }
    }

    tracing::debug!(columns = columns.len(), conflicts = conflicts.len(), "conflicts detected");
    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_key_index;
    use crate::presence::all_keys;
    use std::collections::HashMap;

    fn setup(sources: Vec<SourceTable>) -> (Vec<SourceTable>, Vec<KeyIndex>, Vec<UniverseKey>, KeyAssignment) {
        let assignment = KeyAssignment::resolve("Host", &sources, &HashMap::new());
        let indexes: Vec<KeyIndex> = sources
            .iter()
            .map(|s| build_key_index(s, "Host", ComparisonMode::Plain))
            .collect();
        let keys = all_keys(&indexes);
        (sources, indexes, keys, assignment)
    }

    #[test]
    fn os_conflict_example() {
        let (sources, indexes, keys, assignment) = setup(vec![
            SourceTable::from_records("Baseline", &["Host", "OS"], &[&[("Host", "web1"), ("OS", "Win10")]]),
            SourceTable::from_records("Discovery", &["host", "os"], &[&[("host", "web1"), ("os", "Win11")]]),
        ]);
        let out = detect_conflicts(&sources, &indexes, &keys, &assignment, ComparisonMode::Plain, &CancelToken::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, "web1");
        assert_eq!(out[0].column, "OS");
        assert_eq!(
            out[0].values,
            vec![
                SourceValue { source: "Baseline".into(), value: "Win10".into() },
                SourceValue { source: "Discovery".into(), value: "Win11".into() },
            ]
        );
    }

    #[test]
    fn case_and_whitespace_are_not_conflicts() {
        let (sources, indexes, keys, assignment) = setup(vec![
            SourceTable::from_records("A", &["Host", "OS"], &[&[("Host", "web1"), ("OS", " win10 ")]]),
            SourceTable::from_records("B", &["Host", "OS"], &[&[("Host", "WEB1"), ("OS", "WIN10")]]),
        ]);
        let out = detect_conflicts(&sources, &indexes, &keys, &assignment, ComparisonMode::Plain, &CancelToken::new())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn only_contributing_sources_recorded() {
        let (sources, indexes, keys, assignment) = setup(vec![
            SourceTable::from_records("A", &["Host", "OS"], &[&[("Host", "web1"), ("OS", "x")]]),
            SourceTable::from_records("B", &["Host", "OS"], &[&[("Host", "web1"), ("OS", "y")]]),
            SourceTable::from_records("C", &["Host", "OS"], &[&[("Host", "web9"), ("OS", "z")]]),
        ]);
        let out = detect_conflicts(&sources, &indexes, &keys, &assignment, ComparisonMode::Plain, &CancelToken::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].values.len(), 2);
        assert!(out[0].values.iter().all(|v| v.source != "C"));
    }

    #[test]
    fn key_columns_of_any_source_are_excluded() {
        let sources = vec![
            SourceTable::from_records("A", &["Host", "Serial"], &[]),
            SourceTable::from_records("B", &["Host", "Serial"], &[]),
        ];
        let overrides = HashMap::from([("B".to_string(), "Serial".to_string())]);
        let assignment = KeyAssignment::resolve("Host", &sources, &overrides);
        assert!(common_columns(&sources, &assignment).is_empty());
    }

    #[test]
    fn columns_must_exist_in_every_source() {
        let sources = vec![
            SourceTable::from_records("A", &["Host", "OS", "Owner"], &[]),
            SourceTable::from_records("B", &["Host", "owner"], &[]),
        ];
        let assignment = KeyAssignment::resolve("Host", &sources, &HashMap::new());
        assert_eq!(common_columns(&sources, &assignment), vec!["Owner"]);
    }
}
