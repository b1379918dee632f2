use std::collections::HashMap;

use serde::Serialize;

use crate::normalize::{eq_ignore_case, fold, ComparisonMode};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One ingested source: ordered headers plus rows aligned to them.
///
/// Every row has exactly `headers.len()` cells; absent cells are empty strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTable {
    pub name: String,
    /// Opaque origin token (file path, provider id) supplied by ingestion.
    pub origin: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SourceTable {
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<String>,
        headers: Vec<String>,
        mut rows: Vec<Vec<String>>,
    ) -> Self {
        let width = headers.len();
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self {
            name: name.into(),
            origin: origin.into(),
            headers,
            rows,
        }
    }

    /// Build a table from header→value records; missing headers become "".
    pub fn from_records(
        name: impl Into<String>,
        headers: &[&str],
        records: &[&[(&str, &str)]],
    ) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let rows = records
            .iter()
            .map(|rec| {
                headers
                    .iter()
                    .map(|h| {
                        rec.iter()
                            .find(|(k, _)| eq_ignore_case(k, h))
                            .map(|(_, v)| v.to_string())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
        Self::new(name, "", headers, rows)
    }

    /// Position of `header`, compared case-insensitively. First match wins.
    pub fn column_index(&self, header: &str) -> Option<usize> {
        let folded = fold(header);
        self.headers.iter().position(|h| h == header || fold(h) == folded)
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Cell value by header name, or "" when the header or row is absent.
    pub fn value(&self, row: usize, header: &str) -> &str {
        match self.column_index(header) {
            Some(col) => self.cell(row, col),
            None => "",
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    /// Opaque label echoed into the result.
    pub asset_class: String,
    /// Default key column for every source.
    pub data_point: String,
    pub sources: Vec<SourceTable>,
    /// Source name → key column, for sources whose key differs from `data_point`.
    pub key_overrides: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Key assignment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyColumn {
    pub source: String,
    pub column: String,
}

/// Fully resolved source → key column map, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct KeyAssignment {
    columns: Vec<KeyColumn>,
}

impl KeyAssignment {
    /// Explicit (non-blank) override if present, otherwise `data_point`.
    pub fn resolve(
        data_point: &str,
        sources: &[SourceTable],
        overrides: &HashMap<String, String>,
    ) -> Self {
        let columns = sources
            .iter()
            .map(|src| {
                let column = overrides
                    .iter()
                    .find(|(name, col)| eq_ignore_case(name, &src.name) && !col.trim().is_empty())
                    .map(|(_, col)| col.trim().to_string())
                    .unwrap_or_else(|| data_point.to_string());
                KeyColumn {
                    source: src.name.clone(),
                    column,
                }
            })
            .collect();
        Self { columns }
    }

    pub fn column_for(&self, source: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|k| eq_ignore_case(&k.source, source))
            .map(|k| k.column.as_str())
    }

    /// True if any source uses `column` as its key.
    pub fn is_key_column(&self, column: &str) -> bool {
        self.columns.iter().any(|k| eq_ignore_case(&k.column, column))
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyColumn> {
        self.columns.iter()
    }
}

// ---------------------------------------------------------------------------
// Presence + conflicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFlag {
    pub source: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceRecord {
    pub key: String,
    pub presence: Vec<SourceFlag>,
}

impl PresenceRecord {
    pub fn is_present_in(&self, source: &str) -> bool {
        self.presence
            .iter()
            .any(|f| f.present && eq_ignore_case(&f.source, source))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceValue {
    pub source: String,
    pub value: String,
}

/// A same-named column whose values disagree for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    pub key: String,
    pub column: String,
    /// Only sources that have a row for `key`, in source order.
    pub values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingKeys {
    pub source: String,
    pub keys: Vec<String>,
}

// ---------------------------------------------------------------------------
// Mapping + deltas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedColumn {
    pub baseline_column: String,
    pub other_column: String,
    pub score: f64,
}

/// Inferred baseline → other column correspondence for one other source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMapping {
    pub source: String,
    pub common_keys: usize,
    pub columns: Vec<MappedColumn>,
}

impl SourceMapping {
    pub fn target(&self, baseline_column: &str) -> Option<&MappedColumn> {
        self.columns
            .iter()
            .find(|m| eq_ignore_case(&m.baseline_column, baseline_column))
    }
}

/// A baseline cell that disagrees with at least one mapped other-source cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaRecord {
    pub key: String,
    pub column: String,
    pub baseline_value: String,
    /// Aligned with `ReconResult::other_sources`.
    pub other_values: Vec<String>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconSummary {
    pub total_keys: usize,
    pub matched_all: usize,
    pub conflicts: usize,
    pub mapped_pairs: usize,
    pub delta_rows: usize,
    pub total_delta_cells: usize,
    pub delta_cells_by_source: Vec<SourceCount>,
    pub missing_by_source: Vec<SourceCount>,
}

impl ReconSummary {
    /// Any missing key, conflict or delta cell.
    pub fn has_drift(&self) -> bool {
        self.conflicts > 0
            || self.total_delta_cells > 0
            || self.missing_by_source.iter().any(|m| m.count > 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub asset_class: String,
    pub data_point: String,
    pub baseline: String,
    pub comparison: ComparisonMode,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub key_columns: KeyAssignment,
    /// Non-baseline source names in input order.
    pub other_sources: Vec<String>,
    pub presence: Vec<PresenceRecord>,
    pub conflicts: Vec<ConflictRecord>,
    pub matches_all: Vec<String>,
    pub missing_by_source: Vec<MissingKeys>,
    pub mappings: Vec<SourceMapping>,
    pub deltas: Vec<DeltaRecord>,
    pub sources: Vec<SourceTable>,
}

impl ReconResult {
    pub fn missing_for(&self, source: &str) -> &[String] {
        self.missing_by_source
            .iter()
            .find(|m| eq_ignore_case(&m.source, source))
            .map(|m| m.keys.as_slice())
            .unwrap_or(&[])
    }

    pub fn mapping_for(&self, source: &str) -> Option<&SourceMapping> {
        self.mappings.iter().find(|m| eq_ignore_case(&m.source, source))
    }
}
