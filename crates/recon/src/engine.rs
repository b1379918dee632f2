use crate::cancel::CancelToken;
use crate::conflict::detect_conflicts;
use crate::delta::{detect_deltas, OtherSide};
use crate::error::ReconError;
use crate::index::{build_key_index, KeyIndex};
use crate::mapping::{baseline_position, infer_mapping, DEFAULT_MAPPING_THRESHOLD};
use crate::model::{
    KeyAssignment, ReconInput, ReconMeta, ReconResult, ReconSummary, SourceCount, SourceMapping,
    SourceTable,
};
use crate::normalize::{fold, ComparisonMode};
use crate::presence::{all_keys, analyze_presence};

/// Knobs that change how a run compares values, not what it reads.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub comparison: ComparisonMode,
    pub mapping_threshold: f64,
    /// Build per-source indexes and per-pair mappings on scoped threads.
    pub parallel: bool,
    pub cancel: CancelToken,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            comparison: ComparisonMode::Plain,
            mapping_threshold: DEFAULT_MAPPING_THRESHOLD,
            parallel: true,
            cancel: CancelToken::new(),
        }
    }
}

/// Indexes and inferred mappings, computed once per run and shared by every stage.
#[derive(Debug, Clone)]
pub struct RunIndex {
    pub keys: KeyAssignment,
    pub baseline: usize,
    /// One per source, in input order.
    pub indexes: Vec<KeyIndex>,
    /// One per non-baseline source, in input order.
    pub mappings: Vec<SourceMapping>,
}

impl RunIndex {
    pub fn build(input: &ReconInput, options: &EngineOptions) -> Result<Self, ReconError> {
        let keys = KeyAssignment::resolve(&input.data_point, &input.sources, &input.key_overrides);
        let mode = options.comparison;

        let jobs: Vec<(&SourceTable, String)> = input
            .sources
            .iter()
            .map(|src| {
                let column = keys.column_for(&src.name).unwrap_or(input.data_point.as_str());
                (src, column.to_string())
            })
            .collect();

        let indexes = fan_out(&jobs, options, |(src, column)| {
            build_key_index(src, column, mode)
        })?;

        let baseline = baseline_position(&input.sources);
        let base_table = &input.sources[baseline];
        let base_index = &indexes[baseline];

        let pairs: Vec<(&SourceTable, &KeyIndex)> = input
            .sources
            .iter()
            .zip(&indexes)
            .enumerate()
            .filter(|(i, _)| *i != baseline)
            .map(|(_, pair)| pair)
            .collect();

        let mappings = fan_out(&pairs, options, |(other, other_index)| {
            infer_mapping(
                base_table,
                base_index,
                other,
                other_index,
                mode,
                options.mapping_threshold,
            )
        })?;

        Ok(Self {
            keys,
            baseline,
            indexes,
            mappings,
        })
    }
}

/// Apply `f` to every job, on scoped threads when allowed, keeping job order.
///
/// The cancel token is checked before any work starts and after every job.
fn fan_out<J, T, F>(jobs: &[J], options: &EngineOptions, f: F) -> Result<Vec<T>, ReconError>
where
    J: Sync,
    T: Send,
    F: Fn(&J) -> T + Sync,
{
    options.cancel.check()?;

    if !options.parallel || jobs.len() < 2 {
        let mut out = Vec::with_capacity(jobs.len());
        for job in jobs {
            out.push(f(job));
            options.cancel.check()?;
        }
        return Ok(out);
    }

    let f = &f;
    let out: Vec<T> = std::thread::scope(|scope| {
        let handles: Vec<_> = jobs.iter().map(|job| scope.spawn(move || f(job))).collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });
    options.cancel.check()?;
    Ok(out)
}

fn validate_input(input: &ReconInput, options: &EngineOptions) -> Result<(), ReconError> {
    let threshold = options.mapping_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ReconError::InvalidInput(format!(
            "mapping_threshold must be in (0, 1], got {threshold}"
        )));
    }
    if input.sources.is_empty() {
        return Err(ReconError::InvalidInput("at least one source is required".into()));
    }
    let mut seen: Vec<String> = Vec::with_capacity(input.sources.len());
    for src in &input.sources {
        let folded = fold(&src.name);
        if seen.contains(&folded) {
            return Err(ReconError::DuplicateSource(src.name.clone()));
        }
        seen.push(folded);
    }
    Ok(())
}

/// Reconcile the input sources. Returns presence, conflicts, mappings and deltas.
pub fn run(input: &ReconInput, options: &EngineOptions) -> Result<ReconResult, ReconError> {
    validate_input(input, options)?;
    let mode = options.comparison;
    let cancel = &options.cancel;

    tracing::info!(
        asset_class = %input.asset_class,
        data_point = %input.data_point,
        sources = input.sources.len(),
        comparison = %mode,
        "reconciliation started"
    );

    let run_index = RunIndex::build(input, options)?;
    let keys = all_keys(&run_index.indexes);

    let presence = analyze_presence(&run_index.indexes, &keys, cancel)?;
    let conflicts = detect_conflicts(
        &input.sources,
        &run_index.indexes,
        &keys,
        &run_index.keys,
        mode,
        cancel,
    )?;

    let baseline = &input.sources[run_index.baseline];
    let others: Vec<OtherSide<'_>> = input
        .sources
        .iter()
        .zip(&run_index.indexes)
        .enumerate()
        .filter(|(i, _)| *i != run_index.baseline)
        .map(|(_, pair)| pair)
        .zip(&run_index.mappings)
        .map(|((table, index), mapping)| OtherSide {
            table,
            index,
            mapping,
        })
        .collect();
    let delta = detect_deltas(
        baseline,
        &run_index.indexes[run_index.baseline],
        &others,
        &keys,
        mode,
        cancel,
    )?;
    let other_sources: Vec<String> = others.iter().map(|o| o.table.name.clone()).collect();

    let summary = ReconSummary {
        total_keys: keys.len(),
        matched_all: presence.matches_all.len(),
        conflicts: conflicts.len(),
        mapped_pairs: run_index.mappings.iter().map(|m| m.columns.len()).sum(),
        delta_rows: delta.deltas.len(),
        total_delta_cells: delta.total_cells,
        delta_cells_by_source: delta.cells_by_source,
        missing_by_source: presence
            .missing_by_source
            .iter()
            .map(|m| SourceCount {
                source: m.source.clone(),
                count: m.keys.len(),
            })
            .collect(),
    };

    tracing::info!(
        keys = summary.total_keys,
        matched_all = summary.matched_all,
        conflicts = summary.conflicts,
        mapped_pairs = summary.mapped_pairs,
        delta_cells = summary.total_delta_cells,
        "reconciliation finished"
    );

    Ok(ReconResult {
        meta: ReconMeta {
            asset_class: input.asset_class.clone(),
            data_point: input.data_point.clone(),
            baseline: baseline.name.clone(),
            comparison: mode,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        key_columns: run_index.keys,
        other_sources,
        presence: presence.presence,
        conflicts,
        matches_all: presence.matches_all,
        missing_by_source: presence.missing_by_source,
        mappings: run_index.mappings,
        deltas: delta.deltas,
        sources: input.sources.clone(),
    })
}
