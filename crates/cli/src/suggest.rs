//! `invdrift suggest` — diagnostic column-overlap suggestions.

use std::path::PathBuf;

use invdrift_recon::normalize::fold;
use invdrift_recon::suggest::suggest_mappings;

use crate::CliError;

/// Table name for a file: its stem, suffixed when two files share one.
fn table_names(files: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(files.len());
    for (i, f) in files.iter().enumerate() {
        let stem = f
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("file{}", i + 1));
        let name = if names.iter().any(|n| fold(n) == fold(&stem)) {
            format!("{stem}#{}", i + 1)
        } else {
            stem
        };
        names.push(name);
    }
    names
}

pub fn cmd_suggest(
    files: Vec<PathBuf>,
    min_overlap: usize,
    min_ratio: f64,
    json: bool,
) -> Result<(), CliError> {
    if !(0.0..=1.0).contains(&min_ratio) {
        return Err(CliError::usage(format!("--min-ratio must be in [0, 1], got {min_ratio}")));
    }

    let tables = table_names(&files)
        .into_iter()
        .zip(&files)
        .map(|(name, path)| invdrift_io::load_table(&name, path))
        .collect::<Result<Vec<_>, _>>()
        .map_err(CliError::ingest)?;

    let suggestions = suggest_mappings(&tables, min_overlap, min_ratio);

    if json {
        let json_str = serde_json::to_string_pretty(&suggestions)
            .map_err(|e| CliError::report(invdrift_io::ReportError::Json(e.to_string())))?;
        println!("{json_str}");
        return Ok(());
    }

    if suggestions.is_empty() {
        eprintln!("no column pairs with ≥{min_overlap} shared values and ratio ≥{min_ratio}");
        return Ok(());
    }
    println!("{:>8}  {:>6}  {:<40}  {}", "overlap", "ratio", "column", "column");
    for s in &suggestions {
        let a = format!("{}.{}", s.source_a, s.column_a);
        let b = format!("{}.{}", s.source_b, s.column_b);
        println!("{:>8}  {:>6.4}  {:<40}  {}", s.overlap, s.ratio, a, b);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_stems_get_suffix() {
        let files = vec![
            PathBuf::from("a/scan.csv"),
            PathBuf::from("b/SCAN.xlsx"),
            PathBuf::from("cmdb.csv"),
        ];
        assert_eq!(table_names(&files), vec!["scan", "SCAN#2", "cmdb"]);
    }
}
