//! `invdrift run` / `invdrift validate` — profile-driven reconciliation.

use std::path::{Path, PathBuf};

use invdrift_io::{FileProvider, TableProvider};
use invdrift_recon::{ComparisonMode, ReconResult, RunProfile};

use crate::exit_codes::{EXIT_DRIFT, EXIT_INGEST, EXIT_INVALID_PROFILE, EXIT_USAGE};
use crate::CliError;

pub struct RunArgs {
    pub profile: PathBuf,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
    pub zip: bool,
    pub semantic: bool,
    pub no_workbook: bool,
}

fn load_profile(path: &Path) -> Result<RunProfile, CliError> {
    tracing::debug!(path = %path.display(), "loading profile");
    let text = std::fs::read_to_string(path).map_err(|e| CliError {
        code: EXIT_USAGE,
        message: format!("cannot read profile {}: {e}", path.display()),
        hint: None,
    })?;
    RunProfile::from_toml(&text).map_err(CliError::profile)
}

/// Directory that relative paths in the profile are resolved against.
fn base_dir(profile_path: &Path) -> PathBuf {
    match profile_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let profile = load_profile(&args.profile)?;
    let base = base_dir(&args.profile);

    let zip = args.zip || profile.output.zip;
    if zip && args.no_workbook {
        return Err(CliError::usage("--zip needs the workbook").with_hint("drop --no-workbook"));
    }

    let provider = FileProvider::new(&base, profile.sources.clone());
    let tables = provider
        .fetch(&profile.asset_class, &profile.data_point)
        .map_err(CliError::ingest)?;

    let mut options = profile.engine_options();
    if args.semantic {
        options.comparison = ComparisonMode::Semantic;
    }
    let result = invdrift_recon::run(&profile.input(tables), &options).map_err(CliError::profile)?;

    // JSON
    let json_path = args
        .output
        .clone()
        .or_else(|| profile.output.json.as_ref().map(|p| base.join(p)));
    if let Some(ref path) = json_path {
        invdrift_io::write_json(&result, path).map_err(CliError::report)?;
        eprintln!("wrote {}", path.display());
    }
    if args.json {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::report(invdrift_io::ReportError::Json(e.to_string())))?;
        println!("{json_str}");
    }

    // Workbook + audit log + package
    if !args.no_workbook {
        let dir = args
            .report_dir
            .clone()
            .or_else(|| profile.output.dir.as_ref().map(|d| base.join(d)))
            .unwrap_or_else(|| base.clone());
        write_reports(&profile, &provider, &result, &dir, zip)?;
    }

    print_summary(&result);

    if result.summary.has_drift() {
        return Err(CliError {
            code: EXIT_DRIFT,
            message: "inventory drift found".into(),
            hint: None,
        });
    }
    Ok(())
}

fn write_reports(
    profile: &RunProfile,
    provider: &FileProvider,
    result: &ReconResult,
    dir: &Path,
    zip: bool,
) -> Result<(), CliError> {
    let report = invdrift_io::write_workbook(result, dir).map_err(CliError::report)?;
    eprintln!("wrote {}", report.display());

    let sources: Vec<(String, PathBuf)> = profile
        .sources
        .iter()
        .map(|s| (s.name.clone(), provider.path_for(s)))
        .collect();
    let audit = invdrift_io::write_audit_log(dir, &profile.asset_class, &profile.data_point, &sources)
        .map_err(CliError::report)?;
    eprintln!("wrote {}", audit.display());

    if zip {
        let files: Vec<PathBuf> = sources.into_iter().map(|(_, p)| p).collect();
        let package = invdrift_io::create_zip(&profile.asset_class, &report, &files, &audit, dir)
            .map_err(CliError::report)?;
        eprintln!("wrote {}", package.display());
    }
    Ok(())
}

/// Human summary to stderr.
fn print_summary(result: &ReconResult) {
    let s = &result.summary;
    eprintln!(
        "{} / {}: {} keys across {} sources, {} in all, {} conflicts, {} mapped pairs, {} delta cells",
        result.meta.asset_class,
        result.meta.data_point,
        s.total_keys,
        result.sources.len(),
        s.matched_all,
        s.conflicts,
        s.mapped_pairs,
        s.total_delta_cells,
    );
    for m in s.missing_by_source.iter().filter(|m| m.count > 0) {
        eprintln!("  missing from {}: {}", m.source, m.count);
    }
    for c in s.delta_cells_by_source.iter().filter(|c| c.count > 0) {
        eprintln!("  delta cells vs {}: {}", c.source, c.count);
    }
}

pub fn cmd_validate(profile_path: PathBuf) -> Result<(), CliError> {
    let profile = load_profile(&profile_path)?;
    let provider = FileProvider::new(base_dir(&profile_path), profile.sources.clone());

    eprintln!(
        "profile OK: {} / {} ({} sources, {} comparison)",
        profile.asset_class,
        profile.data_point,
        profile.sources.len(),
        profile.comparison,
    );

    let mut missing = Vec::new();
    let mut no_key = Vec::new();
    for src in &profile.sources {
        let path = provider.path_for(src);
        let key = src.key_column.as_deref().unwrap_or(&profile.data_point);
        let status = if !path.is_file() {
            missing.push(src.name.clone());
            "MISSING".to_string()
        } else {
            let table = invdrift_io::load_table(&src.name, &path).map_err(CliError::ingest)?;
            if table.column_index(key).is_some() {
                format!("ok, {} rows", table.row_count())
            } else {
                no_key.push(format!("{} ('{key}')", src.name));
                "KEY COLUMN NOT FOUND".to_string()
            }
        };
        eprintln!("  {}: {} (key: {key}) {status}", src.name, path.display());
    }

    if !missing.is_empty() {
        return Err(CliError {
            code: EXIT_INGEST,
            message: format!("source file not found for: {}", missing.join(", ")),
            hint: Some("file paths are relative to the profile's directory".into()),
        });
    }
    if !no_key.is_empty() {
        return Err(CliError {
            code: EXIT_INVALID_PROFILE,
            message: format!("key column not found in: {}", no_key.join(", ")),
            hint: Some("set data_point, or key_column on the source".into()),
        });
    }
    Ok(())
}
