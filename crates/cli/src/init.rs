//! `invdrift init` — write a run-profile skeleton from a validation template
//! workbook and/or an asset-class catalog.

use std::path::PathBuf;

use invdrift_recon::config::InputRequirement;
use invdrift_recon::normalize::eq_ignore_case;
use invdrift_recon::{Catalog, RunProfile};

use crate::CliError;

pub struct InitArgs {
    pub output: PathBuf,
    pub template: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub asset_class: Option<String>,
    pub data_point: String,
    pub force: bool,
}

/// Template labels win; catalog entries with the same label lend their
/// description and patterns. No template labels → the catalog's list.
fn requirements(labels: &[String], catalog: &Catalog, asset_class: &str) -> Vec<InputRequirement> {
    let known = catalog.requirements(asset_class);
    if labels.is_empty() {
        return known;
    }
    labels
        .iter()
        .map(|label| {
            known
                .iter()
                .find(|r| eq_ignore_case(&r.label, label))
                .cloned()
                .unwrap_or_else(|| InputRequirement::labelled(label.clone()))
        })
        .collect()
}

pub fn cmd_init(args: InitArgs) -> Result<(), CliError> {
    if args.output.exists() && !args.force {
        return Err(CliError::usage(format!("{} already exists", args.output.display()))
            .with_hint("pass --force to overwrite"));
    }

    let template = match &args.template {
        Some(path) => Some(invdrift_io::template_profile(path).map_err(CliError::ingest)?),
        None => None,
    };

    let catalog = match &args.catalog {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::usage(format!("cannot read catalog {}: {e}", path.display()))
            })?;
            Catalog::from_json(&text).map_err(CliError::profile)?
        }
        None => Catalog::default(),
    };

    let asset_class = args
        .asset_class
        .clone()
        .or_else(|| template.as_ref().and_then(|t| t.asset_class.clone()))
        .ok_or_else(|| {
            CliError::usage("asset class unknown").with_hint(
                "pass --asset-class, or name the template \"Data Validation - <AssetClass>.xlsx\"",
            )
        })?;

    let labels = template.map(|t| t.source_labels).unwrap_or_default();
    let reqs = requirements(&labels, &catalog, &asset_class);
    tracing::debug!(asset_class = %asset_class, sources = reqs.len(), "building profile skeleton");

    let profile = RunProfile::skeleton(&asset_class, &args.data_point, &reqs);
    profile.validate().map_err(CliError::profile)?;
    let text = profile.to_toml().map_err(CliError::profile)?;

    std::fs::write(&args.output, text).map_err(|e| {
        CliError::report(invdrift_io::ReportError::Io {
            path: args.output.clone(),
            message: e.to_string(),
        })
    })?;

    eprintln!(
        "wrote {} ({} / {}, {} sources)",
        args.output.display(),
        asset_class,
        args.data_point,
        profile.sources.len()
    );
    for src in &profile.sources {
        eprintln!("  {}: {}", src.name, src.file);
    }
    Ok(())
}
