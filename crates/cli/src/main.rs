// invdrift CLI - headless asset inventory reconciliation

mod exit_codes;
mod init;
mod recon;
mod suggest;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_INGEST, EXIT_INVALID_PROFILE, EXIT_REPORT, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "invdrift")]
#[command(about = "Reconcile asset inventories across a baseline and discovery sources")]
#[command(version, long_version = long_version())]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the sources named in a run profile
    #[command(after_help = "\
Examples:
  invdrift run computers.invdrift.toml
  invdrift run computers.invdrift.toml --json
  invdrift run computers.invdrift.toml --output result.json --no-workbook
  invdrift run computers.invdrift.toml --report-dir out --zip
  invdrift run computers.invdrift.toml --semantic")]
    Run {
        /// Path to the run profile (TOML)
        profile: std::path::PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<std::path::PathBuf>,

        /// Directory for the workbook and audit log (default: profile's output.dir)
        #[arg(long)]
        report_dir: Option<std::path::PathBuf>,

        /// Package report, sources and audit log into a zip
        #[arg(long)]
        zip: bool,

        /// Compare MAC/IP/hostname/serial columns by canonical form
        #[arg(long)]
        semantic: bool,

        /// Skip the XLSX workbook (and audit log)
        #[arg(long)]
        no_workbook: bool,
    },

    /// Validate a run profile and check its source files without running
    #[command(after_help = "\
Examples:
  invdrift validate computers.invdrift.toml")]
    Validate {
        /// Path to the run profile (TOML)
        profile: std::path::PathBuf,
    },

    /// Write a run-profile skeleton from a validation template or catalog
    #[command(after_help = "\
Examples:
  invdrift init computers.invdrift.toml --template \"Data Validation - Computers.xlsx\" --data-point Hostname
  invdrift init servers.invdrift.toml --catalog catalog.json --asset-class Servers --data-point Host")]
    Init {
        /// Profile to write (TOML)
        output: std::path::PathBuf,

        /// Validation template workbook; source labels come from its Process sheet
        #[arg(long)]
        template: Option<std::path::PathBuf>,

        /// Asset-class catalog (JSON)
        #[arg(long)]
        catalog: Option<std::path::PathBuf>,

        /// Asset class (default: from the template's file name)
        #[arg(long)]
        asset_class: Option<String>,

        /// Key column shared by the sources
        #[arg(long)]
        data_point: String,

        /// Overwrite an existing profile
        #[arg(long)]
        force: bool,
    },

    /// Suggest column pairs whose values overlap across files
    #[command(after_help = "\
Examples:
  invdrift suggest cmdb.csv scan.xlsx
  invdrift suggest cmdb.csv scan.xlsx ad.csv --min-overlap 10 --min-ratio 0.2
  invdrift suggest cmdb.csv scan.xlsx --json")]
    Suggest {
        /// Two or more source files
        #[arg(required = true, num_args = 2..)]
        files: Vec<std::path::PathBuf>,

        /// Minimum number of shared distinct values
        #[arg(long, default_value_t = invdrift_recon::suggest::DEFAULT_MIN_OVERLAP)]
        min_overlap: usize,

        /// Minimum overlap / max(distinct values)
        #[arg(long, default_value_t = invdrift_recon::suggest::DEFAULT_MIN_RATIO)]
        min_ratio: f64,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  invdrift-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  invdrift-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            profile,
            json,
            output,
            report_dir,
            zip,
            semantic,
            no_workbook,
        } => recon::cmd_run(recon::RunArgs {
            profile,
            json,
            output,
            report_dir,
            zip,
            semantic,
            no_workbook,
        }),
        Commands::Validate { profile } => recon::cmd_validate(profile),
        Commands::Init {
            output,
            template,
            catalog,
            asset_class,
            data_point,
            force,
        } => init::cmd_init(init::InitArgs {
            output,
            template,
            catalog,
            asset_class,
            data_point,
            force,
        }),
        Commands::Suggest {
            files,
            min_overlap,
            min_ratio,
            json,
        } => suggest::cmd_suggest(files, min_overlap, min_ratio, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn profile(err: invdrift_recon::ReconError) -> Self {
        Self { code: EXIT_INVALID_PROFILE, message: err.to_string(), hint: None }
    }

    pub fn ingest(err: invdrift_io::IngestError) -> Self {
        let hint = match &err {
            invdrift_io::IngestError::DuplicateHeader { .. } => {
                Some("rename one of the columns; headers are compared case-insensitively".to_string())
            }
            invdrift_io::IngestError::UnsupportedFormat(_) => {
                Some("supported: .csv .txt .tsv .xlsx .xlsm .xlsb .xls .ods".to_string())
            }
            _ => None,
        };
        Self { code: EXIT_INGEST, message: err.to_string(), hint }
    }

    pub fn report(err: invdrift_io::ReportError) -> Self {
        Self { code: EXIT_REPORT, message: err.to_string(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
