// End-to-end tests for the `invdrift` binary: exit codes, --json stdout, report files.
// Run with: cargo test -p invdrift-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn invdrift() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_invdrift"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const BASELINE: &str = "Host,OS,Owner\nweb1,Win10,ann\nweb2,Win10,bob\ndb1,Linux,cid\n";
const DISCOVERY: &str = "Hostname,OS,User\nWEB1,Win11,ann\nweb3,Win10,dan\ndb1,Linux,cid\n";
const DISCOVERY_AGREES: &str = "Hostname,OS,User\nWEB1,Win10,ann\nweb2,Win10,bob\ndb1,Linux,cid\n";

const PROFILE: &str = r#"
asset_class = "Computers"
data_point = "Host"

[[sources]]
name = "Baseline"
file = "baseline.csv"

[[sources]]
name = "Discovery"
file = "discovery.csv"
key_column = "Hostname"
"#;

/// Profile plus both sources in a fresh directory.
fn setup(discovery: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "baseline.csv", BASELINE);
    write(dir.path(), "discovery.csv", discovery);
    let profile = write(dir.path(), "computers.invdrift.toml", PROFILE);
    (dir, profile)
}

fn files_with_suffix(dir: &Path, prefix: &str, suffix: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            name.starts_with(prefix) && name.ends_with(suffix)
        })
        .collect()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

// ===========================================================================
// invdrift run
// ===========================================================================

#[test]
fn run_with_drift_exits_1() {
    let (dir, profile) = setup(DISCOVERY);
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--no-workbook"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("inventory drift found"));
    assert!(stderr(&out).contains("missing from Discovery: 1"));
    assert!(files_with_suffix(dir.path(), "ValidationReport_", ".xlsx").is_empty());
}

#[test]
fn run_with_agreeing_sources_exits_0() {
    let (_dir, profile) = setup(DISCOVERY_AGREES);
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--no-workbook"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
}

#[test]
fn run_json_stdout_is_single_value() {
    let (_dir, profile) = setup(DISCOVERY);
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--json", "--no-workbook"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&out.stdout);
    let val: serde_json::Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be JSON: {e}\n{stdout}"));

    assert_eq!(val["meta"]["asset_class"], "Computers");
    assert_eq!(val["meta"]["baseline"], "Baseline");
    assert_eq!(val["summary"]["total_keys"], 4);
    assert_eq!(val["summary"]["matched_all"], 2);
    assert_eq!(val["summary"]["conflicts"], 1);
    let keys: Vec<&str> = val["presence"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["db1", "web1", "web2", "web3"]);
}

#[test]
fn run_writes_json_file() {
    let (dir, profile) = setup(DISCOVERY);
    let json = dir.path().join("result.json");
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--no-workbook", "--output"])
        .arg(&json)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty(), "stdout should be empty without --json");

    let val: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(val["summary"]["mapped_pairs"], 2);
}

#[test]
fn run_writes_workbook_audit_log_and_zip() {
    let (dir, profile) = setup(DISCOVERY);
    let reports = dir.path().join("reports");
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--zip", "--report-dir"])
        .arg(&reports)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1), "stderr: {}", stderr(&out));

    assert_eq!(files_with_suffix(&reports, "ValidationReport_Computers_", ".xlsx").len(), 1);
    let logs = files_with_suffix(&reports, "audit_", ".log");
    assert_eq!(logs.len(), 1);
    let log = std::fs::read_to_string(&logs[0]).unwrap();
    assert!(log.contains("AssetClass: Computers"));
    assert!(log.contains("DataPoint: Host"));
    assert_eq!(files_with_suffix(&reports, "Computers-", ".zip").len(), 1);
}

#[test]
fn zip_without_workbook_is_usage_error() {
    let (_dir, profile) = setup(DISCOVERY);
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--zip", "--no-workbook"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn semantic_flag_is_recorded() {
    let (_dir, profile) = setup(DISCOVERY);
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--json", "--no-workbook", "--semantic"])
        .output()
        .unwrap();
    let val: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out.stdout).trim()).unwrap();
    assert_eq!(val["meta"]["comparison"], "semantic");
}

#[test]
fn missing_profile_exits_2() {
    let out = invdrift()
        .args(["run", "/nonexistent/profile.toml"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn invalid_profile_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let profile = write(
        dir.path(),
        "bad.toml",
        "asset_class = \"Computers\"\ndata_point = \"Host\"\nsources = []\n",
    );
    let out = invdrift().args(["run", profile.to_str().unwrap()]).output().unwrap();
    assert_eq!(out.status.code(), Some(3), "stderr: {}", stderr(&out));
}

#[test]
fn missing_source_file_exits_4() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "baseline.csv", BASELINE);
    let profile = write(dir.path(), "p.toml", PROFILE);
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--no-workbook"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(4), "stderr: {}", stderr(&out));
}

#[test]
fn duplicate_header_exits_4_with_hint() {
    let (dir, profile) = setup(DISCOVERY);
    write(dir.path(), "discovery.csv", "Hostname,OS,os\nweb1,a,b\n");
    let out = invdrift()
        .args(["run", profile.to_str().unwrap(), "--no-workbook"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(4));
    assert!(stderr(&out).contains("duplicate header"));
    assert!(stderr(&out).contains("hint:"));
}

// ===========================================================================
// invdrift validate
// ===========================================================================

#[test]
fn validate_ok() {
    let (_dir, profile) = setup(DISCOVERY);
    let out = invdrift().args(["validate", profile.to_str().unwrap()]).output().unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("profile OK: Computers / Host (2 sources"));
}

#[test]
fn validate_reports_missing_key_column() {
    let (dir, profile) = setup(DISCOVERY);
    write(dir.path(), "discovery.csv", "Device,OS\nweb1,Win10\n");
    let out = invdrift().args(["validate", profile.to_str().unwrap()]).output().unwrap();
    assert_eq!(out.status.code(), Some(3), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("key column not found in: Discovery ('Hostname')"));
}

#[test]
fn validate_reports_missing_sources() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "baseline.csv", BASELINE);
    let profile = write(dir.path(), "p.toml", PROFILE);
    let out = invdrift().args(["validate", profile.to_str().unwrap()]).output().unwrap();
    assert_eq!(out.status.code(), Some(4));
    assert!(stderr(&out).contains("Discovery"));
}

// ===========================================================================
// invdrift init
// ===========================================================================

#[test]
fn init_from_catalog_then_validate() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write(
        dir.path(),
        "catalog.json",
        r#"{"Servers": [{"label": "CMDB", "patterns": ["*cmdb*.csv"]}, {"label": "Scan"}]}"#,
    );
    let profile = dir.path().join("servers.invdrift.toml");
    let out = invdrift()
        .args(["init", profile.to_str().unwrap(), "--asset-class", "Servers", "--data-point", "Host", "--catalog"])
        .arg(&catalog)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));

    let text = std::fs::read_to_string(&profile).unwrap();
    assert!(text.contains("asset_class = \"Servers\""));
    assert!(text.contains("name = \"CMDB\""));
    assert!(text.contains("file = \"cmdb.csv\""));
    assert!(text.contains("file = \"scan.csv\""));

    write(dir.path(), "cmdb.csv", "Host,OS\nweb1,Linux\n");
    write(dir.path(), "scan.csv", "Host,OS\nweb1,Linux\n");
    let out = invdrift().args(["validate", profile.to_str().unwrap()]).output().unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
}

#[test]
fn init_from_template_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("Data Validation - Printers.xlsx");
    let mut wb = rust_xlsxwriter::Workbook::new();
    let ws = wb.add_worksheet().set_name("Process").unwrap();
    ws.write_string(0, 0, "Step").unwrap();
    ws.write_string(0, 1, "Input Source").unwrap();
    ws.write_string(1, 1, "CMDB").unwrap();
    ws.write_string(2, 1, "SNMP Scan").unwrap();
    wb.save(&template).unwrap();

    let profile = dir.path().join("printers.invdrift.toml");
    let out = invdrift()
        .args(["init", profile.to_str().unwrap(), "--data-point", "Serial", "--template"])
        .arg(&template)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));

    let text = std::fs::read_to_string(&profile).unwrap();
    assert!(text.contains("asset_class = \"Printers\""));
    assert!(text.contains("data_point = \"Serial\""));
    assert!(text.contains("name = \"SNMP Scan\""));
    assert!(text.contains("file = \"snmp_scan.csv\""));
}

#[test]
fn init_refuses_to_overwrite() {
    let (_dir, profile) = setup(DISCOVERY);
    let out = invdrift()
        .args(["init", profile.to_str().unwrap(), "--asset-class", "X", "--data-point", "Host"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("--force"));
}

#[test]
fn init_without_asset_class_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("p.toml");
    let out = invdrift()
        .args(["init", profile.to_str().unwrap(), "--data-point", "Host"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(!profile.exists());
}

// ===========================================================================
// invdrift suggest
// ===========================================================================

#[test]
fn suggest_json_lists_overlapping_columns() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "cmdb.csv", "Host,Site\nweb1,nyc\nweb2,nyc\ndb1,lon\n");
    let b = write(dir.path(), "scan.csv", "Hostname,Vlan\nWEB1,10\nweb2,20\ndb9,30\n");
    let out = invdrift()
        .args(["suggest", "--min-overlap", "2", "--min-ratio", "0.1", "--json"])
        .arg(&a)
        .arg(&b)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));

    let val: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out.stdout).trim()).unwrap();
    let hit = val
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["column_a"] == "Host" && s["column_b"] == "Hostname")
        .expect("Host/Hostname pair");
    assert_eq!(hit["source_a"], "cmdb");
    assert_eq!(hit["source_b"], "scan");
    assert_eq!(hit["overlap"], 2);
}

#[test]
fn suggest_needs_two_files() {
    let out = invdrift().args(["suggest", "only.csv"]).output().unwrap();
    assert_eq!(out.status.code(), Some(2));
}
