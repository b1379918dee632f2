// Audit log + zip package of a finished run

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use invdrift_recon::normalize::fold;

use crate::error::{write_err, ReportError};
use crate::report::file_safe;

/// Login name of the operator, from the environment.
pub fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn machine_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Write `audit_<yyyyMMdd_HHmmss>.log` into `dir` and return its path.
///
/// `sources` are (source name, file) pairs in run order.
pub fn write_audit_log(
    dir: &Path,
    asset_class: &str,
    data_point: &str,
    sources: &[(String, PathBuf)],
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir).map_err(write_err(dir))?;
    let now = Local::now();
    let path = dir.join(format!("audit_{}.log", now.format("%Y%m%d_%H%M%S")));

    let mut lines = vec![
        format!("Timestamp: {}", now.to_rfc3339()),
        format!("Username: {}", current_user()),
        format!("Machine: {}", machine_name()),
        format!("AssetClass: {asset_class}"),
        format!("DataPoint: {data_point}"),
        "Sources:".to_string(),
    ];
    lines.extend(
        sources
            .iter()
            .map(|(name, file)| format!("  - {name}: {}", file.display())),
    );

    std::fs::write(&path, lines.join("\n") + "\n").map_err(write_err(&path))?;
    tracing::debug!(path = %path.display(), "audit log written");
    Ok(path)
}

/// `<AssetClass>-<yyyyMMdd>-<user>.zip`, spaces replaced with `_`.
pub fn package_file_name(asset_class: &str, user: &str, now: chrono::DateTime<Local>) -> String {
    format!("{}-{}-{}.zip", file_safe(asset_class), now.format("%Y%m%d"), user).replace(' ', "_")
}

/// Bundle the report, the source files (under `sources/`) and the audit log.
///
/// Source files are de-duplicated case-insensitively; missing ones are skipped.
/// Different files sharing a name get `_2`, `_3`, ... before the extension.
/// An existing package with the same name is replaced; a failed one is removed.
pub fn create_zip(
    asset_class: &str,
    report: &Path,
    sources: &[PathBuf],
    audit_log: &Path,
    dir: &Path,
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir).map_err(write_err(dir))?;
    let path = dir.join(package_file_name(asset_class, &current_user(), Local::now()));

    let file = File::create(&path).map_err(write_err(&path))?;
    if let Err(e) = write_package(ZipWriter::new(file), report, sources, audit_log) {
        let _ = std::fs::remove_file(&path);
        return Err(e);
    }

    tracing::info!(path = %path.display(), "package created");
    Ok(path)
}

fn write_package(
    mut zip: ZipWriter<File>,
    report: &Path,
    sources: &[PathBuf],
    audit_log: &Path,
) -> Result<(), ReportError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_file(&mut zip, report, &entry_name(report), options)?;

    let mut seen: Vec<String> = Vec::new();
    let mut entries: Vec<String> = Vec::new();
    for src in sources {
        let folded = fold(&src.to_string_lossy());
        if seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        if !src.is_file() {
            tracing::warn!(path = %src.display(), "source file missing; not packaged");
            continue;
        }
        let name = unique_entry(&entry_name(src), &mut entries);
        add_file(&mut zip, src, &format!("sources/{name}"), options)?;
    }

    add_file(&mut zip, audit_log, &entry_name(audit_log), options)?;
    zip.finish().map_err(|e| ReportError::Zip(e.to_string()))?;
    Ok(())
}

/// `name`, or `stem_<n>.ext` when a folded match is already in `used`.
fn unique_entry(name: &str, used: &mut Vec<String>) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    let mut candidate = name.to_string();
    let mut n = 2;
    while used.contains(&fold(&candidate)) {
        candidate = format!("{stem}_{n}{ext}");
        n += 1;
    }
    used.push(fold(&candidate));
    candidate
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn add_file(
    zip: &mut ZipWriter<File>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<(), ReportError> {
    let mut input = File::open(path).map_err(|e| ReportError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    zip.start_file(name, options)
        .map_err(|e| ReportError::Zip(format!("{name}: {e}")))?;
    std::io::copy(&mut input, zip).map_err(|e| ReportError::Zip(format!("{name}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn package_name_replaces_spaces() {
        let ts = Local.with_ymd_and_hms(2024, 11, 2, 12, 0, 0).unwrap();
        assert_eq!(
            package_file_name("Windows Server", "jo doe", ts),
            "Windows_Server-20241102-jo_doe.zip"
        );
    }

    #[test]
    fn audit_log_lists_sources() {
        let dir = tempdir().unwrap();
        let sources = vec![
            ("Baseline".to_string(), PathBuf::from("/data/cmdb.csv")),
            ("Discovery".to_string(), PathBuf::from("/data/scan.xlsx")),
        ];
        let path = write_audit_log(dir.path(), "Computers", "Hostname", &sources).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("audit_") && name.ends_with(".log"));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Timestamp: "));
        assert!(lines[1].starts_with("Username: "));
        assert!(lines[2].starts_with("Machine: "));
        assert_eq!(lines[3], "AssetClass: Computers");
        assert_eq!(lines[4], "DataPoint: Hostname");
        assert_eq!(lines[5], "Sources:");
        assert_eq!(lines[6], "  - Baseline: /data/cmdb.csv");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn zip_layout() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("ValidationReport_X.xlsx");
        let audit = dir.path().join("audit_1.log");
        let base = dir.path().join("base.csv");
        std::fs::write(&report, b"report").unwrap();
        std::fs::write(&audit, b"audit").unwrap();
        std::fs::write(&base, b"Host\nweb1\n").unwrap();

        let out = dir.path().join("out");
        let sources = vec![base.clone(), base.clone(), dir.path().join("gone.csv")];
        let path = create_zip("Computers", &report, &sources, &audit, &out).unwrap();
        assert!(path.starts_with(&out));

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["ValidationReport_X.xlsx", "audit_1.log", "sources/base.csv"]);

        let mut content = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("sources/base.csv").unwrap(), &mut content).unwrap();
        assert_eq!(content, "Host\nweb1\n");
    }

    #[test]
    fn same_file_name_from_two_dirs() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("ValidationReport_X.xlsx");
        let audit = dir.path().join("audit_1.log");
        std::fs::write(&report, b"report").unwrap();
        std::fs::write(&audit, b"audit").unwrap();
        for sub in ["cmdb", "scan"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            std::fs::write(dir.path().join(sub).join("export.csv"), sub).unwrap();
        }

        let sources = vec![
            dir.path().join("cmdb").join("export.csv"),
            dir.path().join("scan").join("export.csv"),
        ];
        let path = create_zip("Computers", &report, &sources, &audit, dir.path()).unwrap();

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut content = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("sources/export.csv").unwrap(), &mut content).unwrap();
        assert_eq!(content, "cmdb");
        content.clear();
        std::io::Read::read_to_string(&mut archive.by_name("sources/export_2.csv").unwrap(), &mut content).unwrap();
        assert_eq!(content, "scan");
    }

    #[test]
    fn failed_package_is_removed() {
        let dir = tempdir().unwrap();
        let audit = dir.path().join("audit_1.log");
        std::fs::write(&audit, b"audit").unwrap();

        let err = create_zip("Computers", &dir.path().join("missing.xlsx"), &[], &audit, dir.path());
        assert!(matches!(err, Err(ReportError::Io { .. })));
        let zips = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "zip"))
            .count();
        assert_eq!(zips, 0);
    }

    #[test]
    fn unique_entry_suffixes_before_extension() {
        let mut used = Vec::new();
        assert_eq!(unique_entry("export.csv", &mut used), "export.csv");
        assert_eq!(unique_entry("EXPORT.csv", &mut used), "EXPORT_2.csv");
        assert_eq!(unique_entry("export.csv", &mut used), "export_3.csv");
        assert_eq!(unique_entry("README", &mut used), "README");
        assert_eq!(unique_entry("README", &mut used), "README_2");
    }
}
