// Source table ingestion: CSV/TSV and Excel/ODS first sheet

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use calamine::{open_workbook_auto, Data, Reader};
use regex::Regex;

use invdrift_recon::config::SourceProfile;
use invdrift_recon::normalize::fold;
use invdrift_recon::SourceTable;

use crate::error::IngestError;

/// Load the first sheet (or the whole delimited file) at `path` as a source table.
pub fn load_table(name: &str, path: &Path) -> Result<SourceTable, IngestError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let grid = match ext.as_str() {
        "csv" | "txt" => {
            let content = read_file_as_utf8(path)?;
            let delimiter = sniff_delimiter(&content);
            parse_delimited(path, &content, delimiter)?
        }
        "tsv" => parse_delimited(path, &read_file_as_utf8(path)?, b'\t')?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_first_sheet(path)?,
        _ => return Err(IngestError::UnsupportedFormat(path.to_path_buf())),
    };

    let table = build_table(name, path, grid)?;
    tracing::debug!(
        source = name,
        path = %path.display(),
        columns = table.headers.len(),
        rows = table.row_count(),
        "table loaded"
    );
    Ok(table)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }

        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (Excel-exported CSVs are often Windows-1252).
pub fn read_file_as_utf8(path: &Path) -> Result<String, IngestError> {
    let io_err = |e: std::io::Error| IngestError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut bytes = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(io_err)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            tracing::debug!(path = %path.display(), "not UTF-8; decoding as Windows-1252");
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn parse_delimited(path: &Path, content: &str, delimiter: u8) -> Result<Vec<Vec<String>>, IngestError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        // Integers without decimals
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Data::Float(n) => format!("{n}"),
        Data::Int(n) => format!("{n}"),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{e:?}"),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
    }
}

fn open_sheets(path: &Path) -> Result<calamine::Sheets<std::io::BufReader<std::fs::File>>, IngestError> {
    open_workbook_auto(path).map_err(|e| IngestError::Parse {
        path: path.to_path_buf(),
        message: format!("failed to open workbook: {e}"),
    })
}

fn sheet_grid(
    workbook: &mut calamine::Sheets<std::io::BufReader<std::fs::File>>,
    path: &Path,
    sheet_name: &str,
) -> Result<Vec<Vec<String>>, IngestError> {
    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| IngestError::Parse {
            path: path.to_path_buf(),
            message: format!("failed to read sheet '{sheet_name}': {e}"),
        })?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>, IngestError> {
    let mut workbook = open_sheets(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::NoSheets(path.to_path_buf()))?;
    sheet_grid(&mut workbook, path, &first)
}

/// Turn a raw grid (first row = headers) into a table.
///
/// Trailing blank headers are dropped, interior blanks become `Column{n}`,
/// and headers that collide case-insensitively are rejected.
fn build_table(name: &str, path: &Path, grid: Vec<Vec<String>>) -> Result<SourceTable, IngestError> {
    let mut rows = grid.into_iter();
    let mut headers: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    while headers.last().is_some_and(|h| h.is_empty()) {
        headers.pop();
    }
    for (i, h) in headers.iter_mut().enumerate() {
        if h.is_empty() {
            *h = format!("Column{}", i + 1);
        }
    }

    let mut seen: Vec<String> = Vec::with_capacity(headers.len());
    for h in &headers {
        let folded = fold(h);
        if seen.contains(&folded) {
            return Err(IngestError::DuplicateHeader {
                path: path.to_path_buf(),
                header: h.clone(),
            });
        }
        seen.push(folded);
    }

    let width = headers.len();
    let rows: Vec<Vec<String>> = rows
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .map(|mut r| {
            r.truncate(width);
            r
        })
        .collect();

    Ok(SourceTable::new(name, path.display().to_string(), headers, rows))
}

// ---------------------------------------------------------------------------
// Validation template workbooks
// ---------------------------------------------------------------------------

const TEMPLATE_HEADER_SCAN_ROWS: usize = 15;
const TEMPLATE_BLANK_STOP: usize = 10;
const TEMPLATE_MAX_LABEL_LEN: usize = 200;

/// What a "Data Validation - <AssetClass>.xlsx" workbook says about a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateProfile {
    pub asset_class: Option<String>,
    pub source_labels: Vec<String>,
}

fn template_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Data\s*Validation\s*-\s*(.+)$").expect("static regex"))
}

pub fn asset_class_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    template_name_re()
        .captures(stem)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Read the asset class from the file name and the expected source labels
/// from the "Process" sheet (first sheet if there is none).
pub fn template_profile(path: &Path) -> Result<TemplateProfile, IngestError> {
    let asset_class = asset_class_from_file_name(path);

    let mut workbook = open_sheets(path)?;
    let names = workbook.sheet_names();
    let sheet = names
        .iter()
        .find(|n| n.eq_ignore_ascii_case("Process"))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| IngestError::NoSheets(path.to_path_buf()))?;
    let grid = sheet_grid(&mut workbook, path, &sheet)?;

    Ok(TemplateProfile {
        asset_class,
        source_labels: source_labels(&grid),
    })
}

fn source_labels(grid: &[Vec<String>]) -> Vec<String> {
    let header = grid
        .iter()
        .take(TEMPLATE_HEADER_SCAN_ROWS)
        .enumerate()
        .find_map(|(r, row)| {
            row.iter().position(|cell| {
                let lower = cell.trim().to_lowercase();
                lower.contains("source") || lower.contains("input") || lower.contains("file")
            })
            .map(|c| (r, c))
        });
    let Some((header_row, col)) = header else {
        return Vec::new();
    };

    let mut labels: Vec<String> = Vec::new();
    let mut blanks = 0;
    for row in &grid[header_row + 1..] {
        let value = row.get(col).map(|v| v.trim()).unwrap_or("");
        if value.is_empty() {
            blanks += 1;
            if blanks >= TEMPLATE_BLANK_STOP {
                break;
            }
            continue;
        }
        blanks = 0;
        if value.chars().count() <= TEMPLATE_MAX_LABEL_LEN
            && !labels.iter().any(|l| fold(l) == fold(value))
        {
            labels.push(value.to_string());
        }
    }
    labels
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Anything that can produce the source tables for one run.
pub trait TableProvider {
    fn fetch(&self, asset_class: &str, data_point: &str) -> Result<Vec<SourceTable>, IngestError>;
}

/// Reads each profile source from disk, relative paths resolved against `base_dir`.
#[derive(Debug, Clone)]
pub struct FileProvider {
    pub base_dir: PathBuf,
    pub sources: Vec<SourceProfile>,
}

impl FileProvider {
    pub fn new(base_dir: impl Into<PathBuf>, sources: Vec<SourceProfile>) -> Self {
        Self {
            base_dir: base_dir.into(),
            sources,
        }
    }

    pub fn path_for(&self, source: &SourceProfile) -> PathBuf {
        let file = Path::new(&source.file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.base_dir.join(file)
        }
    }
}

impl TableProvider for FileProvider {
    fn fetch(&self, asset_class: &str, data_point: &str) -> Result<Vec<SourceTable>, IngestError> {
        tracing::info!(asset_class, data_point, sources = self.sources.len(), "loading sources");
        self.sources
            .iter()
            .map(|src| {
                let path = self.path_for(src);
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                if !src.matches_file(file_name) {
                    return Err(IngestError::Source(format!(
                        "'{}' does not match the patterns for source '{}'",
                        file_name, src.name
                    )));
                }
                load_table(&src.name, &path)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook as XlsxWorkbook;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn sniff_common_delimiters() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("a,b\n1,2\n"), b',');
        assert_eq!(sniff_delimiter("a|b|c\n1|2|3\n"), b'|');
        assert_eq!(sniff_delimiter("single\n"), b',');
    }

    #[test]
    fn csv_headers_trimmed_and_rows_padded() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "base.csv", b"\xEF\xBB\xBF Host , OS\nweb1,Win10\nweb2\n,\n");
        let t = load_table("Baseline", &path).unwrap();
        assert_eq!(t.headers, vec!["Host", "OS"]);
        assert_eq!(t.rows, vec![vec!["web1", "Win10"], vec!["web2", ""]]);
        assert_eq!(t.name, "Baseline");
    }

    #[test]
    fn quoted_fields_and_semicolons() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "scan.txt", b"Host;Notes\nweb1;\"a;b\"\n");
        let t = load_table("Scan", &path).unwrap();
        assert_eq!(t.value(0, "Notes"), "a;b");
    }

    #[test]
    fn windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "legacy.csv", b"Host,Owner\nweb1,Jos\xE9\n");
        let t = load_table("Legacy", &path).unwrap();
        assert_eq!(t.value(0, "Owner"), "José");
    }

    #[test]
    fn blank_and_duplicate_headers() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.csv", b"Host,,OS,,\nweb1,x,y,,\n");
        let t = load_table("A", &path).unwrap();
        assert_eq!(t.headers, vec!["Host", "Column2", "OS"]);
        assert_eq!(t.rows[0], vec!["web1", "x", "y"]);

        let path = write(dir.path(), "b.csv", b"Host,OS,host\nweb1,x,y\n");
        let err = load_table("B", &path).unwrap_err();
        assert!(matches!(err, IngestError::DuplicateHeader { ref header, .. } if header == "host"));
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.json", b"{}");
        assert!(matches!(load_table("A", &path), Err(IngestError::UnsupportedFormat(_))));
    }

    #[test]
    fn xlsx_first_sheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.xlsx");
        let mut wb = XlsxWorkbook::new();
        let ws = wb.add_worksheet();
        ws.write_string(0, 0, "Hostname").unwrap();
        ws.write_string(0, 1, "Cores").unwrap();
        ws.write_string(1, 0, "WEB1").unwrap();
        ws.write_number(1, 1, 8.0).unwrap();
        wb.save(&path).unwrap();

        let t = load_table("Discovery", &path).unwrap();
        assert_eq!(t.headers, vec!["Hostname", "Cores"]);
        assert_eq!(t.rows, vec![vec!["WEB1", "8"]]);
    }

    #[test]
    fn template_profile_from_process_sheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Data Validation - Windows Server.xlsx");
        let mut wb = XlsxWorkbook::new();
        wb.add_worksheet().set_name("Overview").unwrap();
        let ws = wb.add_worksheet().set_name("Process").unwrap();
        ws.write_string(0, 0, "Step").unwrap();
        ws.write_string(1, 0, "1").unwrap();
        ws.write_string(1, 2, "Input Files").unwrap();
        ws.write_string(2, 2, "CMDB export").unwrap();
        ws.write_string(3, 2, "Nessus scan").unwrap();
        ws.write_string(5, 2, "cmdb EXPORT").unwrap();
        ws.write_string(20, 2, "after the gap").unwrap();
        wb.save(&path).unwrap();

        let profile = template_profile(&path).unwrap();
        assert_eq!(profile.asset_class.as_deref(), Some("Windows Server"));
        assert_eq!(profile.source_labels, vec!["CMDB export", "Nessus scan"]);
    }

    #[test]
    fn asset_class_needs_template_name() {
        assert_eq!(asset_class_from_file_name(Path::new("scan.xlsx")), None);
        assert_eq!(
            asset_class_from_file_name(Path::new("/x/data validation-Computers.xlsx")).as_deref(),
            Some("Computers")
        );
    }

    #[test]
    fn file_provider_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        write(dir.path(), "base.csv", b"Host\nweb1\n");
        write(dir.path(), "scan.csv", b"Host\nweb2\n");
        let sources = vec![
            SourceProfile {
                name: "Baseline".into(),
                file: "base.csv".into(),
                key_column: None,
                patterns: vec![],
                description: String::new(),
            },
            SourceProfile {
                name: "Scan".into(),
                file: "scan.csv".into(),
                key_column: None,
                patterns: vec!["scan*".into()],
                description: String::new(),
            },
        ];
        let provider = FileProvider::new(dir.path(), sources.clone());
        let tables = provider.fetch("Computers", "Host").unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].value(0, "Host"), "web2");

        let mut bad = sources;
        bad[1].patterns = vec!["nessus*".into()];
        let provider = FileProvider::new(dir.path(), bad);
        assert!(matches!(provider.fetch("Computers", "Host"), Err(IngestError::Source(_))));
    }
}
