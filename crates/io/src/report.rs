// Report sinks: JSON result and the XLSX validation workbook

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Chart, ChartType, Format, Workbook as XlsxWorkbook, Worksheet, XlsxError};

use invdrift_recon::normalize::fold;
use invdrift_recon::ReconResult;

use crate::error::{write_err, ReportError};

/// Rows copied into each `Src_<name>` preview sheet.
pub const PREVIEW_ROWS: usize = 100;

const MAX_SHEET_NAME: usize = 31;

/// Excel's 1,048,576 rows minus the header row.
const MAX_DATA_ROWS: usize = 1_048_575;

pub fn write_json(result: &ReconResult, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(result).map_err(|e| ReportError::Json(e.to_string()))?;
    std::fs::write(path, json + "\n").map_err(write_err(path))?;
    tracing::debug!(path = %path.display(), "JSON report written");
    Ok(())
}

/// `ValidationReport_<AssetClass>_<yyyyMMdd_HHmm>.xlsx`
pub fn workbook_file_name(asset_class: &str, now: chrono::DateTime<chrono::Local>) -> String {
    format!(
        "ValidationReport_{}_{}.xlsx",
        file_safe(asset_class),
        now.format("%Y%m%d_%H%M")
    )
}

/// Write the validation workbook into `dir` (created if needed) and return its path.
pub fn write_workbook(result: &ReconResult, dir: &Path) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir).map_err(write_err(dir))?;
    let path = dir.join(workbook_file_name(&result.meta.asset_class, chrono::Local::now()));
    write_workbook_to(result, &path)?;
    Ok(path)
}

pub fn write_workbook_to(result: &ReconResult, path: &Path) -> Result<(), ReportError> {
    let mut wb = XlsxWorkbook::new();
    let bold = Format::new().set_bold();
    let r = result;

    add_sheet(&mut wb, "Summary", |ws| summary(ws, r, &bold))?;
    add_sheet(&mut wb, "Presence", |ws| presence(ws, r, &bold, MAX_DATA_ROWS))?;
    add_sheet(&mut wb, "Conflicts", |ws| conflicts(ws, r, &bold, MAX_DATA_ROWS))?;
    add_sheet(&mut wb, "MatchesAll", |ws| matches_all(ws, r, &bold, MAX_DATA_ROWS))?;
    add_sheet(&mut wb, "MissingByFile", |ws| missing(ws, r, &bold, MAX_DATA_ROWS))?;
    add_sheet(&mut wb, "FieldMapping", |ws| field_mapping(ws, r, &bold))?;
    add_sheet(&mut wb, "Deltas", |ws| deltas(ws, r, &bold, MAX_DATA_ROWS))?;
    add_sheet(&mut wb, "DeltasSummary", |ws| deltas_summary(ws, r, &bold))?;

    let mut used: Vec<String> = FIXED_SHEETS.iter().map(|s| fold(s)).collect();
    for src in &r.sources {
        let name = unique_sheet_name(&format!("Src_{}", src.name), &used);
        used.push(fold(&name));
        add_sheet(&mut wb, &name, |ws| {
            write_header(ws, src.headers.as_slice(), &bold)?;
            for (i, row) in src.rows.iter().take(PREVIEW_ROWS).enumerate() {
                write_row(ws, i as u32 + 1, row.as_slice(), None)?;
            }
            Ok(())
        })?;
    }

    wb.save(path)
        .map_err(|e| ReportError::Workbook(format!("failed to save {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "workbook written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Sheets
// ---------------------------------------------------------------------------

const FIXED_SHEETS: [&str; 8] = [
    "Summary",
    "Presence",
    "Conflicts",
    "MatchesAll",
    "MissingByFile",
    "FieldMapping",
    "Deltas",
    "DeltasSummary",
];

fn add_sheet<F>(wb: &mut XlsxWorkbook, name: &str, fill: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut Worksheet) -> Result<(), XlsxError>,
{
    let ws = wb.add_worksheet();
    ws.set_name(name)
        .and_then(|ws| fill(ws))
        .map_err(|e| ReportError::Workbook(format!("sheet '{name}': {e}")))
}

fn write_row<S: AsRef<str>>(
    ws: &mut Worksheet,
    row: u32,
    values: &[S],
    format: Option<&Format>,
) -> Result<(), XlsxError> {
    for (col, value) in values.iter().enumerate() {
        match format {
            Some(f) => ws.write_string_with_format(row, col as u16, value.as_ref(), f)?,
            None => ws.write_string(row, col as u16, value.as_ref())?,
        };
    }
    Ok(())
}

/// Bold header row, frozen in place.
fn write_header<S: AsRef<str>>(ws: &mut Worksheet, values: &[S], bold: &Format) -> Result<(), XlsxError> {
    write_row(ws, 0, values, Some(bold))?;
    ws.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Data rows to write when `total` must fit in `limit` rows under the header.
/// On overflow the last row is kept for [`truncation_note`].
fn fit_rows(sheet: &str, total: usize, limit: usize) -> usize {
    if total <= limit {
        return total;
    }
    let shown = limit.saturating_sub(1);
    tracing::warn!(sheet, total, shown, "sheet exceeds the Excel row limit; truncated");
    shown
}

fn truncation_note(ws: &mut Worksheet, shown: usize, total: usize) -> Result<(), XlsxError> {
    if shown < total {
        let note = format!("{} more rows not shown; see the JSON result", total - shown);
        ws.write_string(shown as u32 + 1, 0, note)?;
    }
    Ok(())
}

fn label_count(ws: &mut Worksheet, row: u32, label: &str, count: usize) -> Result<(), XlsxError> {
    ws.write_string(row, 0, label)?;
    ws.write_number(row, 1, count as f64)?;
    Ok(())
}

fn summary(ws: &mut Worksheet, r: &ReconResult, bold: &Format) -> Result<(), XlsxError> {
    let sources = r
        .sources
        .iter()
        .map(|s| {
            let file = Path::new(&s.origin)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&s.origin);
            format!("{}:{}", s.name, file)
        })
        .collect::<Vec<_>>()
        .join(" | ");
    let comparison = r.meta.comparison.to_string();

    write_row(ws, 0, &["Asset Class", r.meta.asset_class.as_str()], None)?;
    write_row(ws, 1, &["Data Point", r.meta.data_point.as_str()], None)?;
    write_row(ws, 2, &["Baseline", r.meta.baseline.as_str()], None)?;
    write_row(ws, 3, &["Comparison", comparison.as_str()], None)?;
    write_row(ws, 4, &["Sources", sources.as_str()], None)?;

    let s = &r.summary;
    label_count(ws, 6, "Total Keys", s.total_keys)?;
    label_count(ws, 7, "Matched In All Files", s.matched_all)?;
    label_count(ws, 8, "Conflict Count", s.conflicts)?;
    let mut row = 9;
    for m in &s.missing_by_source {
        label_count(ws, row, &format!("Missing - {}", m.source), m.count)?;
        row += 1;
    }

    row += 1;
    ws.write_string_with_format(row, 0, "Metrics", bold)?;
    label_count(ws, row + 1, "Mapped Field Pairs", s.mapped_pairs)?;
    label_count(ws, row + 2, "Total Delta Cells", s.total_delta_cells)?;
    row += 3;
    for c in &s.delta_cells_by_source {
        label_count(ws, row, &format!("Delta Cells - {}", c.source), c.count)?;
        row += 1;
    }
    ws.set_column_width(0, 24)?;
    Ok(())
}

fn presence(ws: &mut Worksheet, r: &ReconResult, bold: &Format, limit: usize) -> Result<(), XlsxError> {
    let mut header = vec![r.meta.data_point.as_str()];
    header.extend(r.sources.iter().map(|s| s.name.as_str()));
    write_header(ws, &header, bold)?;
    let shown = fit_rows("Presence", r.presence.len(), limit);
    for (i, p) in r.presence.iter().take(shown).enumerate() {
        let mut row = vec![p.key.as_str()];
        row.extend(p.presence.iter().map(|f| if f.present { "Yes" } else { "No" }));
        write_row(ws, i as u32 + 1, &row, None)?;
    }
    truncation_note(ws, shown, r.presence.len())
}

fn conflicts(ws: &mut Worksheet, r: &ReconResult, bold: &Format, limit: usize) -> Result<(), XlsxError> {
    let mut header = vec![r.meta.data_point.as_str(), "Column"];
    header.extend(r.sources.iter().map(|s| s.name.as_str()));
    write_header(ws, &header, bold)?;
    let shown = fit_rows("Conflicts", r.conflicts.len(), limit);
    for (i, c) in r.conflicts.iter().take(shown).enumerate() {
        let mut row = vec![c.key.as_str(), c.column.as_str()];
        // Sources without a row for the key stay blank.
        row.extend(r.sources.iter().map(|s| {
            c.values
                .iter()
                .find(|v| v.source == s.name)
                .map(|v| v.value.as_str())
                .unwrap_or("")
        }));
        write_row(ws, i as u32 + 1, &row, None)?;
    }
    truncation_note(ws, shown, r.conflicts.len())
}

fn matches_all(ws: &mut Worksheet, r: &ReconResult, bold: &Format, limit: usize) -> Result<(), XlsxError> {
    write_header(ws, &[r.meta.data_point.as_str()], bold)?;
    let shown = fit_rows("MatchesAll", r.matches_all.len(), limit);
    for (i, key) in r.matches_all.iter().take(shown).enumerate() {
        ws.write_string(i as u32 + 1, 0, key)?;
    }
    truncation_note(ws, shown, r.matches_all.len())
}

fn missing(ws: &mut Worksheet, r: &ReconResult, bold: &Format, limit: usize) -> Result<(), XlsxError> {
    write_header(ws, &[r.meta.data_point.as_str(), "MissingFrom"], bold)?;
    let total: usize = r.missing_by_source.iter().map(|m| m.keys.len()).sum();
    let shown = fit_rows("MissingByFile", total, limit);
    let rows = r
        .missing_by_source
        .iter()
        .flat_map(|m| m.keys.iter().map(move |k| [k.as_str(), m.source.as_str()]));
    for (i, row) in rows.take(shown).enumerate() {
        write_row(ws, i as u32 + 1, &row, None)?;
    }
    truncation_note(ws, shown, total)
}

fn field_mapping(ws: &mut Worksheet, r: &ReconResult, bold: &Format) -> Result<(), XlsxError> {
    write_header(
        ws,
        &["Baseline", "OtherSource", "BaselineColumn", "MappedColumn", "MatchScore"],
        bold,
    )?;
    let mut row = 1;
    for m in &r.mappings {
        for c in &m.columns {
            let cells = [
                r.meta.baseline.as_str(),
                m.source.as_str(),
                c.baseline_column.as_str(),
                c.other_column.as_str(),
            ];
            write_row(ws, row, &cells, None)?;
            ws.write_number(row, 4, (c.score * 100.0).round() / 100.0)?;
            row += 1;
        }
    }
    Ok(())
}

fn deltas(ws: &mut Worksheet, r: &ReconResult, bold: &Format, limit: usize) -> Result<(), XlsxError> {
    let mut header = vec!["Key", "Column", r.meta.baseline.as_str()];
    header.extend(r.other_sources.iter().map(String::as_str));
    write_header(ws, &header, bold)?;
    let shown = fit_rows("Deltas", r.deltas.len(), limit);
    for (i, d) in r.deltas.iter().take(shown).enumerate() {
        let mut row = vec![d.key.as_str(), d.column.as_str(), d.baseline_value.as_str()];
        row.extend(d.other_values.iter().map(String::as_str));
        write_row(ws, i as u32 + 1, &row, None)?;
    }
    truncation_note(ws, shown, r.deltas.len())
}

fn deltas_summary(ws: &mut Worksheet, r: &ReconResult, bold: &Format) -> Result<(), XlsxError> {
    write_header(ws, &["Source", "MismatchedCells"], bold)?;
    let counts = &r.summary.delta_cells_by_source;
    for (i, c) in counts.iter().enumerate() {
        label_count(ws, i as u32 + 1, &c.source, c.count)?;
    }
    if counts.is_empty() {
        return Ok(());
    }

    let last = counts.len() as u32;
    let mut chart = Chart::new(ChartType::Column);
    chart
        .add_series()
        .set_name("Delta Cells by Source")
        .set_categories(("DeltasSummary", 1, 0, last, 0))
        .set_values(("DeltasSummary", 1, 1, last, 1));
    chart.title().set_name("Delta Cells by Source");
    ws.insert_chart(1, 3, &chart)?;
    Ok(())
}

/// Excel sheet names: no `\ / * [ ] : ?`, at most 31 characters.
pub fn sheet_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if matches!(c, '\\' | '/' | '*' | '[' | ']' | ':' | '?') { '-' } else { c })
        .take(MAX_SHEET_NAME)
        .collect()
}

fn unique_sheet_name(raw: &str, used: &[String]) -> String {
    let base = sheet_name(raw);
    let mut candidate = base.clone();
    let mut n = 2;
    while used.contains(&fold(&candidate)) {
        let suffix = format!("~{n}");
        let head: String = base.chars().take(MAX_SHEET_NAME - suffix.len()).collect();
        candidate = head + &suffix;
        n += 1;
    }
    candidate
}

/// Replace characters that are awkward in file names.
pub(crate) fn file_safe(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| if matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect()
}
