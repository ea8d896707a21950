// Record loader: uploaded bytes -> one raw record set.
//
// Binary workbooks are read with calamine. Many report portals export an
// HTML table under an `.xls` name, so a failed binary read is followed by
// an explicit HTML attempt before the file is declared malformed.
use crate::config::LoaderConfig;
use crate::error::{ReportError, ReportResult};
use crate::types::RawRecordSet;
use crate::util::canonical;
use calamine::{open_workbook_auto_from_rs, Data, DataType, Ods, Reader, Xls, Xlsb, Xlsx};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// One sheet or html table as a grid of cell text.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub name: String,
    pub cells: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Binary,
    Html,
}

/// Outcome of reading the raw bytes, before any header matching.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    ParsedBinary(Vec<Grid>),
    ParsedHtml(Vec<Grid>),
    Unparseable(String),
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub format: SourceFormat,
    pub sheets_scanned: usize,
    pub sheets_matched: usize,
    pub rows: usize,
}

pub fn load_records(
    bytes: &[u8],
    file_name: &str,
    config: &LoaderConfig,
) -> ReportResult<(RawRecordSet, LoadReport)> {
    let (format, grids) = match parse_workbook(bytes, file_name) {
        ParseOutcome::ParsedBinary(grids) => (SourceFormat::Binary, grids),
        ParseOutcome::ParsedHtml(grids) => (SourceFormat::Html, grids),
        ParseOutcome::Unparseable(reason) => {
            warn!(file = file_name, %reason, "file is neither a workbook nor an html table");
            return Err(ReportError::MalformedFile(reason));
        }
    };

    let mut records = RawRecordSet::default();
    let mut sheets_matched = 0usize;
    for grid in &grids {
        match find_header_row(&grid.cells, &config.essential_headers, config.header_scan_rows) {
            Some(header_idx) => {
                let set = grid_to_records(grid, header_idx);
                debug!(sheet = %grid.name, header_row = header_idx, rows = set.len(), "sheet matched");
                sheets_matched += 1;
                records.extend(set);
            }
            None => warn!(sheet = %grid.name, "skipping sheet without essential headers"),
        }
    }

    if sheets_matched == 0 {
        return Err(ReportError::NoValidDataFound);
    }
    if records.is_empty() {
        warn!(file = file_name, sheets_matched, "headers found but no data rows below them");
    }

    let report = LoadReport {
        format,
        sheets_scanned: grids.len(),
        sheets_matched,
        rows: records.len(),
    };
    info!(
        file = file_name,
        format = ?report.format,
        sheets = report.sheets_scanned,
        matched = report.sheets_matched,
        rows = report.rows,
        "upload loaded"
    );
    Ok((records, report))
}

/// Binary attempt first, then the html attempt.
pub fn parse_workbook(bytes: &[u8], file_name: &str) -> ParseOutcome {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match read_binary(bytes, &ext) {
        Ok(grids) => ParseOutcome::ParsedBinary(grids),
        Err(binary_err) => {
            debug!(error = %binary_err, "binary read failed, trying html tables");
            let tables = read_html_tables(bytes);
            if tables.is_empty() {
                ParseOutcome::Unparseable(binary_err)
            } else {
                ParseOutcome::ParsedHtml(tables)
            }
        }
    }
}

fn read_binary(bytes: &[u8], ext: &str) -> Result<Vec<Grid>, String> {
    let cursor = Cursor::new(bytes.to_vec());
    match ext {
        "xlsx" | "xlsm" => Xlsx::new(cursor).map(read_sheets).map_err(|e| e.to_string()),
        "xls" => Xls::new(cursor).map(read_sheets).map_err(|e| e.to_string()),
        "xlsb" => Xlsb::new(cursor).map(read_sheets).map_err(|e| e.to_string()),
        "ods" => Ods::new(cursor).map(read_sheets).map_err(|e| e.to_string()),
        _ => open_workbook_auto_from_rs(cursor)
            .map(read_sheets)
            .map_err(|e| e.to_string()),
    }
}

fn read_sheets<R>(mut workbook: R) -> Vec<Grid>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let mut grids = Vec::new();
    for name in workbook.sheet_names() {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let cells = range
                    .rows()
                    .map(|row| row.iter().map(cell_text).collect())
                    .collect();
                grids.push(Grid { name, cells });
            }
            Err(e) => warn!(sheet = %name, error = %e, "skipping unreadable sheet"),
        }
    }
    grids
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // order ids arrive as floats; keep them free of a trailing `.0`
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string().trim().to_string(),
    }
}

/// Every `<table>` in the document as a grid; empty when there is none.
pub fn read_html_tables(bytes: &[u8]) -> Vec<Grid> {
    let text = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&text);
    let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("th, td"),
    ) else {
        return Vec::new();
    };

    document
        .select(&table_sel)
        .enumerate()
        .map(|(idx, table)| {
            let cells = table
                .select(&row_sel)
                .map(|row| {
                    row.select(&cell_sel)
                        .map(|cell| {
                            cell.text()
                                .flat_map(|t| t.split_whitespace())
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect()
                })
                .collect();
            Grid {
                name: format!("table {}", idx + 1),
                cells,
            }
        })
        .collect()
}

/// Index of the first row (within `scan_rows`) containing every essential header.
pub fn find_header_row(cells: &[Vec<String>], essential: &[String], scan_rows: usize) -> Option<usize> {
    cells.iter().take(scan_rows).position(|row| {
        let present: Vec<String> = row.iter().map(|c| canonical(c)).collect();
        essential.iter().all(|h| present.contains(h))
    })
}

/// Rows below the header become records keyed by canonical header names.
pub fn grid_to_records(grid: &Grid, header_idx: usize) -> RawRecordSet {
    let headers: Vec<String> = grid.cells[header_idx].iter().map(|c| canonical(c)).collect();
    let mut columns: Vec<String> = Vec::new();
    for h in &headers {
        if !h.is_empty() && !columns.contains(h) {
            columns.push(h.clone());
        }
    }

    let mut rows = Vec::new();
    for data_row in grid.cells.iter().skip(header_idx + 1) {
        let mut row_map: HashMap<String, String> = HashMap::new();
        for (col_idx, value) in data_row.iter().enumerate() {
            if let Some(header) = headers.get(col_idx) {
                if header.is_empty() {
                    continue;
                }
                row_map
                    .entry(header.clone())
                    .or_insert_with(|| value.trim().to_string());
            }
        }

        // Skip fully blank rows
        if row_map.values().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(row_map);
    }

    RawRecordSet { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn essential() -> Vec<String> {
        LoaderConfig::default().essential_headers
    }

    #[test]
    fn header_row_found_below_title_rows() {
        let cells = vec![
            row(&["Daily Provisioning Report"]),
            row(&[""]),
            row(&["scorderno", " STO ", "STATUS", "STATUSDATE"]),
            row(&["1001", "CID", "COMPWORK", "2025-03-05"]),
        ];
        assert_eq!(find_header_row(&cells, &essential(), 10), Some(2));
    }

    #[test]
    fn header_outside_scan_window_is_ignored() {
        let mut cells: Vec<Vec<String>> = (0..10).map(|_| row(&["filler"])).collect();
        cells.push(row(&["SCORDERNO", "STO", "STATUS"]));
        assert_eq!(find_header_row(&cells, &essential(), 10), None);
        assert_eq!(find_header_row(&cells, &essential(), 11), Some(10));
    }

    #[test]
    fn grid_rows_keyed_by_header_and_blank_rows_skipped() {
        let grid = Grid {
            name: "Sheet1".into(),
            cells: vec![
                row(&["SCORDERNO", "STO", "STATUS"]),
                row(&["1001", "CID", "COMPWORK"]),
                row(&["", "", ""]),
                row(&["1002", "CPP", "WORKFAIL"]),
            ],
        };
        let set = grid_to_records(&grid, 0);
        assert_eq!(set.columns, vec!["SCORDERNO", "STO", "STATUS"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows[1].get("STO"), Some(&"CPP".to_string()));
    }

    #[test]
    fn integral_floats_lose_decimal_suffix() {
        assert_eq!(cell_text(&Data::Float(1234567.0)), "1234567");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::String("  CID ".into())), "CID");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn html_disguised_as_xls_falls_back_to_tables() {
        let html = br#"<html><body>
            <table><tr><td>unrelated</td></tr></table>
            <table>
              <tr><th>SCORDERNO</th><th>STO</th><th>STATUS</th><th>STATUSDATE</th></tr>
              <tr><td>1001</td><td>CID</td><td> COMPWORK </td><td>2025-03-05 10:00:00</td></tr>
              <tr><td>1002</td><td>CPP</td><td>WORKFAIL</td><td>2025-03-05 11:00:00</td></tr>
            </table>
        </body></html>"#;

        let outcome = parse_workbook(html, "report.xls");
        assert!(matches!(outcome, ParseOutcome::ParsedHtml(ref t) if t.len() == 2));

        let (set, report) = load_records(html, "report.xls", &LoaderConfig::default()).unwrap();
        assert_eq!(report.format, SourceFormat::Html);
        assert_eq!(report.sheets_scanned, 2);
        assert_eq!(report.sheets_matched, 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows[0].get("STATUS"), Some(&"COMPWORK".to_string()));
    }

    #[test]
    fn matching_tables_are_concatenated() {
        let html = br#"<table>
              <tr><td>SCORDERNO</td><td>STO</td><td>STATUS</td></tr>
              <tr><td>1</td><td>CID</td><td>COMPWORK</td></tr>
            </table>
            <table>
              <tr><td>SCORDERNO</td><td>STO</td><td>STATUS</td><td>ERRORCODE</td></tr>
              <tr><td>2</td><td>CPP</td><td>WORKFAIL</td><td>KENDALA TEKNIK</td></tr>
            </table>"#;
        let (set, report) = load_records(html, "export.xls", &LoaderConfig::default()).unwrap();
        assert_eq!(report.sheets_matched, 2);
        assert_eq!(set.len(), 2);
        assert!(set.has_column("ERRORCODE"));
    }

    #[test]
    fn tables_without_headers_are_no_valid_data() {
        let html = b"<table><tr><td>A</td><td>B</td></tr><tr><td>1</td><td>2</td></tr></table>";
        let err = load_records(html, "export.xls", &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, ReportError::NoValidDataFound));
    }

    #[test]
    fn random_bytes_are_malformed() {
        let bytes = [0u8, 159, 146, 150, 1, 2, 3, 4];
        let err = load_records(&bytes, "broken.xlsx", &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, ReportError::MalformedFile(_)));
    }
}
